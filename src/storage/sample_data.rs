//! CCTNS reference dataset for local SQLite stores.
//!
//! Production deployments point at the live PostgreSQL records system; an
//! in-memory store gets this schema and a small seed so queries have
//! something to run against.

/// DDL mirroring [`SchemaCatalog::cctns`](crate::models::SchemaCatalog::cctns)
pub const CCTNS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS DISTRICT_MASTER (
    district_id INTEGER PRIMARY KEY,
    district_name TEXT NOT NULL,
    state TEXT
);

CREATE TABLE IF NOT EXISTS STATION_MASTER (
    station_id INTEGER PRIMARY KEY,
    station_name TEXT NOT NULL,
    district_id INTEGER NOT NULL REFERENCES DISTRICT_MASTER(district_id)
);

CREATE TABLE IF NOT EXISTS OFFICER_MASTER (
    officer_id INTEGER PRIMARY KEY,
    officer_name TEXT NOT NULL,
    rank TEXT,
    station_id INTEGER REFERENCES STATION_MASTER(station_id)
);

CREATE TABLE IF NOT EXISTS CRIME_TYPE_MASTER (
    crime_type_id INTEGER PRIMARY KEY,
    description TEXT NOT NULL,
    category TEXT
);

CREATE TABLE IF NOT EXISTS FIR (
    fir_id INTEGER PRIMARY KEY,
    fir_number TEXT NOT NULL UNIQUE,
    district_id INTEGER NOT NULL REFERENCES DISTRICT_MASTER(district_id),
    station_id INTEGER NOT NULL REFERENCES STATION_MASTER(station_id),
    crime_type_id INTEGER NOT NULL REFERENCES CRIME_TYPE_MASTER(crime_type_id),
    incident_date TEXT NOT NULL,
    status TEXT
);

CREATE TABLE IF NOT EXISTS ARREST (
    arrest_id INTEGER PRIMARY KEY,
    fir_id INTEGER NOT NULL REFERENCES FIR(fir_id),
    officer_id INTEGER NOT NULL REFERENCES OFFICER_MASTER(officer_id),
    arrest_date TEXT NOT NULL,
    person_name TEXT
);

CREATE INDEX IF NOT EXISTS idx_fir_district ON FIR(district_id);
CREATE INDEX IF NOT EXISTS idx_fir_incident_date ON FIR(incident_date);
CREATE INDEX IF NOT EXISTS idx_arrest_officer ON ARREST(officer_id);
"#;

/// Seed rows. Guntur has theft as its most frequent crime type.
pub const CCTNS_SEED: &str = r#"
INSERT OR IGNORE INTO DISTRICT_MASTER (district_id, district_name, state) VALUES
    (1, 'Guntur', 'Andhra Pradesh'),
    (2, 'Vijayawada', 'Andhra Pradesh'),
    (3, 'Kurnool', 'Andhra Pradesh');

INSERT OR IGNORE INTO STATION_MASTER (station_id, station_name, district_id) VALUES
    (10, 'Arundelpet', 1),
    (11, 'Pattabhipuram', 1),
    (20, 'Governorpet', 2),
    (30, 'Kurnool Town', 3);

INSERT OR IGNORE INTO OFFICER_MASTER (officer_id, officer_name, rank, station_id) VALUES
    (100, 'K. Ramesh', 'Inspector', 10),
    (101, 'P. Lakshmi', 'Sub-Inspector', 11),
    (200, 'S. Prasad', 'Inspector', 20),
    (300, 'M. Sreenu', 'Head Constable', 30);

INSERT OR IGNORE INTO CRIME_TYPE_MASTER (crime_type_id, description, category) VALUES
    (1, 'Theft', 'Property'),
    (2, 'Burglary', 'Property'),
    (3, 'Assault', 'Body'),
    (4, 'Cheating', 'Economic');

INSERT OR IGNORE INTO FIR (fir_id, fir_number, district_id, station_id, crime_type_id, incident_date, status) VALUES
    (1, 'GNT-2024-0001', 1, 10, 1, '2024-01-05', 'Under Investigation'),
    (2, 'GNT-2024-0002', 1, 10, 1, '2024-01-19', 'Charge Sheeted'),
    (3, 'GNT-2024-0003', 1, 11, 1, '2024-02-02', 'Under Investigation'),
    (4, 'GNT-2024-0004', 1, 11, 3, '2024-02-14', 'Closed'),
    (5, 'GNT-2024-0005', 1, 10, 2, '2024-03-08', 'Under Investigation'),
    (6, 'GNT-2024-0006', 1, 11, 4, '2024-03-21', 'Charge Sheeted'),
    (7, 'VJA-2024-0001', 2, 20, 3, '2024-01-11', 'Under Investigation'),
    (8, 'VJA-2024-0002', 2, 20, 2, '2024-02-27', 'Closed'),
    (9, 'KNL-2024-0001', 3, 30, 4, '2024-03-03', 'Under Investigation');

INSERT OR IGNORE INTO ARREST (arrest_id, fir_id, officer_id, arrest_date, person_name) VALUES
    (1000, 1, 100, '2024-01-07', 'R. Venkat'),
    (1001, 2, 100, '2024-01-22', 'A. Basha'),
    (1002, 4, 101, '2024-02-15', 'T. Naidu'),
    (1003, 7, 200, '2024-01-13', 'G. Rao');
"#;

/// Schema followed by the seed, as one setup script
pub fn sample_dataset() -> String {
    format!("{}\n{}", CCTNS_SCHEMA, CCTNS_SEED)
}
