use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::GatewayError;

/// Static description of the tables, columns and joins a query may touch.
///
/// Loaded once at startup and shared read-only (`Arc<SchemaCatalog>`) by
/// every request. Table lookups are case-insensitive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaCatalog {
    pub tables: Vec<TableSpec>,
    /// Schema qualifiers a statement may put in front of a table name
    #[serde(default)]
    pub schemas: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub columns: Vec<ColumnSpec>,
    #[serde(default)]
    pub join_hints: Vec<JoinHint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: ColumnType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Text,
    Date,
    Timestamp,
    Decimal,
    Boolean,
}

impl ColumnType {
    pub fn is_temporal(&self) -> bool {
        matches!(self, ColumnType::Date | ColumnType::Timestamp)
    }
}

/// Join relationship between two catalog tables.
///
/// `condition` is written with table-name qualifiers, e.g.
/// `FIR.district_id = DISTRICT_MASTER.district_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JoinHint {
    pub from_table: String,
    pub to_table: String,
    pub condition: String,
}

impl TableSpec {
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }
}

impl SchemaCatalog {
    /// Build a catalog and check it is internally consistent
    pub fn new(tables: Vec<TableSpec>) -> Result<Self, GatewayError> {
        let catalog = Self {
            tables,
            schemas: Vec::new(),
        };
        catalog.check()?;
        Ok(catalog)
    }

    pub fn from_json_str(json: &str) -> Result<Self, GatewayError> {
        let catalog: SchemaCatalog = serde_json::from_str(json)?;
        catalog.check()?;
        Ok(catalog)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, GatewayError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::Configuration(format!(
                "Schema catalog {} could not be read: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json_str(&raw)
    }

    fn check(&self) -> Result<(), GatewayError> {
        if self.tables.is_empty() {
            return Err(GatewayError::Configuration(
                "Schema catalog contains no tables".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for table in &self.tables {
            if !seen.insert(table.name.to_uppercase()) {
                return Err(GatewayError::Configuration(format!(
                    "Duplicate table in schema catalog: {}",
                    table.name
                )));
            }
        }

        for table in &self.tables {
            for hint in &table.join_hints {
                for referenced in [&hint.from_table, &hint.to_table] {
                    if !seen.contains(&referenced.to_uppercase()) {
                        return Err(GatewayError::Configuration(format!(
                            "Join hint on {} references unknown table {}",
                            table.name, referenced
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    pub fn table(&self, name: &str) -> Option<&TableSpec> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn is_allowed(&self, name: &str) -> bool {
        self.table(name).is_some()
    }

    pub fn allows_schema(&self, schema: &str) -> bool {
        self.schemas.iter().any(|s| s.eq_ignore_ascii_case(schema))
    }

    pub fn with_schemas<I, S>(mut self, schemas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.schemas = schemas.into_iter().map(Into::into).collect();
        self
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    /// Find a join hint between two tables, in either direction
    pub fn join_hint(&self, a: &str, b: &str) -> Option<&JoinHint> {
        self.tables
            .iter()
            .flat_map(|t| t.join_hints.iter())
            .find(|hint| {
                (hint.from_table.eq_ignore_ascii_case(a) && hint.to_table.eq_ignore_ascii_case(b))
                    || (hint.from_table.eq_ignore_ascii_case(b)
                        && hint.to_table.eq_ignore_ascii_case(a))
            })
    }

    /// Tables among `among` that define `column`, in the order given
    pub fn tables_with_column<'a>(&self, column: &str, among: &[&'a str]) -> Vec<&'a str> {
        among
            .iter()
            .copied()
            .filter(|name| self.table(name).is_some_and(|t| t.has_column(column)))
            .collect()
    }

    /// First date/timestamp column of a table
    pub fn temporal_column(&self, table: &str) -> Option<&ColumnSpec> {
        self.table(table)?
            .columns
            .iter()
            .find(|c| c.data_type.is_temporal())
    }

    /// Built-in catalog for the CCTNS incident records store
    pub fn cctns() -> Self {
        fn col(name: &str, data_type: ColumnType, nullable: bool) -> ColumnSpec {
            ColumnSpec {
                name: name.to_string(),
                data_type,
                nullable,
            }
        }

        fn hint(from: &str, to: &str, condition: &str) -> JoinHint {
            JoinHint {
                from_table: from.to_string(),
                to_table: to.to_string(),
                condition: condition.to_string(),
            }
        }

        use ColumnType::*;

        let tables = vec![
            TableSpec {
                name: "DISTRICT_MASTER".to_string(),
                description: Some("Police districts".to_string()),
                columns: vec![
                    col("district_id", Integer, false),
                    col("district_name", Text, false),
                    col("state", Text, true),
                ],
                join_hints: vec![],
            },
            TableSpec {
                name: "STATION_MASTER".to_string(),
                description: Some("Police stations".to_string()),
                columns: vec![
                    col("station_id", Integer, false),
                    col("station_name", Text, false),
                    col("district_id", Integer, false),
                ],
                join_hints: vec![hint(
                    "STATION_MASTER",
                    "DISTRICT_MASTER",
                    "STATION_MASTER.district_id = DISTRICT_MASTER.district_id",
                )],
            },
            TableSpec {
                name: "OFFICER_MASTER".to_string(),
                description: Some("Officers and their postings".to_string()),
                columns: vec![
                    col("officer_id", Integer, false),
                    col("officer_name", Text, false),
                    col("rank", Text, true),
                    col("station_id", Integer, true),
                ],
                join_hints: vec![hint(
                    "OFFICER_MASTER",
                    "STATION_MASTER",
                    "OFFICER_MASTER.station_id = STATION_MASTER.station_id",
                )],
            },
            TableSpec {
                name: "CRIME_TYPE_MASTER".to_string(),
                description: Some("Crime classification".to_string()),
                columns: vec![
                    col("crime_type_id", Integer, false),
                    col("description", Text, false),
                    col("category", Text, true),
                ],
                join_hints: vec![],
            },
            TableSpec {
                name: "FIR".to_string(),
                description: Some("First information reports".to_string()),
                columns: vec![
                    col("fir_id", Integer, false),
                    col("fir_number", Text, false),
                    col("district_id", Integer, false),
                    col("station_id", Integer, false),
                    col("crime_type_id", Integer, false),
                    col("incident_date", Date, false),
                    col("status", Text, true),
                ],
                join_hints: vec![
                    hint("FIR", "DISTRICT_MASTER", "FIR.district_id = DISTRICT_MASTER.district_id"),
                    hint("FIR", "STATION_MASTER", "FIR.station_id = STATION_MASTER.station_id"),
                    hint(
                        "FIR",
                        "CRIME_TYPE_MASTER",
                        "FIR.crime_type_id = CRIME_TYPE_MASTER.crime_type_id",
                    ),
                ],
            },
            TableSpec {
                name: "ARREST".to_string(),
                description: Some("Arrests linked to FIRs".to_string()),
                columns: vec![
                    col("arrest_id", Integer, false),
                    col("fir_id", Integer, false),
                    col("officer_id", Integer, false),
                    col("arrest_date", Date, false),
                    col("person_name", Text, true),
                ],
                join_hints: vec![
                    hint("ARREST", "FIR", "ARREST.fir_id = FIR.fir_id"),
                    hint(
                        "ARREST",
                        "OFFICER_MASTER",
                        "ARREST.officer_id = OFFICER_MASTER.officer_id",
                    ),
                ],
            },
        ];

        Self {
            tables,
            schemas: vec!["cctns".to_string(), "public".to_string()],
        }
    }
}
