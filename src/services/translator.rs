use chrono::{Datelike, NaiveDate, Utc};
use tracing::{debug, info};

use crate::models::{QueryContext, TranslationResult};

/// Confidence assigned to every rule-based match. Not calibrated.
pub const RULE_BASED_CONFIDENCE: f64 = 0.9;

pub const NO_MATCH_ERROR: &str = "no matching pattern";

/// District names the slot extractor recognizes, lower-case
pub const DISTRICT_GAZETTEER: &[&str] = &[
    "guntur",
    "vijayawada",
    "visakhapatnam",
    "tirupati",
    "kurnool",
];

/// Statement template a pattern renders into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    DistrictCrimeSummary,
    OfficerArrestPerformance,
    FirCountToday,
    FirCountThisMonth,
    StationsInDistrict,
    CrimeTypeBreakdown,
}

impl PatternKind {
    pub fn name(&self) -> &'static str {
        match self {
            PatternKind::DistrictCrimeSummary => "district_crime_summary",
            PatternKind::OfficerArrestPerformance => "officer_arrest_performance",
            PatternKind::FirCountToday => "fir_count_today",
            PatternKind::FirCountThisMonth => "fir_count_this_month",
            PatternKind::StationsInDistrict => "stations_in_district",
            PatternKind::CrimeTypeBreakdown => "crime_type_breakdown",
        }
    }
}

/// One entry of the pattern table.
///
/// Every keyword group must be satisfied, and a group is satisfied by any one
/// of its keywords appearing in the lower-cased text.
#[derive(Debug, Clone)]
pub struct QueryPattern {
    pub kind: PatternKind,
    pub keyword_groups: Vec<Vec<&'static str>>,
    pub requires_district: bool,
}

impl QueryPattern {
    fn new(kind: PatternKind, keyword_groups: Vec<Vec<&'static str>>, requires_district: bool) -> Self {
        Self {
            kind,
            keyword_groups,
            requires_district,
        }
    }

    fn keywords_match(&self, text: &str) -> bool {
        self.keyword_groups
            .iter()
            .all(|group| group.iter().any(|keyword| text.contains(keyword)))
    }
}

/// Slots extracted from the query text
#[derive(Debug, Clone, Default)]
struct Slots {
    district: Option<String>,
}

/// Rule-based natural language to SQL translator
pub struct Translator {
    patterns: Vec<QueryPattern>,
    reference_date: Option<NaiveDate>,
}

impl Translator {
    pub fn new() -> Self {
        Self {
            patterns: default_patterns(),
            reference_date: None,
        }
    }

    /// Pin the date used for "today" / "this month" windows
    pub fn with_reference_date(mut self, date: NaiveDate) -> Self {
        self.reference_date = Some(date);
        self
    }

    pub fn patterns(&self) -> &[QueryPattern] {
        &self.patterns
    }

    pub fn translate(&self, text: &str) -> TranslationResult {
        self.translate_with_context(text, &QueryContext::default())
    }

    /// Translate, letting a `district` entity from earlier turns fill the slot
    pub fn translate_with_context(&self, text: &str, context: &QueryContext) -> TranslationResult {
        let lowered = text.to_lowercase();
        let slots = Slots {
            district: extract_district(&lowered).or_else(|| {
                context
                    .entity("district")
                    .and_then(|d| extract_district(&d.to_lowercase()))
            }),
        };

        for pattern in &self.patterns {
            if !pattern.keywords_match(&lowered) {
                continue;
            }
            if pattern.requires_district && slots.district.is_none() {
                debug!(
                    "Pattern {} matched keywords but has no district slot",
                    pattern.kind.name()
                );
                continue;
            }
            if let Some(sql) = self.render(pattern.kind, &slots) {
                info!("Translated query with pattern {}", pattern.kind.name());
                return TranslationResult::matched(sql, RULE_BASED_CONFIDENCE, pattern.kind.name());
            }
        }

        info!("No translation pattern matched query");
        TranslationResult::miss(NO_MATCH_ERROR)
    }

    fn today(&self) -> NaiveDate {
        self.reference_date
            .unwrap_or_else(|| Utc::now().date_naive())
    }

    fn render(&self, kind: PatternKind, slots: &Slots) -> Option<String> {
        let today = self.today();
        let sql = match kind {
            PatternKind::DistrictCrimeSummary => format!(
                "SELECT ct.description AS crime_type, COUNT(*) AS count \
                 FROM FIR f \
                 JOIN DISTRICT_MASTER d ON f.district_id = d.district_id \
                 JOIN CRIME_TYPE_MASTER ct ON f.crime_type_id = ct.crime_type_id \
                 WHERE d.district_name = '{}' \
                 GROUP BY ct.description \
                 ORDER BY count DESC",
                slots.district.as_deref()?
            ),
            PatternKind::OfficerArrestPerformance => {
                let (start, _) = month_window(today)?;
                format!(
                    "SELECT o.officer_name, o.rank, COUNT(a.arrest_id) AS arrests \
                     FROM OFFICER_MASTER o \
                     LEFT JOIN ARREST a ON o.officer_id = a.officer_id \
                     WHERE a.arrest_date >= '{}' \
                     GROUP BY o.officer_name, o.rank \
                     ORDER BY arrests DESC",
                    start
                )
            }
            PatternKind::FirCountToday => format!(
                "SELECT COUNT(*) AS fir_count FROM FIR \
                 WHERE incident_date >= '{}' AND incident_date < '{}'",
                today,
                today.succ_opt()?
            ),
            PatternKind::FirCountThisMonth => {
                let (start, end) = month_window(today)?;
                format!(
                    "SELECT COUNT(*) AS fir_count FROM FIR \
                     WHERE incident_date >= '{}' AND incident_date < '{}'",
                    start, end
                )
            }
            PatternKind::StationsInDistrict => format!(
                "SELECT s.station_id, s.station_name \
                 FROM STATION_MASTER s \
                 JOIN DISTRICT_MASTER d ON s.district_id = d.district_id \
                 WHERE d.district_name = '{}' \
                 ORDER BY s.station_name",
                slots.district.as_deref()?
            ),
            PatternKind::CrimeTypeBreakdown => "SELECT ct.category, ct.description AS crime_type, \
                 COUNT(f.fir_id) AS count \
                 FROM CRIME_TYPE_MASTER ct \
                 LEFT JOIN FIR f ON f.crime_type_id = ct.crime_type_id \
                 GROUP BY ct.category, ct.description \
                 ORDER BY count DESC"
                .to_string(),
        };
        Some(sql)
    }
}

impl Default for Translator {
    fn default() -> Self {
        Self::new()
    }
}

/// Pattern table in priority order
fn default_patterns() -> Vec<QueryPattern> {
    vec![
        QueryPattern::new(
            PatternKind::DistrictCrimeSummary,
            vec![vec!["crimes"], vec!["district"]],
            true,
        ),
        QueryPattern::new(
            PatternKind::OfficerArrestPerformance,
            vec![vec!["officer"], vec!["arrest", "performance"]],
            false,
        ),
        QueryPattern::new(
            PatternKind::FirCountToday,
            vec![vec!["fir"], vec!["count", "how many"], vec!["today"]],
            false,
        ),
        QueryPattern::new(
            PatternKind::FirCountThisMonth,
            vec![vec!["fir"], vec!["count", "how many"], vec!["month"]],
            false,
        ),
        QueryPattern::new(
            PatternKind::StationsInDistrict,
            vec![vec!["station"]],
            true,
        ),
        QueryPattern::new(
            PatternKind::CrimeTypeBreakdown,
            vec![vec!["crime type", "crime category", "categories", "breakdown"]],
            false,
        ),
    ]
}

/// First gazetteer district named in lower-cased text, title-cased
pub fn extract_district(text: &str) -> Option<String> {
    DISTRICT_GAZETTEER
        .iter()
        .find(|district| text.contains(*district))
        .map(|district| title_case(district))
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// First day of the month containing `date` and first day of the next one
fn month_window(date: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    let start = date.with_day(1)?;
    let end = if date.month() == 12 {
        NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1)?
    };
    Some((start, end))
}
