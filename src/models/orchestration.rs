use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{ExecutionResult, TranslationMethod, ValidationReport};
use crate::error::ErrorDetail;

/// Query handling mode
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    #[default]
    Standard,
    Complex,
    Analytical,
}

impl QueryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryMode::Standard => "standard",
            QueryMode::Complex => "complex",
            QueryMode::Analytical => "analytical",
        }
    }
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "standard" => Ok(QueryMode::Standard),
            "complex" => Ok(QueryMode::Complex),
            "analytical" => Ok(QueryMode::Analytical),
            _ => Err(format!("Unsupported query mode: {}", s)),
        }
    }
}

/// Analytical intent detected from the query text
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "feature", rename_all = "snake_case")]
pub enum AnalyticalFeature {
    Trend,
    Comparison,
    TopN { n: u64 },
}

/// Everything a caller gets back for one query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationResult {
    pub query: String,
    pub mode: QueryMode,
    /// Final statement (after enhancement and augmentation)
    pub sql: String,
    /// Statement as produced by the translator
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_sql: Option<String>,
    pub confidence: f64,
    pub method: TranslationMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionResult>,
    pub optimization_suggestions: Vec<String>,
    /// Example phrasings offered when the query could not be handled
    pub suggestions: Vec<String>,
    pub features: Vec<AnalyticalFeature>,
    pub visualization_suggestions: Vec<String>,
    pub diagnostics: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

impl OrchestrationResult {
    pub fn new(query: &str, mode: QueryMode) -> Self {
        Self {
            query: query.to_string(),
            mode,
            sql: String::new(),
            original_sql: None,
            confidence: 0.0,
            method: TranslationMethod::None,
            validation: None,
            execution: None,
            optimization_suggestions: Vec::new(),
            suggestions: Vec::new(),
            features: Vec::new(),
            visualization_suggestions: Vec::new(),
            diagnostics: Vec::new(),
            error: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.execution.as_ref().is_some_and(|e| e.success)
    }

    pub fn row_count(&self) -> usize {
        self.execution.as_ref().map(|e| e.row_count).unwrap_or(0)
    }

    pub fn column_count(&self) -> usize {
        self.execution.as_ref().map(|e| e.columns.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("Analytical".parse::<QueryMode>().unwrap(), QueryMode::Analytical);
        assert_eq!("standard".parse::<QueryMode>().unwrap(), QueryMode::Standard);
        assert!("batch".parse::<QueryMode>().is_err());
    }

    #[test]
    fn test_feature_serialization() {
        let json = serde_json::to_value(AnalyticalFeature::TopN { n: 5 }).unwrap();
        assert_eq!(json, serde_json::json!({"feature": "top_n", "n": 5}));
    }
}
