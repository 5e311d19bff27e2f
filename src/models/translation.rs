use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How a statement was produced from natural language
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TranslationMethod {
    RuleBased,
    None,
}

/// Outcome of translating one natural-language query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranslationResult {
    pub sql: String,
    pub confidence: f64,
    pub method: TranslationMethod,
    /// Name of the pattern that matched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TranslationResult {
    pub fn matched(sql: String, confidence: f64, pattern: &str) -> Self {
        Self {
            sql,
            confidence,
            method: TranslationMethod::RuleBased,
            pattern: Some(pattern.to_string()),
            error: None,
        }
    }

    pub fn miss(error: impl Into<String>) -> Self {
        Self {
            sql: String::new(),
            confidence: 0.0,
            method: TranslationMethod::None,
            pattern: None,
            error: Some(error.into()),
        }
    }

    pub fn is_match(&self) -> bool {
        !self.sql.is_empty()
    }
}

/// Conversation context supplied alongside a query
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryContext {
    /// Earlier queries in the same conversation, oldest first
    #[serde(default)]
    pub history: Vec<String>,
    /// Entities referenced earlier, e.g. `"district" -> "Guntur"`
    #[serde(default)]
    pub entities: HashMap<String, String>,
}

impl QueryContext {
    pub fn with_entity(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entities.insert(key.into(), value.into());
        self
    }

    pub fn entity(&self, key: &str) -> Option<&str> {
        self.entities.get(key).map(String::as_str)
    }
}
