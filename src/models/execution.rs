use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorDetail, GatewayError};

/// One result row: column name to value, in select-list order
pub type Row = serde_json::Map<String, Value>;

/// Outcome of one Executor call. Never carries raw driver errors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionResult {
    pub success: bool,
    pub rows: Vec<Row>,
    pub columns: Vec<String>,
    /// Number of rows actually fetched (capped at `max_results`)
    pub row_count: usize,
    pub execution_time_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub tables_accessed: Vec<String>,
    /// True when the fetch stopped at the row cap
    pub truncated: bool,
    pub executed_at: DateTime<Utc>,
    /// Structured form of `error`, kept for the orchestrator
    #[serde(skip)]
    pub failure: Option<ErrorDetail>,
}

impl ExecutionResult {
    pub fn completed(
        columns: Vec<String>,
        rows: Vec<Row>,
        truncated: bool,
        execution_time_ms: f64,
        tables_accessed: Vec<String>,
    ) -> Self {
        Self {
            success: true,
            row_count: rows.len(),
            rows,
            columns,
            execution_time_ms,
            error: None,
            tables_accessed,
            truncated,
            executed_at: Utc::now(),
            failure: None,
        }
    }

    /// Failed attempt; only the caller-safe message is exposed
    pub fn failed(error: &GatewayError, execution_time_ms: f64, tables_accessed: Vec<String>) -> Self {
        Self {
            success: false,
            rows: Vec::new(),
            columns: Vec::new(),
            row_count: 0,
            execution_time_ms,
            error: Some(error.user_message()),
            tables_accessed,
            truncated: false,
            executed_at: Utc::now(),
            failure: Some(error.to_detail()),
        }
    }
}

/// A bound query parameter value
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Named query parameters, kept in insertion order.
///
/// SQLite binds them by name (`:district`); PostgreSQL binds them
/// positionally (`$1`, `$2`, ...) in insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryParams(Vec<(String, ParamValue)>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: ParamValue) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert or replace a parameter, keeping its original position on replace
    pub fn insert(&mut self, name: impl Into<String>, value: ParamValue) {
        let name = name.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Point-in-time copy of the process-wide execution counters
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExecutionStatsSnapshot {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub avg_execution_time_ms: f64,
}
