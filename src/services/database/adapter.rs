// Database adapter trait: the capability set the executor depends on
use crate::error::GatewayError;
use crate::models::{QueryParams, Row};
use std::time::Duration;

/// Rows fetched for one statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    /// More rows were available past the cap
    pub truncated: bool,
}

/// Database adapter trait - abstraction layer for different database types
///
/// Implementations must run the statement read-only, stop fetching after
/// `max_rows`, and enforce `timeout` themselves: an expired call cancels the
/// in-flight statement and leaves the connection clean for the next caller.
#[async_trait::async_trait]
pub trait DatabaseAdapter: Send + Sync {
    /// Execute one read-only statement
    async fn fetch(
        &self,
        sql: &str,
        params: Option<&QueryParams>,
        max_rows: usize,
        timeout: Duration,
    ) -> Result<QueryResult, GatewayError>;

    /// Get database type
    fn database_type(&self) -> &str;

    /// Test connection
    async fn test_connection(&self) -> Result<(), GatewayError>;
}
