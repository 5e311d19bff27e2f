// SQLite adapter backed by a bounded pool of read-only connections
use crate::error::GatewayError;
use crate::models::{ParamValue, QueryParams, Row};
use crate::services::connection_pool::SqlitePool;
use crate::services::database::adapter::{DatabaseAdapter, QueryResult};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::Connection;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// VM instructions between deadline checks
const PROGRESS_OPS: i32 = 1000;

pub struct SqliteAdapter {
    pool: Arc<SqlitePool>,
}

impl SqliteAdapter {
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<SqlitePool> {
        &self.pool
    }

    /// Run `sql` with a progress-handler deadline installed on the connection.
    ///
    /// The interrupt handle used by `fetch` only stops a statement that is
    /// already stepping. The deadline also covers a task that starts late,
    /// so a timed-out query never holds its connection past `timeout`.
    fn run_query(
        conn: &Connection,
        sql: &str,
        params: Option<&QueryParams>,
        max_rows: usize,
        timeout: Duration,
    ) -> Result<QueryResult, GatewayError> {
        let deadline = Instant::now() + timeout;
        conn.progress_handler(PROGRESS_OPS, Some(move || Instant::now() >= deadline))?;
        let result = Self::read_rows(conn, sql, params, max_rows);
        conn.progress_handler(0, None::<fn() -> bool>)?;

        match result {
            Err(_) if Instant::now() >= deadline => {
                Err(GatewayError::Timeout(timeout.as_millis() as u64))
            }
            other => other,
        }
    }

    fn read_rows(
        conn: &Connection,
        sql: &str,
        params: Option<&QueryParams>,
        max_rows: usize,
    ) -> Result<QueryResult, GatewayError> {
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        if let Some(params) = params {
            for (name, value) in params.iter() {
                let key = if name.starts_with([':', '@', '$']) {
                    name.to_string()
                } else {
                    format!(":{}", name)
                };
                let idx = stmt.parameter_index(&key)?.ok_or_else(|| {
                    GatewayError::ExecutionFailure(format!("Unknown query parameter '{}'", name))
                })?;
                stmt.raw_bind_parameter(idx, Self::to_sql_value(value))?;
            }
        }

        let mut rows = stmt.raw_query();
        let mut fetched = Vec::new();
        let mut truncated = false;
        while let Some(row) = rows.next()? {
            if fetched.len() >= max_rows {
                truncated = true;
                break;
            }
            let mut row_obj = Row::new();
            for (idx, name) in columns.iter().enumerate() {
                row_obj.insert(name.clone(), Self::to_json(row.get_ref(idx)?));
            }
            fetched.push(row_obj);
        }

        Ok(QueryResult {
            columns,
            rows: fetched,
            truncated,
        })
    }

    fn to_sql_value(value: &ParamValue) -> SqlValue {
        match value {
            ParamValue::Null => SqlValue::Null,
            ParamValue::Bool(v) => SqlValue::Integer(i64::from(*v)),
            ParamValue::Int(v) => SqlValue::Integer(*v),
            ParamValue::Float(v) => SqlValue::Real(*v),
            ParamValue::Text(v) => SqlValue::Text(v.clone()),
        }
    }

    fn to_json(value: ValueRef<'_>) -> Value {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(v) => json!(v),
            ValueRef::Real(v) => json!(v),
            ValueRef::Text(bytes) => json!(String::from_utf8_lossy(bytes)),
            ValueRef::Blob(bytes) => json!(format!("<blob {} bytes>", bytes.len())),
        }
    }
}

#[async_trait::async_trait]
impl DatabaseAdapter for SqliteAdapter {
    async fn fetch(
        &self,
        sql: &str,
        params: Option<&QueryParams>,
        max_rows: usize,
        timeout: Duration,
    ) -> Result<QueryResult, GatewayError> {
        let guard = self.pool.acquire().await?;
        let interrupt = guard.connection()?.get_interrupt_handle();

        let sql = sql.to_string();
        let params = params.cloned();
        let mut task = tokio::task::spawn_blocking(move || {
            let conn = guard.connection()?;
            Self::run_query(conn, &sql, params.as_ref(), max_rows, timeout)
        });

        match tokio::time::timeout(timeout, &mut task).await {
            Ok(joined) => joined.map_err(|e| {
                GatewayError::ExecutionFailure(format!("Query task failed: {}", e))
            })?,
            Err(_) => {
                let timeout_ms = timeout.as_millis() as u64;
                tracing::warn!("Query timeout after {} ms, interrupting statement", timeout_ms);
                interrupt.interrupt();
                // The task owns the connection; wait for it so the
                // connection is back in the pool before reporting
                if let Err(e) = task.await {
                    tracing::error!("Interrupted query task failed: {}", e);
                }
                Err(GatewayError::Timeout(timeout_ms))
            }
        }
    }

    fn database_type(&self) -> &str {
        "sqlite"
    }

    async fn test_connection(&self) -> Result<(), GatewayError> {
        let guard = self.pool.acquire().await?;
        guard
            .connection()?
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::connection_pool::SqliteLocation;

    fn adapter() -> SqliteAdapter {
        let pool = SqlitePool::open(
            SqliteLocation::Memory,
            2,
            Duration::from_millis(200),
            Some(
                "CREATE TABLE FIR (fir_id INTEGER, status TEXT, incident_date DATE);
                 INSERT INTO FIR VALUES (1, 'open', '2024-03-01'), (2, 'closed', '2024-03-02'),
                                        (3, 'open', NULL);",
            ),
        )
        .unwrap();
        SqliteAdapter::new(pool)
    }

    #[tokio::test]
    async fn test_fetch_keeps_column_order() {
        let result = adapter()
            .fetch(
                "SELECT status, fir_id FROM FIR ORDER BY fir_id",
                None,
                10,
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert_eq!(result.columns, vec!["status", "fir_id"]);
        let keys: Vec<&String> = result.rows[0].keys().collect();
        assert_eq!(keys, vec!["status", "fir_id"]);
        assert_eq!(result.rows[2]["fir_id"], json!(3));
        assert!(!result.truncated);
    }

    #[tokio::test]
    async fn test_fetch_caps_rows() {
        let result = adapter()
            .fetch("SELECT fir_id FROM FIR", None, 2, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(result.rows.len(), 2);
        assert!(result.truncated);
    }

    #[tokio::test]
    async fn test_named_parameters() {
        let params = QueryParams::new().with("status", ParamValue::Text("open".to_string()));
        let result = adapter()
            .fetch(
                "SELECT fir_id FROM FIR WHERE status = :status ORDER BY fir_id",
                Some(&params),
                10,
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert_eq!(result.rows.len(), 2);

        let unknown = QueryParams::new().with("nope", ParamValue::Int(1));
        let err = adapter()
            .fetch("SELECT fir_id FROM FIR", Some(&unknown), 10, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::ExecutionFailure(_)));
    }

    #[tokio::test]
    async fn test_nulls_and_dates() {
        let result = adapter()
            .fetch(
                "SELECT incident_date FROM FIR ORDER BY fir_id",
                None,
                10,
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert_eq!(result.rows[0]["incident_date"], json!("2024-03-01"));
        assert_eq!(result.rows[2]["incident_date"], Value::Null);
    }

    #[tokio::test]
    async fn test_writes_are_refused() {
        let err = adapter()
            .fetch("DELETE FROM FIR", None, 10, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::ExecutionFailure(_)));
    }

    #[tokio::test]
    async fn test_timeout_interrupts_and_returns_connection() {
        let adapter = adapter();
        let slow = "WITH RECURSIVE c(x) AS \
                    (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 500000000) \
                    SELECT COUNT(*) FROM c";
        let err = adapter
            .fetch(slow, None, 10, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Timeout(50)));
        assert_eq!(adapter.pool().status().available, 2);
        tokio_test::assert_ok!(adapter.test_connection().await);
    }

    #[test]
    fn test_deadline_stops_statement_without_interrupt() {
        let conn = Connection::open_in_memory().unwrap();
        let slow = "WITH RECURSIVE c(x) AS \
                    (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 500000000) \
                    SELECT COUNT(*) FROM c";
        let started = Instant::now();
        let err = SqliteAdapter::run_query(&conn, slow, None, 10, Duration::from_millis(30))
            .unwrap_err();
        assert!(matches!(err, GatewayError::Timeout(30)));
        assert!(started.elapsed() < Duration::from_secs(5));

        // Handler is cleared, so later statements on the connection run normally
        let ok = SqliteAdapter::run_query(&conn, "SELECT 1", None, 10, Duration::from_secs(1))
            .unwrap();
        assert_eq!(ok.rows[0]["1"], json!(1));
    }
}
