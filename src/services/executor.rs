use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::error::GatewayError;
use crate::models::{ExecutionResult, ExecutionStatsSnapshot, QueryParams};
use crate::services::database::DatabaseAdapter;
use crate::validation::sql_analysis::extract_tables;
use crate::validation::ValidatedSql;

/// Execution limits applied to every statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorSettings {
    pub timeout: Duration,
    pub max_results: usize,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_results: 1000,
        }
    }
}

/// Running execution counters.
///
/// Owned by whoever builds the executor and shared through an `Arc`; every
/// execution attempt records exactly once under a single lock.
#[derive(Debug, Default)]
pub struct ExecutionStats {
    inner: Mutex<ExecutionStatsSnapshot>,
}

impl ExecutionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, execution_time_ms: f64, success: bool) {
        let mut stats = match self.inner.lock() {
            Ok(stats) => stats,
            Err(poisoned) => poisoned.into_inner(),
        };
        stats.total += 1;
        if success {
            stats.successful += 1;
        } else {
            stats.failed += 1;
        }
        let n = stats.total as f64;
        stats.avg_execution_time_ms =
            (stats.avg_execution_time_ms * (n - 1.0) + execution_time_ms) / n;
    }

    pub fn snapshot(&self) -> ExecutionStatsSnapshot {
        match self.inner.lock() {
            Ok(stats) => stats.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Runs validated statements under the configured limits
pub struct SqlExecutor {
    adapter: Arc<dyn DatabaseAdapter>,
    stats: Arc<ExecutionStats>,
    settings: ExecutorSettings,
}

impl SqlExecutor {
    pub fn new(
        adapter: Arc<dyn DatabaseAdapter>,
        stats: Arc<ExecutionStats>,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            adapter,
            stats,
            settings,
        }
    }

    pub fn settings(&self) -> ExecutorSettings {
        self.settings
    }

    pub fn stats(&self) -> &Arc<ExecutionStats> {
        &self.stats
    }

    /// Execute a statement that passed validation.
    ///
    /// Never returns an error: failures come back as `success = false` with
    /// a caller-safe message, the driver detail goes to the log.
    pub async fn execute(
        &self,
        sql: &ValidatedSql,
        params: Option<&QueryParams>,
    ) -> ExecutionResult {
        self.run(sql.as_str(), params).await
    }

    /// Run `SELECT 1` through the adapter
    pub async fn test_connection(&self) -> Result<(), GatewayError> {
        self.adapter.test_connection().await
    }

    async fn run(&self, sql: &str, params: Option<&QueryParams>) -> ExecutionResult {
        let tables = extract_tables(sql);
        debug!(
            "Executing on {} (tables: {:?}): {}",
            self.adapter.database_type(),
            tables,
            sql
        );

        let start = Instant::now();
        let outcome = self
            .adapter
            .fetch(sql, params, self.settings.max_results, self.settings.timeout)
            .await;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        let result = match outcome {
            Ok(fetched) => {
                if fetched.truncated {
                    warn!(
                        "Result truncated at {} rows",
                        self.settings.max_results
                    );
                }
                info!(
                    "Query returned {} rows in {:.2} ms",
                    fetched.rows.len(),
                    elapsed_ms
                );
                ExecutionResult::completed(
                    fetched.columns,
                    fetched.rows,
                    fetched.truncated,
                    elapsed_ms,
                    tables,
                )
            }
            Err(e) => {
                error!("Query execution failed after {:.2} ms: {}", elapsed_ms, e);
                ExecutionResult::failed(&e, elapsed_ms, tables)
            }
        };

        self.stats.record(elapsed_ms, result.success);
        result
    }
}
