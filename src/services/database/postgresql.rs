// PostgreSQL adapter using connection pooling for optimal resource management
use crate::error::GatewayError;
use crate::models::{ParamValue, QueryParams, Row};
use crate::services::connection_pool::mask_credentials;
use crate::services::database::adapter::{DatabaseAdapter, QueryResult};
use deadpool_postgres::{Pool, PoolError};
use futures::TryStreamExt;
use serde_json::{json, Value};
use std::time::Duration;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::NoTls;
use url::Url;

type BoxedParam = Box<dyn ToSql + Sync + Send>;

pub struct PostgreSQLAdapter {
    pool: Pool,
    connection_url: String,
}

impl PostgreSQLAdapter {
    pub fn new(pool: Pool, connection_url: &str) -> Result<Self, GatewayError> {
        // Validate PostgreSQL URL format
        let url = Url::parse(connection_url)
            .map_err(|e| GatewayError::Configuration(format!("Invalid PostgreSQL URL: {}", e)))?;

        if url.scheme() != "postgresql" && url.scheme() != "postgres" {
            return Err(GatewayError::Configuration(
                "URL must use postgresql:// or postgres:// scheme".to_string(),
            ));
        }

        Ok(Self {
            pool,
            connection_url: connection_url.to_string(),
        })
    }

    fn pool_error(&self, err: PoolError) -> GatewayError {
        match err {
            PoolError::Timeout(kind) => {
                tracing::warn!(
                    "Connection pool exhausted for {} ({:?})",
                    mask_credentials(&self.connection_url),
                    kind
                );
                GatewayError::ResourceExhausted(format!(
                    "Timed out waiting for a database connection ({:?})",
                    kind
                ))
            }
            other => GatewayError::ExecutionFailure(format!(
                "Failed to get connection from pool: {}",
                other
            )),
        }
    }

    /// Positional parameters in insertion order
    fn bind_params(params: Option<&QueryParams>) -> Vec<BoxedParam> {
        params
            .map(|params| {
                params
                    .iter()
                    .map(|(_, value)| -> BoxedParam {
                        match value {
                            ParamValue::Null => Box::new(Option::<String>::None),
                            ParamValue::Bool(v) => Box::new(*v),
                            ParamValue::Int(v) => Box::new(*v),
                            ParamValue::Float(v) => Box::new(*v),
                            ParamValue::Text(v) => Box::new(v.clone()),
                        }
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn row_to_json(row: &tokio_postgres::Row) -> Row {
        let mut row_obj = Row::new();
        for (idx, column) in row.columns().iter().enumerate() {
            let value: Value = match *column.type_() {
                Type::INT2 => row
                    .try_get::<_, Option<i16>>(idx)
                    .ok()
                    .flatten()
                    .map(|v| json!(v))
                    .unwrap_or(Value::Null),
                Type::INT4 => row
                    .try_get::<_, Option<i32>>(idx)
                    .ok()
                    .flatten()
                    .map(|v| json!(v))
                    .unwrap_or(Value::Null),
                Type::INT8 => row
                    .try_get::<_, Option<i64>>(idx)
                    .ok()
                    .flatten()
                    .map(|v| json!(v))
                    .unwrap_or(Value::Null),
                Type::FLOAT4 => row
                    .try_get::<_, Option<f32>>(idx)
                    .ok()
                    .flatten()
                    .map(|v| json!(v))
                    .unwrap_or(Value::Null),
                Type::FLOAT8 => row
                    .try_get::<_, Option<f64>>(idx)
                    .ok()
                    .flatten()
                    .map(|v| json!(v))
                    .unwrap_or(Value::Null),
                Type::BOOL => row
                    .try_get::<_, Option<bool>>(idx)
                    .ok()
                    .flatten()
                    .map(|v| json!(v))
                    .unwrap_or(Value::Null),
                Type::DATE => row
                    .try_get::<_, Option<chrono::NaiveDate>>(idx)
                    .ok()
                    .flatten()
                    .map(|v| json!(v.to_string()))
                    .unwrap_or(Value::Null),
                Type::TIMESTAMP => row
                    .try_get::<_, Option<chrono::NaiveDateTime>>(idx)
                    .ok()
                    .flatten()
                    .map(|v| json!(v.to_string()))
                    .unwrap_or(Value::Null),
                Type::TIMESTAMPTZ => row
                    .try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)
                    .ok()
                    .flatten()
                    .map(|v| json!(v.to_rfc3339()))
                    .unwrap_or(Value::Null),
                _ => match row.try_get::<_, Option<String>>(idx) {
                    Ok(Some(v)) => json!(v),
                    Ok(None) => Value::Null,
                    // NUMERIC and other types without a lossless mapping
                    Err(_) => json!(format!("<{}>", column.type_().name())),
                },
            };
            row_obj.insert(column.name().to_string(), value);
        }
        row_obj
    }
}

#[async_trait::async_trait]
impl DatabaseAdapter for PostgreSQLAdapter {
    async fn fetch(
        &self,
        sql: &str,
        params: Option<&QueryParams>,
        max_rows: usize,
        timeout: Duration,
    ) -> Result<QueryResult, GatewayError> {
        let mut client = self.pool.get().await.map_err(|e| self.pool_error(e))?;
        let cancel_token = client.cancel_token();
        let timeout_ms = timeout.as_millis() as u64;
        let values = Self::bind_params(params);

        let work = async {
            let pg_client: &mut tokio_postgres::Client = &mut client;
            let transaction = pg_client.build_transaction().read_only(true).start().await?;
            transaction
                .batch_execute(&format!("SET LOCAL statement_timeout = {}", timeout_ms))
                .await?;

            let statement = transaction.prepare(sql).await?;
            let columns: Vec<String> = statement
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect();

            let mut rows = Vec::new();
            let mut truncated = false;
            {
                let stream = transaction
                    .query_raw(&statement, values.iter().map(|v| v.as_ref() as &(dyn ToSql + Sync)))
                    .await?;
                futures::pin_mut!(stream);
                while let Some(row) = stream.try_next().await? {
                    if rows.len() >= max_rows {
                        truncated = true;
                        break;
                    }
                    rows.push(Self::row_to_json(&row));
                }
            }

            // Read-only work: nothing to keep
            transaction.rollback().await?;

            Ok::<_, GatewayError>(QueryResult {
                columns,
                rows,
                truncated,
            })
        };

        match tokio::time::timeout(timeout, work).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("Query timeout after {} ms, cancelling on server", timeout_ms);
                if let Err(e) = cancel_token.cancel_query(NoTls).await {
                    tracing::error!("Failed to cancel timed-out query: {}", e);
                }
                Err(GatewayError::Timeout(timeout_ms))
            }
        }
    }

    fn database_type(&self) -> &str {
        "postgresql"
    }

    async fn test_connection(&self) -> Result<(), GatewayError> {
        let client = self.pool.get().await.map_err(|e| self.pool_error(e))?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }
}
