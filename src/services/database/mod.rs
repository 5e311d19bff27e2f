// Database abstraction layer: one adapter per supported backend
pub mod adapter;
pub mod postgresql;
pub mod sqlite;

pub use adapter::{DatabaseAdapter, QueryResult};
pub use postgresql::PostgreSQLAdapter;
pub use sqlite::SqliteAdapter;

use crate::config::DatabaseConfig;
use crate::error::GatewayError;
use crate::services::connection_pool::{
    create_postgres_pool, mask_credentials, SqliteLocation, SqlitePool,
};
use std::str::FromStr;
use std::sync::Arc;

/// Database type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseType {
    PostgreSQL,
    SQLite,
}

impl DatabaseType {
    /// Pick the backend from a connection URL scheme
    pub fn from_url(url: &str) -> Result<Self, GatewayError> {
        let scheme = url.split(':').next().unwrap_or_default();
        scheme.parse()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseType::PostgreSQL => "postgresql",
            DatabaseType::SQLite => "sqlite",
        }
    }
}

impl FromStr for DatabaseType {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgresql" | "postgres" => Ok(DatabaseType::PostgreSQL),
            "sqlite" => Ok(DatabaseType::SQLite),
            _ => Err(GatewayError::Configuration(format!(
                "Unsupported database type: {}",
                s
            ))),
        }
    }
}

/// Factory function to create appropriate database adapter
pub fn create_adapter(config: &DatabaseConfig) -> Result<Arc<dyn DatabaseAdapter>, GatewayError> {
    create_adapter_with_setup(config, None)
}

/// Like [`create_adapter`], running `setup` once on a fresh SQLite store.
/// Ignored for PostgreSQL, whose schema is managed outside the gateway.
pub fn create_adapter_with_setup(
    config: &DatabaseConfig,
    setup: Option<&str>,
) -> Result<Arc<dyn DatabaseAdapter>, GatewayError> {
    let db_type = DatabaseType::from_url(&config.url)?;
    tracing::info!(
        "Connecting to {} database at {}",
        db_type.as_str(),
        mask_credentials(&config.url)
    );

    match db_type {
        DatabaseType::PostgreSQL => {
            let pool = create_postgres_pool(&config.url, config.pool_size, config.pool_wait())?;
            Ok(Arc::new(PostgreSQLAdapter::new(pool, &config.url)?))
        }
        DatabaseType::SQLite => {
            let location = SqliteLocation::from_url(&config.url)?;
            let pool = SqlitePool::open(location, config.pool_size, config.pool_wait(), setup)?;
            Ok(Arc::new(SqliteAdapter::new(pool)))
        }
    }
}
