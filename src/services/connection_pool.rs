use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use rusqlite::{Connection, OpenFlags};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_postgres::NoTls;

use crate::error::GatewayError;

/// Build a bounded PostgreSQL pool.
///
/// `max_size` caps open connections; `wait` bounds how long a caller blocks
/// for a free one before the checkout fails.
pub fn create_postgres_pool(
    connection_url: &str,
    max_size: usize,
    wait: Duration,
) -> Result<Pool, GatewayError> {
    tracing::info!(
        "Creating PostgreSQL connection pool for: {} (max_size: {}, wait: {:?})",
        mask_credentials(connection_url),
        max_size,
        wait
    );

    let mut pool_config = PoolConfig::new(max_size);
    pool_config.timeouts.wait = Some(wait);
    pool_config.timeouts.create = Some(wait);
    pool_config.timeouts.recycle = Some(wait);

    let mut cfg = Config::new();
    cfg.url = Some(connection_url.to_string());
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Verified,
    });
    cfg.pool = Some(pool_config);

    cfg.create_pool(Some(Runtime::Tokio1), NoTls).map_err(|e| {
        tracing::error!("Failed to create connection pool: {}", e);
        GatewayError::Configuration(format!("Failed to create connection pool: {}", e))
    })
}

/// Mask credentials in connection URL for safe logging
pub fn mask_credentials(url: &str) -> String {
    if let Ok(parsed_url) = url::Url::parse(url) {
        let mut masked = parsed_url.clone();
        if parsed_url.password().is_some() {
            let _ = masked.set_password(Some("***"));
        }
        masked.to_string()
    } else {
        "[invalid-url]".to_string()
    }
}

/// Where a SQLite pool keeps its data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqliteLocation {
    /// Private shared-cache in-memory database, alive while the pool is
    Memory,
    File(String),
}

impl SqliteLocation {
    /// Parse `sqlite::memory:`, `sqlite://path` or `sqlite:path`
    pub fn from_url(url: &str) -> Result<Self, GatewayError> {
        let rest = url.strip_prefix("sqlite:").ok_or_else(|| {
            GatewayError::Configuration(format!("Not a SQLite URL: {}", url))
        })?;
        let rest = rest.strip_prefix("//").unwrap_or(rest);
        match rest {
            ":memory:" | "" => Ok(SqliteLocation::Memory),
            path => Ok(SqliteLocation::File(path.to_string())),
        }
    }
}

/// Bounded pool of read-only SQLite connections.
///
/// Checkout waits on a semaphore for at most `wait`; every connection has
/// `query_only` switched on before it enters the pool.
pub struct SqlitePool {
    connections: Mutex<Vec<Connection>>,
    permits: Arc<Semaphore>,
    max_size: usize,
    wait: Duration,
    location: SqliteLocation,
}

impl SqlitePool {
    /// Open `max_size` connections. `setup` runs once, writable, on the
    /// first connection before any of them is locked down.
    pub fn open(
        location: SqliteLocation,
        max_size: usize,
        wait: Duration,
        setup: Option<&str>,
    ) -> Result<Arc<Self>, GatewayError> {
        if max_size == 0 {
            return Err(GatewayError::Configuration(
                "SQLite pool size must be at least 1".to_string(),
            ));
        }

        let (path, flags) = match &location {
            SqliteLocation::Memory => (
                format!("file:cctns_{}?mode=memory&cache=shared", uuid::Uuid::new_v4().simple()),
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            ),
            SqliteLocation::File(path) => (
                path.clone(),
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            ),
        };

        let mut connections = Vec::with_capacity(max_size);
        for idx in 0..max_size {
            let conn = Connection::open_with_flags(&path, flags)?;
            conn.busy_timeout(wait)?;
            if idx == 0 {
                if let Some(setup) = setup {
                    conn.execute_batch(setup)?;
                }
            }
            connections.push(conn);
        }
        for conn in &connections {
            conn.execute_batch("PRAGMA query_only = ON;")?;
        }

        tracing::info!(
            "Created SQLite connection pool ({:?}, max_size: {})",
            location,
            max_size
        );

        Ok(Arc::new(Self {
            connections: Mutex::new(connections),
            permits: Arc::new(Semaphore::new(max_size)),
            max_size,
            wait,
            location,
        }))
    }

    /// Check out a connection, waiting at most the configured bound
    pub async fn acquire(self: &Arc<Self>) -> Result<PooledConnection, GatewayError> {
        let permit = tokio::time::timeout(self.wait, Arc::clone(&self.permits).acquire_owned())
            .await
            .map_err(|_| {
                tracing::warn!(
                    "SQLite pool exhausted: no connection within {} ms",
                    self.wait.as_millis()
                );
                GatewayError::ResourceExhausted(format!(
                    "No database connection available within {} ms",
                    self.wait.as_millis()
                ))
            })?
            .map_err(|_| GatewayError::ResourceExhausted("Connection pool is closed".to_string()))?;

        let conn = self
            .connections
            .lock()
            .map_err(|_| GatewayError::ExecutionFailure("Connection pool lock poisoned".to_string()))?
            .pop()
            .ok_or_else(|| GatewayError::ResourceExhausted("Connection pool is empty".to_string()))?;

        Ok(PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(self),
            _permit: permit,
        })
    }

    pub fn status(&self) -> PoolStatus {
        let available = self.permits.available_permits();
        PoolStatus {
            size: self.max_size,
            available,
            max_size: self.max_size,
        }
    }

    pub fn location(&self) -> &SqliteLocation {
        &self.location
    }

    fn give_back(&self, conn: Connection) {
        match self.connections.lock() {
            Ok(mut connections) => connections.push(conn),
            Err(_) => tracing::error!("Dropping SQLite connection: pool lock poisoned"),
        }
    }
}

/// A checked-out connection; goes back to the pool on drop
pub struct PooledConnection {
    conn: Option<Connection>,
    pool: Arc<SqlitePool>,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    pub fn connection(&self) -> Result<&Connection, GatewayError> {
        self.conn
            .as_ref()
            .ok_or_else(|| GatewayError::ExecutionFailure("Connection already released".to_string()))
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.give_back(conn);
        }
    }
}

/// Connection pool status information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStatus {
    pub size: usize,
    pub available: usize,
    pub max_size: usize,
}
