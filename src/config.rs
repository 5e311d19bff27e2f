use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::GatewayError;
use crate::models::SchemaCatalog;
use crate::services::executor::ExecutorSettings;
use crate::validation::ValidatorLimits;

/// Environment variable → configuration key
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("DATABASE_URL", "database.url"),
    ("DATABASE_POOL_SIZE", "database.pool_size"),
    ("DATABASE_POOL_WAIT_MS", "database.pool_wait_ms"),
    ("SQL_TIMEOUT", "executor.timeout_secs"),
    ("SQL_MAX_RESULTS", "executor.max_results"),
    ("SQL_MAX_JOINS", "validator.max_joins"),
    ("SQL_MAX_SUBQUERIES", "validator.max_subqueries"),
    ("NL2SQL_CONFIDENCE_THRESHOLD", "translator.confidence_threshold"),
    ("STT_CONFIDENCE_THRESHOLD", "voice.confidence_threshold"),
    ("SCHEMA_CATALOG_PATH", "catalog.path"),
    ("RUST_LOG", "logging.level"),
    ("RUST_LOG_STYLE", "logging.style"),
];

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub database: DatabaseConfig,
    pub executor: ExecutorConfig,
    pub validator: ValidatorConfig,
    pub translator: TranslatorConfig,
    pub voice: VoiceConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: usize,
    pub pool_wait_ms: u64,
}

impl DatabaseConfig {
    pub fn pool_wait(&self) -> Duration {
        Duration::from_millis(self.pool_wait_ms)
    }

    pub fn is_in_memory_sqlite(&self) -> bool {
        matches!(self.url.as_str(), "sqlite::memory:" | "sqlite://:memory:" | "sqlite:")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorConfig {
    pub timeout_secs: u64,
    pub max_results: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidatorConfig {
    pub max_joins: usize,
    pub max_subqueries: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranslatorConfig {
    pub confidence_threshold: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoiceConfig {
    pub confidence_threshold: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogConfig {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub style: String,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, GatewayError> {
        // Load .env first so its values are visible as environment overrides
        let _ = dotenv::dotenv();
        Self::load(|name| env::var(name).ok())
    }

    /// Build from defaults plus whatever `lookup` returns for each variable
    pub fn load<F>(lookup: F) -> Result<Self, GatewayError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = config::Config::builder()
            .set_default("database.url", "sqlite::memory:")?
            .set_default("database.pool_size", 10)?
            .set_default("database.pool_wait_ms", 5000)?
            .set_default("executor.timeout_secs", 30)?
            .set_default("executor.max_results", 1000)?
            .set_default("validator.max_joins", 10)?
            .set_default("validator.max_subqueries", 5)?
            .set_default("translator.confidence_threshold", 0.5)?
            .set_default("voice.confidence_threshold", 0.7)?
            .set_default("logging.level", "info")?
            .set_default("logging.style", "auto")?;

        for (variable, key) in ENV_OVERRIDES {
            if let Some(value) = lookup(variable) {
                builder = builder.set_override(*key, value)?;
            }
        }

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.database.url.trim().is_empty() {
            return Err(GatewayError::Configuration(
                "database.url must be set".to_string(),
            ));
        }
        if self.database.pool_size == 0 {
            return Err(GatewayError::Configuration(
                "database.pool_size must be at least 1".to_string(),
            ));
        }
        if self.executor.timeout_secs == 0 {
            return Err(GatewayError::Configuration(
                "executor.timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.executor.max_results == 0 {
            return Err(GatewayError::Configuration(
                "executor.max_results must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("translator.confidence_threshold", self.translator.confidence_threshold),
            ("voice.confidence_threshold", self.voice.confidence_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(GatewayError::Configuration(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }

    pub fn executor_settings(&self) -> ExecutorSettings {
        ExecutorSettings {
            timeout: Duration::from_secs(self.executor.timeout_secs),
            max_results: self.executor.max_results,
        }
    }

    pub fn validator_limits(&self) -> ValidatorLimits {
        ValidatorLimits {
            max_joins: self.validator.max_joins,
            max_subqueries: self.validator.max_subqueries,
        }
    }

    /// Catalog from `catalog.path`, or the built-in CCTNS catalog
    pub fn load_catalog(&self) -> Result<SchemaCatalog, GatewayError> {
        match &self.catalog.path {
            Some(path) => SchemaCatalog::from_path(path),
            None => Ok(SchemaCatalog::cctns()),
        }
    }
}
