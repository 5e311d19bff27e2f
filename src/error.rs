use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::ValidationStage;

/// Gateway error types
///
/// Every per-request failure is converted into one of these at the stage
/// boundary and then folded into a structured result. Only
/// `Configuration` is fatal, and only at startup.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Translation miss: {0}")]
    TranslationMiss(String),

    #[error("Validation rejected at {stage} stage: {reason}")]
    ValidationRejected {
        stage: ValidationStage,
        reason: String,
    },

    #[error("Query timeout after {0} ms")]
    Timeout(u64),

    #[error("Execution failure: {0}")]
    ExecutionFailure(String),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Normalized error taxonomy exposed to callers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    TranslationMiss,
    ValidationRejected,
    ExecutionFailure,
    ResourceExhausted,
    ConfigurationError,
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::TranslationMiss(_) => ErrorKind::TranslationMiss,
            GatewayError::ValidationRejected { .. } => ErrorKind::ValidationRejected,
            GatewayError::Timeout(_) | GatewayError::ExecutionFailure(_) => {
                ErrorKind::ExecutionFailure
            }
            GatewayError::ResourceExhausted(_) => ErrorKind::ResourceExhausted,
            GatewayError::Configuration(_) => ErrorKind::ConfigurationError,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::TranslationMiss(_) => "TRANSLATION_MISS",
            GatewayError::ValidationRejected { .. } => "VALIDATION_REJECTED",
            GatewayError::Timeout(_) => "QUERY_TIMEOUT",
            GatewayError::ExecutionFailure(_) => "EXECUTION_FAILURE",
            GatewayError::ResourceExhausted(_) => "RESOURCE_EXHAUSTED",
            GatewayError::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }

    /// Message that is safe to hand to callers.
    ///
    /// Driver-level detail for execution failures goes to the logs only.
    pub fn user_message(&self) -> String {
        match self {
            GatewayError::TranslationMiss(msg) => format!(
                "Could not understand the query ({}). Try one of the suggested phrasings.",
                msg
            ),
            GatewayError::ValidationRejected { stage, reason } => {
                format!("Query rejected at {} stage: {}", stage, reason)
            }
            GatewayError::Timeout(ms) => format!(
                "Query timeout: the database did not answer within {} ms. Consider narrowing the filters.",
                ms
            ),
            GatewayError::ExecutionFailure(_) => {
                "Query execution failed. The incident has been logged.".to_string()
            }
            GatewayError::ResourceExhausted(_) => {
                "All database connections are busy. Please retry shortly.".to_string()
            }
            GatewayError::Configuration(msg) => format!("Gateway is misconfigured: {}", msg),
        }
    }

    pub fn to_detail(&self) -> ErrorDetail {
        let detail = ErrorDetail::new(self.kind(), self.code(), self.user_message());
        match self {
            GatewayError::ValidationRejected { stage, .. } => detail.with_details(stage.to_string()),
            _ => detail,
        }
    }
}

/// Serialized error carried inside results
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorDetail {
    pub fn new(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl From<rusqlite::Error> for GatewayError {
    fn from(err: rusqlite::Error) -> Self {
        GatewayError::ExecutionFailure(err.to_string())
    }
}

impl From<tokio_postgres::Error> for GatewayError {
    fn from(err: tokio_postgres::Error) -> Self {
        let details = match err.as_db_error() {
            Some(db_error) => format!(
                "Code: {}, Message: {}",
                db_error.code().code(),
                db_error.message()
            ),
            None => err.to_string(),
        };
        GatewayError::ExecutionFailure(details)
    }
}

impl From<sqlparser::parser::ParserError> for GatewayError {
    fn from(err: sqlparser::parser::ParserError) -> Self {
        GatewayError::ValidationRejected {
            stage: ValidationStage::Syntax,
            reason: format!("SQL parsing error: {}", err),
        }
    }
}

impl From<config::ConfigError> for GatewayError {
    fn from(err: config::ConfigError) -> Self {
        GatewayError::Configuration(err.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Configuration(format!("Invalid JSON: {}", err))
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        GatewayError::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_maps_to_execution_failure() {
        let error = GatewayError::Timeout(250);
        assert_eq!(error.kind(), ErrorKind::ExecutionFailure);
        assert_eq!(error.code(), "QUERY_TIMEOUT");
        assert!(error.user_message().contains("timeout"));
    }

    #[test]
    fn test_execution_failure_hides_driver_detail() {
        let error = GatewayError::ExecutionFailure("ORA-00942: relation secret_table".to_string());
        let detail = error.to_detail();
        assert_eq!(detail.kind, ErrorKind::ExecutionFailure);
        assert!(!detail.message.contains("secret_table"));
    }

    #[test]
    fn test_validation_rejection_names_stage() {
        let error = GatewayError::ValidationRejected {
            stage: ValidationStage::Complexity,
            reason: "too many joins".to_string(),
        };
        let detail = error.to_detail();
        assert_eq!(detail.code, "VALIDATION_REJECTED");
        assert_eq!(detail.details.as_deref(), Some("complexity"));
        assert!(detail.message.contains("too many joins"));
    }
}
