// Interfaces for the speech and reporting services the gateway talks to.
// Model-backed implementations live outside this crate.
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::models::ExecutionResult;

/// Text recognized from an audio clip
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transcription {
    pub text: String,
    pub confidence: f64,
    pub language: String,
}

/// Speech-to-text service
#[async_trait::async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &[u8], language: &str) -> Result<Transcription, GatewayError>;
}

/// Human-readable digest of a result set
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Report {
    pub summary: String,
    pub highlights: Vec<String>,
}

/// Summarization service consuming result sets
#[async_trait::async_trait]
pub trait Reporter: Send + Sync {
    async fn summarize(&self, query: &str, result: &ExecutionResult) -> Result<Report, GatewayError>;
}

/// Model-free reporter: row count and column overview
#[derive(Debug, Clone, Copy, Default)]
pub struct TabularReporter;

#[async_trait::async_trait]
impl Reporter for TabularReporter {
    async fn summarize(&self, query: &str, result: &ExecutionResult) -> Result<Report, GatewayError> {
        if !result.success {
            return Ok(Report {
                summary: format!("No results for \"{}\"", query),
                highlights: result.error.iter().cloned().collect(),
            });
        }

        let mut summary = format!(
            "Query \"{}\" returned {} row(s) across {} column(s)",
            query,
            result.row_count,
            result.columns.len()
        );
        if result.truncated {
            summary.push_str(" (truncated)");
        }

        let mut highlights = Vec::new();
        if !result.columns.is_empty() {
            highlights.push(format!("Columns: {}", result.columns.join(", ")));
        }
        if let Some(first) = result.rows.first() {
            let preview: Vec<String> = first.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            highlights.push(format!("First row: {}", preview.join(", ")));
        }

        Ok(Report {
            summary,
            highlights,
        })
    }
}
