use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cctns_query_gateway::services::connection_pool::{SqliteLocation, SqlitePool};
use cctns_query_gateway::services::database::{DatabaseAdapter, QueryResult, SqliteAdapter};
use cctns_query_gateway::storage::sample_dataset;
use cctns_query_gateway::{
    AnalyticalFeature, ExecutionStats, ExecutorSettings, GatewayError, OrchestratorSettings,
    QueryMode, QueryOrchestrator, QueryParams, SchemaCatalog, SqlExecutor, SqlValidator,
    Transcriber, Transcription, Translator, ValidationStage, ValidatorLimits,
};

/// Adapter that counts calls and answers from a canned outcome
struct RecordingAdapter {
    calls: AtomicUsize,
    timeout: bool,
}

impl RecordingAdapter {
    fn new(timeout: bool) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            timeout,
        })
    }
}

#[async_trait::async_trait]
impl DatabaseAdapter for RecordingAdapter {
    async fn fetch(
        &self,
        _sql: &str,
        _params: Option<&QueryParams>,
        _max_rows: usize,
        timeout: Duration,
    ) -> Result<QueryResult, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.timeout {
            tokio::time::sleep(timeout).await;
            return Err(GatewayError::Timeout(timeout.as_millis() as u64));
        }
        Ok(QueryResult::default())
    }

    fn database_type(&self) -> &str {
        "recording"
    }

    async fn test_connection(&self) -> Result<(), GatewayError> {
        Ok(())
    }
}

struct FixedTranscriber(Transcription);

#[async_trait::async_trait]
impl Transcriber for FixedTranscriber {
    async fn transcribe(&self, _audio: &[u8], _language: &str) -> Result<Transcription, GatewayError> {
        Ok(self.0.clone())
    }
}

fn orchestrator_with(adapter: Arc<dyn DatabaseAdapter>, timeout: Duration) -> QueryOrchestrator {
    let catalog = Arc::new(SchemaCatalog::cctns());
    QueryOrchestrator::new(
        Arc::clone(&catalog),
        Translator::new(),
        SqlValidator::new(catalog, ValidatorLimits::default()),
        SqlExecutor::new(
            adapter,
            Arc::new(ExecutionStats::new()),
            ExecutorSettings {
                timeout,
                max_results: 1000,
            },
        ),
        OrchestratorSettings::default(),
    )
}

fn sample_orchestrator() -> QueryOrchestrator {
    let setup = sample_dataset();
    let pool = SqlitePool::open(SqliteLocation::Memory, 2, Duration::from_secs(1), Some(&setup))
        .expect("sample store");
    orchestrator_with(Arc::new(SqliteAdapter::new(pool)), Duration::from_secs(5))
}

#[tokio::test]
async fn guntur_crime_summary_end_to_end() {
    let orchestrator = sample_orchestrator();
    let result = orchestrator
        .run("Show crimes in Guntur district", QueryMode::Standard)
        .await;

    assert!(result.succeeded(), "{:?}", result.error);
    assert_eq!(result.confidence, 0.9);
    assert!(result.validation.as_ref().unwrap().allowed);

    let execution = result.execution.unwrap();
    assert_eq!(execution.columns, vec!["crime_type", "count"]);
    assert_eq!(execution.row_count, 4);
    assert_eq!(execution.rows[0]["crime_type"], "Theft");
    assert_eq!(execution.rows[0]["count"], 3);
    assert_eq!(orchestrator.stats().successful, 1);
}

#[tokio::test]
async fn stacked_statement_never_reaches_the_database() {
    let adapter = RecordingAdapter::new(false);
    let orchestrator = orchestrator_with(adapter.clone(), Duration::from_secs(1));

    let result = orchestrator.run_sql("SELECT * FROM FIR; DROP TABLE FIR; --").await;

    assert!(!result.succeeded());
    assert!(result.execution.is_none());
    let error = result.error.unwrap();
    assert_eq!(error.code, "VALIDATION_REJECTED");
    let report = result.validation.unwrap();
    assert!(!report.allowed);
    assert_eq!(report.rejected_stage, Some(ValidationStage::Command));
    assert!(!report.security_warnings.is_empty());

    assert_eq!(adapter.calls.load(Ordering::SeqCst), 0);
    let stats = orchestrator.stats();
    assert_eq!(stats.total, 0);
    assert_eq!(stats.failed, 0);
}

#[tokio::test]
async fn eleven_joins_rejected_at_complexity() {
    let adapter = RecordingAdapter::new(false);
    let orchestrator = orchestrator_with(adapter.clone(), Duration::from_secs(1));

    let mut sql = String::from("SELECT f0.fir_id FROM FIR f0");
    for i in 1..=11 {
        sql.push_str(&format!(" JOIN FIR f{i} ON f{prev}.fir_id = f{i}.fir_id", prev = i - 1));
    }

    let result = orchestrator.run_sql(&sql).await;
    let report = result.validation.unwrap();
    assert_eq!(report.rejected_stage, Some(ValidationStage::Complexity));
    assert_eq!(report.join_count, 11);
    assert!(report.rejection_reason.unwrap().contains("Too many JOINs"));
    assert_eq!(adapter.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn timeout_is_reported_with_its_own_code() {
    let adapter = RecordingAdapter::new(true);
    let orchestrator = orchestrator_with(adapter.clone(), Duration::from_millis(20));

    let result = orchestrator.run_sql("SELECT fir_id FROM FIR").await;

    assert!(!result.succeeded());
    assert_eq!(result.error.unwrap().code, "QUERY_TIMEOUT");
    let execution = result.execution.unwrap();
    assert!(!execution.success);
    assert!(execution.rows.is_empty());
    assert_eq!(adapter.calls.load(Ordering::SeqCst), 1);
    assert_eq!(orchestrator.stats().failed, 1);
}

#[tokio::test]
async fn untranslatable_query_gets_suggestions() {
    let adapter = RecordingAdapter::new(false);
    let orchestrator = orchestrator_with(adapter.clone(), Duration::from_secs(1));

    let result = orchestrator
        .run("how many elephants live here", QueryMode::Standard)
        .await;

    assert_eq!(result.error.unwrap().code, "TRANSLATION_MISS");
    assert!(result.sql.is_empty());
    assert!(result.execution.is_none());
    assert!(result.suggestions.len() > 4);
    assert!(result.suggestions.iter().any(|s| s.contains("Count FIRs")));
    assert_eq!(adapter.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn complex_mode_applies_top_n() {
    let orchestrator = sample_orchestrator();
    let result = orchestrator
        .run("top 2 crimes in Guntur district", QueryMode::Complex)
        .await;

    assert!(result.succeeded(), "{:?}", result.error);
    assert_eq!(result.features, vec![AnalyticalFeature::TopN { n: 2 }]);
    assert!(result.sql.ends_with("LIMIT 2"), "{}", result.sql);
    assert_eq!(result.row_count(), 2);
    assert!(result.visualization_suggestions.is_empty());
}

#[tokio::test]
async fn analytical_mode_groups_by_period() {
    let orchestrator = sample_orchestrator();
    let result = orchestrator
        .run("crimes trend in Guntur district", QueryMode::Analytical)
        .await;

    assert!(result.succeeded(), "{:?}", result.error);
    assert_eq!(result.features, vec![AnalyticalFeature::Trend]);
    assert!(result.sql.contains("GROUP BY f.incident_date"), "{}", result.sql);
    assert!(!result.visualization_suggestions.is_empty());

    let execution = result.execution.unwrap();
    assert_eq!(execution.columns, vec!["period", "count"]);
    assert_eq!(execution.row_count, 6);
    assert_eq!(execution.rows[0]["period"], "2024-01-05");
}

#[tokio::test]
async fn low_confidence_transcription_stops_early() {
    let adapter = RecordingAdapter::new(false);
    let orchestrator = orchestrator_with(adapter.clone(), Duration::from_secs(1));
    let transcriber = FixedTranscriber(Transcription {
        text: "Show crimes in Guntur district".to_string(),
        confidence: 0.4,
        language: "en".to_string(),
    });

    let result = orchestrator
        .run_voice(&transcriber, b"pcm", "en", QueryMode::Standard)
        .await;

    assert_eq!(result.error.unwrap().code, "TRANSLATION_MISS");
    assert!(!result.suggestions.is_empty());
    assert_eq!(adapter.calls.load(Ordering::SeqCst), 0);
}
