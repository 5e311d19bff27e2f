use sqlparser::ast::{visit_expressions, Expr, SelectItem};
use std::ops::ControlFlow;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::models::{
    AnalyticalFeature, ExecutionStatsSnapshot, OrchestrationResult, QueryContext, QueryMode,
    SchemaCatalog, TranslationMethod, ValidationStage,
};
use crate::services::collaborators::Transcriber;
use crate::services::database::DatabaseAdapter;
use crate::services::executor::{ExecutionStats, SqlExecutor};
use crate::services::schema_enhancer::SchemaEnhancer;
use crate::services::translator::Translator;
use crate::validation::sql_analysis::{from_scope, parse_single, selects_in, top_query};
use crate::validation::{SqlValidator, ValidatedSql};

/// Row cap applied for "top" requests that name no number
pub const DEFAULT_TOP_N: u64 = 10;

/// Thresholds the orchestrator applies before doing any work
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrchestratorSettings {
    pub confidence_threshold: f64,
    pub voice_confidence_threshold: f64,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            voice_confidence_threshold: 0.7,
        }
    }
}

/// Composes translation, enhancement, validation and execution
pub struct QueryOrchestrator {
    catalog: Arc<SchemaCatalog>,
    translator: Translator,
    enhancer: SchemaEnhancer,
    validator: SqlValidator,
    executor: SqlExecutor,
    settings: OrchestratorSettings,
}

impl QueryOrchestrator {
    pub fn new(
        catalog: Arc<SchemaCatalog>,
        translator: Translator,
        validator: SqlValidator,
        executor: SqlExecutor,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            enhancer: SchemaEnhancer::new(Arc::clone(&catalog)),
            catalog,
            translator,
            validator,
            executor,
            settings,
        }
    }

    /// Wire every stage from loaded configuration
    pub fn from_config(
        config: &GatewayConfig,
        catalog: Arc<SchemaCatalog>,
        adapter: Arc<dyn DatabaseAdapter>,
        stats: Arc<ExecutionStats>,
    ) -> Self {
        Self::new(
            Arc::clone(&catalog),
            Translator::new(),
            SqlValidator::new(catalog, config.validator_limits()),
            SqlExecutor::new(adapter, stats, config.executor_settings()),
            OrchestratorSettings {
                confidence_threshold: config.translator.confidence_threshold,
                voice_confidence_threshold: config.voice.confidence_threshold,
            },
        )
    }

    pub fn stats(&self) -> ExecutionStatsSnapshot {
        self.executor.stats().snapshot()
    }

    pub async fn test_connection(&self) -> Result<(), GatewayError> {
        self.executor.test_connection().await
    }

    pub async fn run(&self, text: &str, mode: QueryMode) -> OrchestrationResult {
        self.run_with_context(text, mode, &QueryContext::default()).await
    }

    pub async fn run_with_context(
        &self,
        text: &str,
        mode: QueryMode,
        context: &QueryContext,
    ) -> OrchestrationResult {
        info!("Processing {} query", mode);
        let mut result = OrchestrationResult::new(text, mode);

        let Some(base) = self.prepare(text, context, &mut result) else {
            return result;
        };

        let statement = match mode {
            QueryMode::Standard => base,
            QueryMode::Complex | QueryMode::Analytical => self.augment(text, mode, base, &mut result),
        };

        self.execute_into(&statement, &mut result).await;
        result
    }

    /// Validate and execute caller-supplied SQL.
    ///
    /// The text is untrusted, so it is not enhanced; it goes through the same
    /// validator as generated SQL.
    pub async fn run_sql(&self, sql: &str) -> OrchestrationResult {
        let mut result = OrchestrationResult::new(sql, QueryMode::Standard);
        result.sql = sql.to_string();
        result.original_sql = Some(sql.to_string());
        result.confidence = 1.0;
        result.method = TranslationMethod::None;

        let Some(validated) = self.validate_into(sql, &mut result) else {
            return result;
        };
        self.execute_into(&validated, &mut result).await;
        result
    }

    /// Transcribe a spoken query and run it
    pub async fn run_voice(
        &self,
        transcriber: &dyn Transcriber,
        audio: &[u8],
        language: &str,
        mode: QueryMode,
    ) -> OrchestrationResult {
        let transcription = match transcriber.transcribe(audio, language).await {
            Ok(transcription) => transcription,
            Err(e) => {
                warn!("Transcription failed: {}", e);
                let mut result = OrchestrationResult::new("", mode);
                result.suggestions = voice_suggestions();
                result.error = Some(e.to_detail());
                return result;
            }
        };

        if transcription.confidence < self.settings.voice_confidence_threshold {
            info!(
                "Transcription confidence {:.2} below threshold {:.2}",
                transcription.confidence, self.settings.voice_confidence_threshold
            );
            let mut result = OrchestrationResult::new(&transcription.text, mode);
            result.suggestions = voice_suggestions();
            result.error = Some(
                GatewayError::TranslationMiss(format!(
                    "speech recognized with low confidence ({:.2})",
                    transcription.confidence
                ))
                .to_detail(),
            );
            return result;
        }

        let mut result = self.run(&transcription.text, mode).await;
        result.diagnostics.push(format!(
            "Transcribed ({}) with confidence {:.2}",
            transcription.language, transcription.confidence
        ));
        result
    }

    /// Translate, enhance and validate; `None` means nothing may execute
    fn prepare(
        &self,
        text: &str,
        context: &QueryContext,
        result: &mut OrchestrationResult,
    ) -> Option<ValidatedSql> {
        let translation = self.translator.translate_with_context(text, context);
        result.confidence = translation.confidence;
        result.method = translation.method;

        if !translation.is_match() || translation.confidence < self.settings.confidence_threshold {
            let reason = translation.error.clone().unwrap_or_else(|| {
                format!(
                    "confidence {:.2} below threshold {:.2}",
                    translation.confidence, self.settings.confidence_threshold
                )
            });
            info!("Translation miss: {}", reason);
            result.suggestions = query_suggestions(text);
            result.error = Some(GatewayError::TranslationMiss(reason).to_detail());
            return None;
        }

        result.original_sql = Some(translation.sql.clone());
        let enhanced = self.enhancer.enhance(&translation.sql);
        self.validate_into(&enhanced, result)
    }

    fn validate_into(&self, sql: &str, result: &mut OrchestrationResult) -> Option<ValidatedSql> {
        result.sql = sql.to_string();
        result.optimization_suggestions = optimization_suggestions(sql);

        let (report, validated) = self.validator.approve(sql);
        if validated.is_none() {
            let stage = report.rejected_stage.unwrap_or(ValidationStage::Syntax);
            let reason = report
                .rejection_reason
                .clone()
                .unwrap_or_else(|| "statement rejected".to_string());
            warn!("Validation rejected SQL at {} stage: {}", stage, reason);
            result.error = Some(GatewayError::ValidationRejected { stage, reason }.to_detail());
        }
        result.validation = Some(report);
        validated
    }

    async fn execute_into(&self, statement: &ValidatedSql, result: &mut OrchestrationResult) {
        let execution = self.executor.execute(statement, None).await;
        if let Some(failure) = &execution.failure {
            result.error = Some(failure.clone());
        }
        result.execution = Some(execution);
    }

    /// Apply mode-specific rewrites and re-validate them.
    ///
    /// Falls back to the already validated base statement when the rewrite
    /// does not pass.
    fn augment(
        &self,
        text: &str,
        mode: QueryMode,
        base: ValidatedSql,
        result: &mut OrchestrationResult,
    ) -> ValidatedSql {
        let features = detect_features(text, mode);
        if mode == QueryMode::Analytical {
            result.visualization_suggestions = visualization_suggestions(&features);
        }
        result.features = features.clone();

        let mut sql = base.as_str().to_string();
        for feature in &features {
            let rewritten = match feature {
                AnalyticalFeature::Trend => self.trend_sql(&sql),
                AnalyticalFeature::Comparison => comparison_sql(&sql),
                AnalyticalFeature::TopN { n } => SqlValidator::ensure_limit(&sql, *n).ok(),
            };
            match rewritten {
                Some(rewritten) => sql = rewritten,
                None => result
                    .diagnostics
                    .push(format!("{:?} could not be applied to this query", feature)),
            }
        }

        if sql == base.as_str() {
            return base;
        }
        debug!("Augmented SQL: {}", sql);

        let (report, validated) = self.validator.approve(&sql);
        match validated {
            Some(validated) => {
                result.sql = sql;
                result.optimization_suggestions = optimization_suggestions(&result.sql);
                result.validation = Some(report);
                validated
            }
            None => {
                let reason = report
                    .rejection_reason
                    .unwrap_or_else(|| "statement rejected".to_string());
                warn!("Augmented SQL rejected, running base statement: {}", reason);
                result
                    .diagnostics
                    .push(format!("Augmented SQL rejected ({}); base query executed instead", reason));
                base
            }
        }
    }

    /// Regroup a single-block query by the first date column in scope
    fn trend_sql(&self, sql: &str) -> Option<String> {
        let statement = parse_single(sql)?;
        let query = top_query(&statement)?;
        let selects = selects_in(&query.body);
        let [select] = selects.as_slice() else {
            return None;
        };

        let (table, column) = select
            .from
            .iter()
            .flat_map(from_scope)
            .find_map(|t| self.catalog.temporal_column(&t.name).map(|c| (t.clone(), c.name.clone())))?;
        let period = format!("{}.{}", table.reference(), column);

        let from = select
            .from
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let filter = select
            .selection
            .as_ref()
            .map(|w| format!(" WHERE {}", w))
            .unwrap_or_default();

        Some(format!(
            "SELECT {period} AS period, COUNT(*) AS count FROM {from}{filter} GROUP BY {period} ORDER BY period"
        ))
    }
}

/// Order by the first aggregate alias when the query is not ordered yet
fn comparison_sql(sql: &str) -> Option<String> {
    let statement = parse_single(sql)?;
    let query = top_query(&statement)?;
    if query.order_by.is_some() {
        return Some(sql.to_string());
    }
    if query.limit_clause.is_some() {
        return None;
    }
    let select = *selects_in(&query.body).first()?;
    let alias = select.projection.iter().find_map(|item| match item {
        SelectItem::ExprWithAlias {
            expr: Expr::Function(_),
            alias,
        } => Some(alias.value.clone()),
        _ => None,
    })?;
    Some(format!(
        "{} ORDER BY {} DESC",
        sql.trim().trim_end_matches(';').trim_end(),
        alias
    ))
}

/// Analytical intent in the query text, in application order
pub fn detect_features(text: &str, mode: QueryMode) -> Vec<AnalyticalFeature> {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let has = |w: &str| words.iter().any(|word| *word == w);

    let mut features = Vec::new();
    if mode == QueryMode::Analytical
        && (has("trend") || has("trends") || has("monthly") || has("daily") || lowered.contains("over time"))
    {
        features.push(AnalyticalFeature::Trend);
    }
    if has("compare") || has("comparison") || has("vs") || has("versus") {
        features.push(AnalyticalFeature::Comparison);
    }
    if let Some(idx) = words.iter().position(|w| *w == "top") {
        let n = words
            .get(idx + 1)
            .and_then(|w| w.parse::<u64>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_TOP_N);
        features.push(AnalyticalFeature::TopN { n });
    }
    features
}

fn visualization_suggestions(features: &[AnalyticalFeature]) -> Vec<String> {
    let mut suggestions: Vec<String> = features
        .iter()
        .map(|feature| match feature {
            AnalyticalFeature::Trend => "Line chart of counts per period".to_string(),
            AnalyticalFeature::Comparison => "Grouped bar chart comparing categories".to_string(),
            AnalyticalFeature::TopN { n } => format!("Horizontal bar chart of the top {} entries", n),
        })
        .collect();
    if suggestions.is_empty() {
        suggestions.push("Bar chart of counts per category".to_string());
    }
    suggestions.push("Table view of the result rows".to_string());
    suggestions
}

/// Static advice derived from the final statement
pub fn optimization_suggestions(sql: &str) -> Vec<String> {
    let Some(statement) = parse_single(sql) else {
        return Vec::new();
    };
    let Some(query) = top_query(&statement) else {
        return Vec::new();
    };

    let mut suggestions = Vec::new();
    let selects = selects_in(&query.body);

    let selects_wildcard = selects.iter().any(|s| {
        s.projection
            .iter()
            .any(|item| matches!(item, SelectItem::Wildcard(_) | SelectItem::QualifiedWildcard(..)))
    });
    if selects_wildcard {
        suggestions.push("Consider selecting specific columns instead of *".to_string());
    }

    if query.order_by.is_some() && query.limit_clause.is_none() {
        suggestions.push("ORDER BY without LIMIT may impact performance".to_string());
    }

    let mut filtered: Vec<String> = Vec::new();
    for selection in selects.iter().filter_map(|s| s.selection.as_ref()) {
        let _ = visit_expressions(selection, |expr| {
            if let Expr::Identifier(_) | Expr::CompoundIdentifier(_) = expr {
                let column = expr.to_string();
                if !filtered.contains(&column) {
                    filtered.push(column);
                }
            }
            ControlFlow::<()>::Continue(())
        });
    }
    if !filtered.is_empty() {
        suggestions.push(format!(
            "Consider adding indexes on WHERE clause columns: {}",
            filtered.join(", ")
        ));
    }

    suggestions
}

/// Example phrasings for a query that could not be translated
pub fn query_suggestions(failed_query: &str) -> Vec<String> {
    let mut suggestions = vec![
        "Try using simpler language".to_string(),
        "Specify the exact table or data you're looking for".to_string(),
        "Include specific date ranges or filters".to_string(),
        "Use police-specific terms (FIR, SHO, district, etc.)".to_string(),
    ];

    let query_lower = failed_query.to_lowercase();
    if query_lower.contains("show") || query_lower.contains("display") {
        suggestions.push("Try: 'Show crimes in Guntur district'".to_string());
    }
    if query_lower.contains("count") || query_lower.contains("how many") {
        suggestions.push("Try: 'Count FIRs registered this month'".to_string());
    }
    if query_lower.contains("officer") {
        suggestions.push("Try: 'Show officer arrest performance'".to_string());
    }
    suggestions
}

fn voice_suggestions() -> Vec<String> {
    vec![
        "Speak clearly and close to the microphone".to_string(),
        "Reduce background noise and try again".to_string(),
        "Type the query instead".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_features() {
        assert_eq!(
            detect_features("top 5 crimes in Guntur district", QueryMode::Complex),
            vec![AnalyticalFeature::TopN { n: 5 }]
        );
        assert_eq!(
            detect_features("compare crimes vs last year, top crimes", QueryMode::Complex),
            vec![AnalyticalFeature::Comparison, AnalyticalFeature::TopN { n: DEFAULT_TOP_N }]
        );
        // Trend is an analytical-only rewrite
        assert!(detect_features("crime trend in Guntur", QueryMode::Complex).is_empty());
        assert_eq!(
            detect_features("crime trend in Guntur", QueryMode::Analytical),
            vec![AnalyticalFeature::Trend]
        );
        assert!(detect_features("stop the count", QueryMode::Analytical).is_empty());
    }

    #[test]
    fn test_optimization_suggestions() {
        let suggestions = optimization_suggestions("SELECT * FROM FIR WHERE status = 'open' ORDER BY fir_id");
        assert!(suggestions.iter().any(|s| s.contains("instead of *")));
        assert!(suggestions.iter().any(|s| s.contains("ORDER BY without LIMIT")));
        assert!(suggestions.iter().any(|s| s.contains("indexes") && s.contains("status")));

        assert!(optimization_suggestions("SELECT fir_id FROM FIR LIMIT 3").is_empty());
    }

    #[test]
    fn test_query_suggestions_follow_keywords() {
        let suggestions = query_suggestions("how many officers are there");
        assert_eq!(suggestions.len(), 6);
        assert!(suggestions.iter().any(|s| s.contains("Count FIRs")));
        assert!(suggestions.iter().any(|s| s.contains("officer")));
    }

    #[test]
    fn test_comparison_orders_by_aggregate() {
        let sql = comparison_sql("SELECT status, COUNT(*) AS total FROM FIR GROUP BY status").unwrap();
        assert!(sql.ends_with("ORDER BY total DESC"));
        let ordered = "SELECT status, COUNT(*) AS total FROM FIR GROUP BY status ORDER BY status";
        assert_eq!(comparison_sql(ordered).unwrap(), ordered);
    }
}
