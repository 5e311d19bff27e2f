use sqlparser::ast::{SetExpr, Statement};
use sqlparser::tokenizer::{Token, Whitespace};
use std::sync::Arc;

use crate::error::GatewayError;
use crate::models::{
    SchemaCatalog, SecuritySeverity, SecurityWarning, ValidationReport, ValidationStage,
};
use crate::validation::sql_analysis::{
    self, analyze, bare_word, functions_over_columns, selects_in, significant_tokens, top_query,
    StatementAnalysis,
};

/// Keywords that may never appear as a bare token in an executed statement
pub const DENYLISTED_KEYWORDS: &[&str] = &[
    "DROP", "DELETE", "UPDATE", "INSERT", "ALTER", "CREATE", "TRUNCATE", "REPLACE", "MERGE",
    "GRANT", "REVOKE", "EXECUTE", "EXEC", "CALL", "DECLARE", "BEGIN", "END",
];

/// Name prefixes of administrative procedures and packages
pub const ADMIN_PROCEDURE_PREFIXES: &[&str] = &["XP_", "SP_", "DBMS_", "UTL_"];

pub const DEFAULT_MAX_JOINS: usize = 10;
pub const DEFAULT_MAX_SUBQUERIES: usize = 5;

/// Complexity bounds enforced before execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatorLimits {
    pub max_joins: usize,
    pub max_subqueries: usize,
}

impl Default for ValidatorLimits {
    fn default() -> Self {
        Self {
            max_joins: DEFAULT_MAX_JOINS,
            max_subqueries: DEFAULT_MAX_SUBQUERIES,
        }
    }
}

/// A statement that passed every hard validation gate.
///
/// Only the validator can construct one, so holding a `ValidatedSql` is proof
/// that `ValidationReport::allowed` was true for exactly this text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSql(String);

impl ValidatedSql {
    pub(crate) fn new(sql: impl Into<String>) -> Self {
        Self(sql.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Outcome of a single hard-gate stage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageOutcome {
    pub warnings: Vec<SecurityWarning>,
    pub failure: Option<String>,
}

impl StageOutcome {
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }

    fn fail(&mut self, reason: String) {
        if self.failure.is_none() {
            self.failure = Some(reason);
        }
    }

    fn warn(&mut self, stage: ValidationStage, severity: SecuritySeverity, message: String) {
        self.warnings.push(SecurityWarning {
            stage,
            severity,
            message,
        });
    }
}

/// Tokens and parse tree produced by the syntax stage
#[derive(Debug, Clone)]
pub struct SyntaxOutcome {
    pub tokens: Option<Vec<Token>>,
    pub statement: Option<Statement>,
    pub error: Option<String>,
}

/// Staged SQL validation service for ensuring queries are safe and valid
pub struct SqlValidator {
    catalog: Arc<SchemaCatalog>,
    limits: ValidatorLimits,
}

impl SqlValidator {
    pub fn new(catalog: Arc<SchemaCatalog>, limits: ValidatorLimits) -> Self {
        Self { catalog, limits }
    }

    pub fn limits(&self) -> ValidatorLimits {
        self.limits
    }

    /// Run the full pipeline and report on `sql`.
    ///
    /// Hard gates short-circuit `allowed` at the first failure. The lexical
    /// screens (command and injection) only need tokens, so their findings
    /// are reported even when the statement does not parse, and a lexical
    /// failure is named as the rejecting stage ahead of a parse error:
    /// `SELECT 1; DROP TABLE FIR` is an injection, not a typo.
    pub fn validate(&self, sql: &str) -> ValidationReport {
        let mut report = ValidationReport::pending();

        if sql.trim().is_empty() {
            report.reject(ValidationStage::Syntax, "Empty SQL query");
            return report;
        }

        let syntax = Self::syntax_stage(sql);
        report.syntax_valid = syntax.error.is_none();

        let Some(tokens) = syntax.tokens.as_deref() else {
            report.reject(
                ValidationStage::Syntax,
                syntax.error.unwrap_or_else(|| "SQL could not be tokenized".to_string()),
            );
            return report;
        };

        let command = Self::command_stage(tokens, syntax.statement.as_ref());
        let injection = Self::injection_stage(tokens);
        report.security_valid = command.passed() && injection.passed();
        report.security_warnings.extend(command.warnings.iter().cloned());
        report.security_warnings.extend(injection.warnings.iter().cloned());

        if let Some(reason) = command.failure {
            report.reject(ValidationStage::Command, reason);
            return report;
        }
        if let Some(reason) = injection.failure {
            report.reject(ValidationStage::Injection, reason);
            return report;
        }
        if let Some(error) = syntax.error {
            report.reject(ValidationStage::Syntax, error);
            return report;
        }

        let Some(statement) = syntax.statement else {
            report.reject(ValidationStage::Syntax, "Empty SQL query");
            return report;
        };

        let analysis = analyze(&statement);
        report.tables = analysis.table_names();
        report.join_count = analysis.join_count;
        report.subquery_count = analysis.subquery_count();

        if let Some(reason) = self.allow_list_stage(&analysis).failure {
            report.reject(ValidationStage::AllowList, reason);
            return report;
        }
        if let Some(reason) = self.complexity_stage(&analysis).failure {
            report.reject(ValidationStage::Complexity, reason);
            return report;
        }

        report.performance_warnings = Self::performance_stage(&statement);
        report.allowed = true;
        report
    }

    /// Validate and hand back an executable statement when allowed
    pub fn approve(&self, sql: &str) -> (ValidationReport, Option<ValidatedSql>) {
        let report = self.validate(sql);
        if let (Some(stage), Some(reason)) = (report.rejected_stage, &report.rejection_reason) {
            tracing::debug!("Statement rejected at {} stage: {}", stage, reason);
        }
        let validated = report.allowed.then(|| ValidatedSql::new(sql));
        (report, validated)
    }

    /// Validate, turning a rejection into an error
    pub fn check(&self, sql: &str) -> Result<ValidatedSql, GatewayError> {
        let (report, validated) = self.approve(sql);
        validated.ok_or_else(|| GatewayError::ValidationRejected {
            stage: report.rejected_stage.unwrap_or(ValidationStage::Syntax),
            reason: report
                .rejection_reason
                .unwrap_or_else(|| "statement rejected".to_string()),
        })
    }

    /// Stage 1: the text tokenizes and parses as exactly one statement
    pub fn syntax_stage(sql: &str) -> SyntaxOutcome {
        let tokens = match sql_analysis::tokenize(sql) {
            Ok(tokens) => tokens,
            Err(e) => {
                return SyntaxOutcome {
                    tokens: None,
                    statement: None,
                    error: Some(format!("SQL tokenizing error: {}", e)),
                }
            }
        };

        let (statement, error) = match sql_analysis::parse_statements(sql) {
            Ok(mut statements) => match statements.len() {
                0 => (None, Some("Empty SQL query".to_string())),
                1 => (statements.pop(), None),
                n => (
                    None,
                    Some(format!("Expected exactly one SQL statement, found {}", n)),
                ),
            },
            Err(e) => (None, Some(format!("SQL parsing error: {}", e))),
        };

        SyntaxOutcome {
            tokens: Some(tokens),
            statement,
            error,
        }
    }

    /// Stage 2: SELECT-only, no denylisted keyword as a bare token
    pub fn command_stage(tokens: &[Token], statement: Option<&Statement>) -> StageOutcome {
        let mut outcome = StageOutcome::default();
        let significant = significant_tokens(tokens);

        let mut offending: Vec<String> = Vec::new();
        for word in significant.iter().filter_map(|t| bare_word(t)) {
            if DENYLISTED_KEYWORDS.contains(&word.as_str()) && !offending.contains(&word) {
                offending.push(word);
            }
        }
        for keyword in &offending {
            outcome.warn(
                ValidationStage::Command,
                SecuritySeverity::Critical,
                format!("Dangerous keyword '{}' not allowed", keyword),
            );
        }
        if let Some(first) = offending.first() {
            outcome.fail(format!("Dangerous keyword '{}' not allowed", first));
        }

        let starts_with_select = significant
            .first()
            .and_then(|t| bare_word(t))
            .is_some_and(|w| w == "SELECT");
        if !starts_with_select {
            outcome.warn(
                ValidationStage::Command,
                SecuritySeverity::Critical,
                "Only SELECT statements are allowed".to_string(),
            );
            outcome.fail("Only SELECT statements are allowed".to_string());
        }

        if let Some(statement) = statement {
            match statement {
                Statement::Query(query) => {
                    let writes_into = selects_in(&query.body).iter().any(|s| s.into.is_some());
                    if writes_into {
                        outcome.warn(
                            ValidationStage::Command,
                            SecuritySeverity::Critical,
                            "SELECT ... INTO is not allowed".to_string(),
                        );
                        outcome.fail("SELECT ... INTO is not allowed".to_string());
                    }
                }
                other => {
                    let message = format!(
                        "{} statements are not allowed. Only SELECT queries are permitted.",
                        statement_kind(other)
                    );
                    outcome.warn(
                        ValidationStage::Command,
                        SecuritySeverity::Critical,
                        message.clone(),
                    );
                    outcome.fail(message);
                }
            }
        }

        outcome
    }

    /// Stage 3: comments, stacked statements, tautologies, admin procedures
    pub fn injection_stage(tokens: &[Token]) -> StageOutcome {
        let mut outcome = StageOutcome::default();

        let has_line_comment = tokens
            .iter()
            .any(|t| matches!(t, Token::Whitespace(Whitespace::SingleLineComment { .. })));
        if has_line_comment {
            outcome.warn(
                ValidationStage::Injection,
                SecuritySeverity::High,
                "Potential SQL injection: comment token '--' detected".to_string(),
            );
        }

        let has_block_comment = tokens
            .iter()
            .any(|t| matches!(t, Token::Whitespace(Whitespace::MultiLineComment(_))));
        if has_block_comment {
            outcome.warn(
                ValidationStage::Injection,
                SecuritySeverity::High,
                "Potential SQL injection: comment block '/* */' detected".to_string(),
            );
        }

        let significant = significant_tokens(tokens);

        let stacked = significant
            .iter()
            .position(|t| matches!(t, Token::SemiColon))
            .is_some_and(|idx| {
                significant[idx + 1..]
                    .iter()
                    .any(|t| !matches!(t, Token::SemiColon | Token::EOF))
            });
        if stacked {
            outcome.warn(
                ValidationStage::Injection,
                SecuritySeverity::Critical,
                "Potential SQL injection: stacked statements after ';'".to_string(),
            );
        }

        let tautology = has_tautology(&significant);
        if tautology {
            outcome.warn(
                ValidationStage::Injection,
                SecuritySeverity::High,
                "Potential SQL injection: boolean tautology in predicate".to_string(),
            );
            if has_union_select(&significant) {
                outcome.warn(
                    ValidationStage::Injection,
                    SecuritySeverity::High,
                    "Potential SQL injection: UNION SELECT combined with boolean tautology"
                        .to_string(),
                );
            }
        }

        let mut procedures: Vec<String> = Vec::new();
        for token in &significant {
            if let Token::Word(word) = token {
                let upper = word.value.to_uppercase();
                if ADMIN_PROCEDURE_PREFIXES.iter().any(|p| upper.starts_with(p))
                    && !procedures.contains(&upper)
                {
                    procedures.push(upper);
                }
            }
        }
        for procedure in &procedures {
            outcome.warn(
                ValidationStage::Injection,
                SecuritySeverity::Critical,
                format!("Administrative procedure '{}' not allowed", procedure),
            );
        }

        if let Some(first) = outcome.warnings.first() {
            let reason = first.message.clone();
            outcome.fail(reason);
        }
        outcome
    }

    /// Stage 4: every referenced table is in the catalog
    pub fn allow_list_stage(&self, analysis: &StatementAnalysis) -> StageOutcome {
        let mut outcome = StageOutcome::default();

        if let Some(relation) = analysis.unsupported_relations.first() {
            outcome.fail(format!("Relation '{}' is not a catalog table", relation));
            return outcome;
        }

        let denied = analysis.tables.iter().find(|t| {
            !self.catalog.is_allowed(&t.name)
                || t.schema
                    .as_deref()
                    .is_some_and(|schema| !self.catalog.allows_schema(schema))
        });
        if let Some(table) = denied {
            outcome.fail(format!(
                "Access to table '{}' not allowed",
                table.qualified_name()
            ));
        }
        outcome
    }

    /// Stage 5: join and nested SELECT bounds
    pub fn complexity_stage(&self, analysis: &StatementAnalysis) -> StageOutcome {
        let mut outcome = StageOutcome::default();
        if analysis.join_count > self.limits.max_joins {
            outcome.fail(format!(
                "Too many JOINs: {} (max {} allowed)",
                analysis.join_count, self.limits.max_joins
            ));
        } else if analysis.subquery_count() > self.limits.max_subqueries {
            outcome.fail(format!(
                "Too many nested SELECTs: {} (max {} allowed)",
                analysis.subquery_count(),
                self.limits.max_subqueries
            ));
        }
        outcome
    }

    /// Stage 6: advisory warnings, never blocking
    pub fn performance_stage(statement: &Statement) -> Vec<String> {
        let mut warnings = Vec::new();
        let Some(query) = top_query(statement) else {
            return warnings;
        };

        for select in selects_in(&query.body) {
            if select.from.len() > 1 && select.selection.is_none() {
                warnings.push(
                    "Potential Cartesian product: multiple tables without WHERE clause".to_string(),
                );
            }
            if let Some(selection) = &select.selection {
                let functions = functions_over_columns(selection);
                if !functions.is_empty() {
                    warnings.push(format!(
                        "Functions in WHERE clause may prevent index usage: {}",
                        functions.join(", ")
                    ));
                }
            }
        }

        if query.order_by.is_some() && query.limit_clause.is_none() {
            warnings.push("ORDER BY without LIMIT sorts the entire result set".to_string());
        }

        warnings
    }

    /// Check if query has LIMIT clause and append if missing
    /// Uses AST parsing to properly detect LIMIT clauses, avoiding false positives
    pub fn ensure_limit(sql: &str, limit: u64) -> Result<String, GatewayError> {
        let statements = sql_analysis::parse_statements(sql)?;
        let statement = statements.first().ok_or_else(|| GatewayError::ValidationRejected {
            stage: ValidationStage::Syntax,
            reason: "Empty SQL query".to_string(),
        })?;

        if Self::check_limit_in_statement(statement) {
            Ok(sql.to_string())
        } else {
            let trimmed_sql = sql.trim().trim_end_matches(';').trim_end();
            Ok(format!("{} LIMIT {}", trimmed_sql, limit))
        }
    }

    /// Check if SQL has LIMIT clause using AST parsing
    pub fn has_limit(sql: &str) -> bool {
        sql_analysis::parse_single(sql)
            .map(|statement| Self::check_limit_in_statement(&statement))
            .unwrap_or(false)
    }

    fn check_limit_in_statement(stmt: &Statement) -> bool {
        match stmt {
            Statement::Query(query) => {
                query.limit_clause.is_some()
                    || matches!(
                        query.body.as_ref(),
                        SetExpr::Query(inner) if inner.limit_clause.is_some()
                    )
            }
            _ => false,
        }
    }
}

/// `OR x = x` where both sides are the same literal or bare identifier
fn has_tautology(tokens: &[&Token]) -> bool {
    tokens.windows(4).any(|w| {
        let is_or = bare_word(w[0]).is_some_and(|k| k == "OR");
        let comparable = matches!(
            w[1],
            Token::Number(..) | Token::SingleQuotedString(_) | Token::Word(_)
        );
        is_or && comparable && matches!(w[2], Token::Eq) && w[1] == w[3]
    })
}

fn has_union_select(tokens: &[&Token]) -> bool {
    tokens.iter().enumerate().any(|(idx, token)| {
        if bare_word(token).as_deref() != Some("UNION") {
            return false;
        }
        let mut next = idx + 1;
        let quantifier = tokens.get(next).and_then(|t| bare_word(t));
        if matches!(quantifier.as_deref(), Some("ALL" | "DISTINCT")) {
            next += 1;
        }
        tokens
            .get(next)
            .and_then(|t| bare_word(t))
            .is_some_and(|w| w == "SELECT")
    })
}

/// Statement keyword used in rejection messages
fn statement_kind(statement: &Statement) -> &'static str {
    match statement {
        Statement::Query(_) => "SELECT",
        Statement::Insert { .. } => "INSERT",
        Statement::Update { .. } => "UPDATE",
        Statement::Delete { .. } => "DELETE",
        Statement::Merge { .. } => "MERGE",
        Statement::Drop { .. } => "DROP",
        Statement::Truncate { .. } => "TRUNCATE",
        Statement::CreateTable { .. } => "CREATE TABLE",
        Statement::CreateView { .. } => "CREATE VIEW",
        Statement::CreateIndex { .. } => "CREATE INDEX",
        Statement::AlterTable { .. } => "ALTER TABLE",
        Statement::Grant { .. } => "GRANT",
        Statement::Revoke { .. } => "REVOKE",
        Statement::Copy { .. } => "COPY",
        Statement::AttachDatabase { .. } => "ATTACH",
        Statement::Pragma { .. } => "PRAGMA",
        _ => "Non-SELECT",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUNTUR_SQL: &str = "SELECT ct.description AS crime_type, COUNT(*) AS count \
        FROM FIR f \
        JOIN DISTRICT_MASTER d ON f.district_id = d.district_id \
        JOIN CRIME_TYPE_MASTER ct ON f.crime_type_id = ct.crime_type_id \
        WHERE d.district_name = 'Guntur' \
        GROUP BY ct.description \
        ORDER BY count DESC";

    fn validator() -> SqlValidator {
        SqlValidator::new(Arc::new(SchemaCatalog::cctns()), ValidatorLimits::default())
    }

    fn tokens(sql: &str) -> Vec<Token> {
        sql_analysis::tokenize(sql).unwrap()
    }

    #[test]
    fn test_generated_district_query_is_allowed() {
        let report = validator().validate(GUNTUR_SQL);
        assert!(report.syntax_valid);
        assert!(report.security_valid);
        assert!(report.allowed, "unexpected rejection: {:?}", report.rejection_reason);
        assert_eq!(report.tables, vec!["FIR", "DISTRICT_MASTER", "CRIME_TYPE_MASTER"]);
        assert_eq!(report.join_count, 2);
        assert!(report
            .performance_warnings
            .iter()
            .any(|w| w.contains("ORDER BY without LIMIT")));
    }

    #[test]
    fn test_validate_select_only() {
        let v = validator();
        assert!(v.validate("SELECT * FROM FIR").allowed);
        assert!(!v.validate("INSERT INTO FIR VALUES (1)").allowed);
        assert!(!v.validate("UPDATE FIR SET status = 'closed'").allowed);
        assert!(!v.validate("DELETE FROM FIR").allowed);
    }

    #[test]
    fn test_statement_kind_names() {
        for (sql, kind) in [
            ("INSERT INTO FIR VALUES (1)", "INSERT"),
            ("DELETE FROM FIR", "DELETE"),
            ("DROP TABLE FIR", "DROP"),
            ("CREATE TABLE t (id INT)", "CREATE TABLE"),
            ("SELECT 1", "SELECT"),
        ] {
            let statement = sql_analysis::parse_single(sql).unwrap();
            assert_eq!(statement_kind(&statement), kind, "{}", sql);
        }
    }

    #[test]
    fn test_denylisted_keywords_any_case() {
        let v = validator();
        for keyword in DENYLISTED_KEYWORDS {
            for variant in [keyword.to_string(), keyword.to_lowercase()] {
                let sql = format!("SELECT * FROM FIR WHERE {} = 1", variant);
                let report = v.validate(&sql);
                assert!(!report.security_valid, "{} should be flagged", sql);
                assert!(!report.allowed);
            }
        }
    }

    #[test]
    fn test_denylist_matches_whole_tokens_only() {
        let report = validator().validate(
            "SELECT f.fir_id, 'DROP TABLE' AS note FROM FIR f WHERE f.status = 'updated'",
        );
        assert!(report.security_valid);
        assert!(report.allowed);

        let report = validator().validate("SELECT created_at_dropdown FROM FIR");
        assert!(report.security_valid);
    }

    #[test]
    fn test_stacked_drop_is_rejected_with_keyword_named() {
        let report = validator().validate("SELECT * FROM FIR; DROP TABLE FIR; --");
        assert!(!report.allowed);
        assert!(!report.security_valid);
        assert!(!report.syntax_valid);
        assert_eq!(report.rejected_stage, Some(ValidationStage::Command));
        let messages = report.security_messages();
        assert!(messages.iter().any(|m| m.contains("DROP")));
        assert!(messages.iter().any(|m| m.contains("stacked")));
        assert!(messages.iter().any(|m| m.contains("--")));
    }

    #[test]
    fn test_command_stage_requires_select_first() {
        let outcome =
            SqlValidator::command_stage(&tokens("WITH x AS (SELECT 1) SELECT * FROM x"), None);
        assert!(!outcome.passed());
        let outcome = SqlValidator::command_stage(&tokens("  select 1"), None);
        assert!(outcome.passed());
    }

    #[test]
    fn test_injection_stage_reports_each_pattern() {
        let outcome = SqlValidator::injection_stage(&tokens(
            "SELECT * FROM FIR WHERE fir_id = 1 OR 1 = 1 UNION SELECT * FROM ARREST /* x */",
        ));
        assert!(!outcome.passed());
        let messages: Vec<&str> = outcome.warnings.iter().map(|w| w.message.as_str()).collect();
        assert!(messages.iter().any(|m| m.contains("/* */")));
        assert!(messages.iter().any(|m| m.contains("tautology in predicate")));
        assert!(messages.iter().any(|m| m.contains("UNION SELECT combined")));
    }

    #[test]
    fn test_injection_stage_ignores_literal_comment_markers() {
        let outcome = SqlValidator::injection_stage(&tokens(
            "SELECT * FROM FIR WHERE fir_number = 'AP--2024/01'",
        ));
        assert!(outcome.passed());
    }

    #[test]
    fn test_union_without_tautology_is_not_injection() {
        let outcome = SqlValidator::injection_stage(&tokens(
            "SELECT fir_id FROM FIR UNION SELECT fir_id FROM ARREST",
        ));
        assert!(outcome.passed());
    }

    #[test]
    fn test_admin_procedures() {
        let outcome = SqlValidator::injection_stage(&tokens("SELECT xp_cmdshell('dir')"));
        assert!(!outcome.passed());
        assert_eq!(outcome.warnings[0].severity, SecuritySeverity::Critical);
        assert!(outcome.warnings[0].message.contains("XP_CMDSHELL"));
    }

    #[test]
    fn test_unknown_table_is_named() {
        let report = validator().validate("SELECT * FROM FIR f JOIN users u ON u.id = f.fir_id");
        assert!(!report.allowed);
        assert_eq!(report.rejected_stage, Some(ValidationStage::AllowList));
        assert!(report.rejection_reason.unwrap().contains("users"));
    }

    #[test]
    fn test_allow_list_is_case_insensitive() {
        let report =
            validator().validate("select * from fir join arrest on arrest.fir_id = fir.fir_id");
        assert!(report.allowed);
    }

    #[test]
    fn test_unknown_schema_qualifier_rejected() {
        let report = validator().validate("SELECT * FROM attacker_schema.FIR");
        assert!(!report.allowed);
        assert_eq!(report.rejected_stage, Some(ValidationStage::AllowList));
        let reason = report.rejection_reason.unwrap();
        assert!(reason.contains("'attacker_schema.FIR'"), "{}", reason);

        let report = validator()
            .validate("SELECT f.fir_id FROM FIR f JOIN evil.cctns.ARREST a ON a.fir_id = f.fir_id");
        assert_eq!(report.rejected_stage, Some(ValidationStage::AllowList));
    }

    #[test]
    fn test_catalog_schema_qualifier_accepted() {
        let report = validator()
            .validate(r#"SELECT * FROM cctns.FIR JOIN "public"."ARREST" a ON a.fir_id = 1"#);
        assert!(report.allowed, "{:?}", report.rejection_reason);
    }

    #[test]
    fn test_eleven_joins_rejected() {
        let mut sql = "SELECT * FROM FIR f0".to_string();
        for i in 1..=11 {
            sql.push_str(&format!(" JOIN ARREST a{} ON a{}.fir_id = f0.fir_id", i, i));
        }
        let report = validator().validate(&sql);
        assert!(!report.allowed);
        assert_eq!(report.rejected_stage, Some(ValidationStage::Complexity));
        let reason = report.rejection_reason.unwrap();
        assert!(reason.contains("max 10"), "{}", reason);
        assert_eq!(report.join_count, 11);
    }

    #[test]
    fn test_ten_joins_allowed() {
        let mut sql = "SELECT * FROM FIR f0".to_string();
        for i in 1..=10 {
            sql.push_str(&format!(" JOIN ARREST a{} ON a{}.fir_id = f0.fir_id", i, i));
        }
        assert!(validator().validate(&sql).allowed);
    }

    #[test]
    fn test_nested_select_limit() {
        let mut sql = "SELECT fir_id FROM FIR".to_string();
        for _ in 0..6 {
            sql = format!("SELECT fir_id FROM FIR WHERE fir_id IN ({})", sql);
        }
        let report = validator().validate(&sql);
        assert_eq!(report.rejected_stage, Some(ValidationStage::Complexity));
        assert!(report.rejection_reason.unwrap().contains("nested SELECTs"));
    }

    #[test]
    fn test_syntax_failure_short_circuits() {
        let report = validator().validate("SELECT * FROM FIR WHERE");
        assert!(!report.syntax_valid);
        assert!(!report.allowed);
        assert_eq!(report.rejected_stage, Some(ValidationStage::Syntax));
    }

    #[test]
    fn test_performance_warnings_do_not_block() {
        let report = validator().validate("SELECT * FROM FIR, DISTRICT_MASTER");
        assert!(report.allowed);
        assert!(report.performance_warnings.iter().any(|w| w.contains("Cartesian")));

        let report = validator().validate("SELECT * FROM FIR WHERE UPPER(status) = 'OPEN'");
        assert!(report.allowed);
        assert!(report.performance_warnings.iter().any(|w| w.contains("UPPER")));
    }

    #[test]
    fn test_approve_only_yields_allowed_sql() {
        let (report, validated) = validator().approve("SELECT * FROM FIR");
        assert!(report.allowed);
        assert_eq!(validated.unwrap().as_str(), "SELECT * FROM FIR");

        let (report, validated) = validator().approve("SELECT * FROM secrets");
        assert!(!report.allowed);
        assert!(validated.is_none());
    }

    #[test]
    fn test_check_returns_stage_in_error() {
        let err = validator().check("DROP TABLE FIR").unwrap_err();
        match err {
            GatewayError::ValidationRejected { stage, .. } => {
                assert_eq!(stage, ValidationStage::Command)
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_ensure_limit() {
        let result = SqlValidator::ensure_limit("SELECT * FROM FIR", 5).unwrap();
        assert_eq!(result, "SELECT * FROM FIR LIMIT 5");

        let sql = "SELECT * FROM FIR LIMIT 100";
        assert_eq!(SqlValidator::ensure_limit(sql, 5).unwrap(), sql);
    }

    #[test]
    fn test_has_limit_method() {
        assert!(!SqlValidator::has_limit("SELECT * FROM FIR"));
        assert!(SqlValidator::has_limit("SELECT * FROM FIR LIMIT 10"));
        assert!(!SqlValidator::has_limit("SELECT * FROM table_limit"));
        assert!(!SqlValidator::has_limit("SELECT limit_value FROM FIR"));
    }
}
