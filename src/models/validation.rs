use serde::{Deserialize, Serialize};
use std::fmt;

/// Stages of the validation pipeline, in execution order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStage {
    Syntax,
    Command,
    Injection,
    AllowList,
    Complexity,
    Performance,
}

impl ValidationStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStage::Syntax => "syntax",
            ValidationStage::Command => "command",
            ValidationStage::Injection => "injection",
            ValidationStage::AllowList => "allow_list",
            ValidationStage::Complexity => "complexity",
            ValidationStage::Performance => "performance",
        }
    }
}

impl fmt::Display for ValidationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed severity classification for security findings
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum SecuritySeverity {
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SecurityWarning {
    pub stage: ValidationStage,
    pub severity: SecuritySeverity,
    pub message: String,
}

/// Result of running a statement through the validator.
///
/// `allowed` holds only when every hard gate (syntax, command, injection,
/// allow-list, complexity) passed. Performance warnings never affect it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationReport {
    pub syntax_valid: bool,
    pub security_valid: bool,
    pub security_warnings: Vec<SecurityWarning>,
    pub performance_warnings: Vec<String>,
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected_stage: Option<ValidationStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    /// Tables referenced in FROM/JOIN clauses
    pub tables: Vec<String>,
    pub join_count: usize,
    pub subquery_count: usize,
}

impl ValidationReport {
    pub(crate) fn pending() -> Self {
        Self {
            syntax_valid: false,
            security_valid: false,
            security_warnings: Vec::new(),
            performance_warnings: Vec::new(),
            allowed: false,
            rejected_stage: None,
            rejection_reason: None,
            tables: Vec::new(),
            join_count: 0,
            subquery_count: 0,
        }
    }

    pub(crate) fn reject(&mut self, stage: ValidationStage, reason: impl Into<String>) {
        self.allowed = false;
        if self.rejected_stage.is_none() {
            self.rejected_stage = Some(stage);
            self.rejection_reason = Some(reason.into());
        }
    }

    /// Security warning messages only
    pub fn security_messages(&self) -> Vec<&str> {
        self.security_warnings.iter().map(|w| w.message.as_str()).collect()
    }
}
