//! Contract failure types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write as _;
use thiserror::Error;

/// Structured metadata for surfaced contract violations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContractErrorInfo {
    /// Stable identifier that maps to a runbook entry.
    pub code: String,
    /// Human-readable description of the issue.
    pub summary: String,
    /// Optional remediation guidance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix_hint: Option<String>,
    /// Structured data for downstream tooling.
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Adds a fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds context data.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Serialize the metadata for logging or API responses.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut dict = HashMap::new();
        dict.insert("code".to_string(), serde_json::json!(self.code));
        dict.insert("summary".to_string(), serde_json::json!(self.summary));
        dict.insert("fix_hint".to_string(), serde_json::json!(self.fix_hint));
        dict.insert("context".to_string(), serde_json::json!(self.context));
        dict
    }
}

/// Contract error codes.
pub mod codes {
    /// The contract descriptor or its schema/spec is unusable.
    pub const CONFIGURATION: &str = "CONTRACT-000-CONFIG";
    /// No validator is registered for the contract kind.
    pub const UNKNOWN_KIND: &str = "CONTRACT-000-UNKNOWN_KIND";
    /// The step did not produce the output the contract checks.
    pub const MISSING_OUTPUT: &str = "CONTRACT-001-MISSING_OUTPUT";
    /// The output could not be parsed.
    pub const MALFORMED: &str = "CONTRACT-001-MALFORMED";
    /// The output violates its JSON schema.
    pub const SCHEMA_VIOLATION: &str = "CONTRACT-002-SCHEMA";
    /// The output does not match its template.
    pub const TEMPLATE_MISMATCH: &str = "CONTRACT-003-TEMPLATE";
    /// The test command exited unsuccessfully.
    pub const TESTS_FAILED: &str = "CONTRACT-004-TESTS";
    /// The test command did not finish in time.
    pub const TIMEOUT: &str = "CONTRACT-004-TIMEOUT";
    /// The test command could not be started.
    pub const SPAWN: &str = "CONTRACT-004-SPAWN";
}

/// Failure class of a contract check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The contract itself is broken; retrying the step cannot help.
    Configuration,
    /// The step output was rejected; the step may be retried.
    Validation,
}

/// A rejected step output or an unusable contract.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ValidationFailure {
    /// Failure class.
    pub kind: FailureKind,
    /// Whether retrying the step may succeed.
    pub retryable: bool,
    /// One-line description.
    pub message: String,
    /// Individual violations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
    /// Last lines of the test command's stdout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout_tail: Option<String>,
    /// Last lines of the test command's stderr.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr_tail: Option<String>,
    /// Exit code of the test command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Structured error metadata.
    pub error_info: ContractErrorInfo,
}

impl ValidationFailure {
    fn new(kind: FailureKind, code: &str, message: String) -> Self {
        Self {
            kind,
            retryable: kind == FailureKind::Validation,
            error_info: ContractErrorInfo::new(code, message.clone()),
            message,
            details: Vec::new(),
            stdout_tail: None,
            stderr_tail: None,
            exit_code: None,
        }
    }

    /// A broken contract. Never retryable.
    #[must_use]
    pub fn configuration(code: &str, message: impl Into<String>) -> Self {
        Self::new(FailureKind::Configuration, code, message.into())
            .with_fix_hint("Fix the contract definition; retrying the step will not help.")
    }

    /// A rejected output. Retryable.
    #[must_use]
    pub fn validation(code: &str, message: impl Into<String>) -> Self {
        Self::new(FailureKind::Validation, code, message.into())
    }

    /// Sets the individual violations.
    #[must_use]
    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self
    }

    /// Attaches command output tails.
    #[must_use]
    pub fn with_output(mut self, stdout_tail: String, stderr_tail: String) -> Self {
        self.stdout_tail = Some(stdout_tail);
        self.stderr_tail = Some(stderr_tail);
        self
    }

    /// Sets the exit code.
    #[must_use]
    pub fn with_exit_code(mut self, code: Option<i32>) -> Self {
        self.exit_code = code;
        self
    }

    /// Adds a fix hint to the error metadata.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.error_info = self.error_info.with_fix_hint(hint);
        self
    }

    /// Adds context to the error metadata.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.error_info = self.error_info.with_context(key, value);
        self
    }

    /// Error code of the failure.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.error_info.code
    }

    /// True for contract configuration problems.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        self.kind == FailureKind::Configuration
    }

    /// Multi-line description including violations and output tails.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut out = format!("[{}] {}", self.code(), self.message);
        for detail in &self.details {
            let _ = write!(out, "\n  - {detail}");
        }
        if let Some(code) = self.exit_code {
            let _ = write!(out, "\nexit code: {code}");
        }
        for (label, tail) in [("stdout", &self.stdout_tail), ("stderr", &self.stderr_tail)] {
            if let Some(tail) = tail.as_deref().filter(|t| !t.is_empty()) {
                let _ = write!(out, "\n--- {label} (tail) ---\n{tail}");
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let config = ValidationFailure::configuration(codes::CONFIGURATION, "no schema");
        assert!(!config.retryable);
        assert!(config.is_configuration());
        assert!(config.error_info.fix_hint.is_some());

        let rejected = ValidationFailure::validation(codes::MALFORMED, "bad json");
        assert!(rejected.retryable);
        assert_eq!(rejected.kind, FailureKind::Validation);
        assert_eq!(rejected.code(), codes::MALFORMED);
    }

    #[test]
    fn test_describe_includes_details_and_tails() {
        let failure = ValidationFailure::validation(codes::TESTS_FAILED, "tests failed")
            .with_details(vec!["1 failing".to_string()])
            .with_exit_code(Some(1))
            .with_output("ok 1\nnot ok 2".to_string(), String::new());

        let text = failure.describe();
        assert!(text.starts_with("[CONTRACT-004-TESTS] tests failed"));
        assert!(text.contains("  - 1 failing"));
        assert!(text.contains("exit code: 1"));
        assert!(text.contains("--- stdout (tail) ---\nok 1\nnot ok 2"));
        assert!(!text.contains("stderr"));
    }

    #[test]
    fn test_error_info_to_dict() {
        let info = ContractErrorInfo::new("TEST-001", "Test error")
            .with_context("source", serde_json::json!("out.json"));
        let dict = info.to_dict();

        assert_eq!(dict.get("code"), Some(&serde_json::json!("TEST-001")));
        assert_eq!(dict["context"]["source"], "out.json");
    }

    #[test]
    fn test_failure_serialization() {
        let failure = ValidationFailure::validation(codes::SCHEMA_VIOLATION, "schema")
            .with_context("violations", serde_json::json!(2));
        let json = serde_json::to_value(&failure).unwrap();

        assert_eq!(json["kind"], "validation");
        assert_eq!(json["retryable"], true);
        assert!(json.get("stdout_tail").is_none());
        let back: ValidationFailure = serde_json::from_value(json).unwrap();
        assert_eq!(back, failure);
    }
}
