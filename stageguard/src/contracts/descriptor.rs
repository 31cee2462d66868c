//! Contract descriptors and the validator trait.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::errors::{codes, ValidationFailure};

/// Which validator checks a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractKind {
    /// A JSON document, optionally checked against a JSON schema.
    JsonSchema,
    /// A JSON, YAML or Markdown document checked against a template spec.
    Template,
    /// A test command that must exit successfully.
    TestSuite,
}

impl ContractKind {
    /// Returns the wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::JsonSchema => "json_schema",
            Self::Template => "template",
            Self::TestSuite => "test_suite",
        }
    }
}

impl fmt::Display for ContractKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a step's output must satisfy.
///
/// Relative paths resolve against the workspace passed to the validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractDescriptor {
    /// Validator kind.
    pub kind: ContractKind,
    /// Document to check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    /// JSON schema or template spec file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<PathBuf>,
    /// Shell command, run through `sh -c`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Program to run directly, with `args`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    /// Arguments for `program`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Timeout of the test command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<f64>,
}

impl ContractDescriptor {
    fn empty(kind: ContractKind) -> Self {
        Self {
            kind,
            source: None,
            schema: None,
            command: None,
            program: None,
            args: Vec::new(),
            timeout_seconds: None,
        }
    }

    /// A JSON document contract without a schema.
    #[must_use]
    pub fn json(source: impl Into<PathBuf>) -> Self {
        Self {
            source: Some(source.into()),
            ..Self::empty(ContractKind::JsonSchema)
        }
    }

    /// A template contract.
    #[must_use]
    pub fn template(source: impl Into<PathBuf>, spec: impl Into<PathBuf>) -> Self {
        Self {
            source: Some(source.into()),
            schema: Some(spec.into()),
            ..Self::empty(ContractKind::Template)
        }
    }

    /// A test suite run through the shell.
    #[must_use]
    pub fn test_command(command: impl Into<String>) -> Self {
        Self {
            command: Some(command.into()),
            ..Self::empty(ContractKind::TestSuite)
        }
    }

    /// A test suite run as `program args...`.
    #[must_use]
    pub fn test_program(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: Some(program.into()),
            args,
            ..Self::empty(ContractKind::TestSuite)
        }
    }

    /// Sets the schema or template spec file.
    #[must_use]
    pub fn with_schema(mut self, schema: impl Into<PathBuf>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Sets the test timeout.
    #[must_use]
    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    /// The test timeout, if one is set.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds
            .map(|secs| Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX))
    }

    /// Resolved source path; a configuration failure when unset.
    pub fn source_path(&self, workspace: &Path) -> Result<PathBuf, ValidationFailure> {
        self.source
            .as_deref()
            .map(|p| workspace.join(p))
            .ok_or_else(|| {
                ValidationFailure::configuration(
                    codes::CONFIGURATION,
                    format!("{} contract has no source", self.kind),
                )
            })
    }

    /// Resolved schema/spec path, if one is set.
    #[must_use]
    pub fn schema_path(&self, workspace: &Path) -> Option<PathBuf> {
        self.schema.as_deref().map(|p| workspace.join(p))
    }
}

/// Reads the document a contract checks. A missing or unreadable output is
/// the step's fault, so the failure is retryable.
pub(super) async fn read_output(path: &Path) -> Result<String, ValidationFailure> {
    tokio::fs::read_to_string(path).await.map_err(|e| {
        let message = match e.kind() {
            io::ErrorKind::NotFound => format!("output {} was not produced", path.display()),
            _ => format!("output {} could not be read: {e}", path.display()),
        };
        ValidationFailure::validation(codes::MISSING_OUTPUT, message)
            .with_context("source", serde_json::json!(path.display().to_string()))
    })
}

/// Reads and parses a JSON contract file (schema or template spec). Any
/// problem is a configuration failure.
pub(super) async fn read_contract_json<T: DeserializeOwned>(
    path: &Path,
    what: &str,
) -> Result<T, ValidationFailure> {
    let text = tokio::fs::read_to_string(path).await.map_err(|e| {
        ValidationFailure::configuration(
            codes::CONFIGURATION,
            format!("{what} {} could not be read: {e}", path.display()),
        )
    })?;
    serde_json::from_str(&text).map_err(|e| {
        ValidationFailure::configuration(
            codes::CONFIGURATION,
            format!("{what} {} is invalid: {e}", path.display()),
        )
    })
}

/// Checks a step's output against a contract.
#[async_trait]
pub trait ContractValidator: Send + Sync {
    /// The contract kind this validator handles.
    fn kind(&self) -> ContractKind;

    /// Validates the output found in `workspace`.
    async fn validate(
        &self,
        contract: &ContractDescriptor,
        workspace: &Path,
    ) -> Result<(), ValidationFailure>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_from_json() {
        let contract: ContractDescriptor = serde_json::from_str(
            r#"{"kind": "test_suite", "command": "cargo test", "timeout_seconds": 30}"#,
        )
        .unwrap();

        assert_eq!(contract.kind, ContractKind::TestSuite);
        assert_eq!(contract.command.as_deref(), Some("cargo test"));
        assert_eq!(contract.timeout(), Some(Duration::from_secs(30)));
        assert!(contract.args.is_empty());
    }

    #[test]
    fn test_paths_resolve_against_workspace() {
        let contract = ContractDescriptor::template("out/plan.md", "/specs/plan.json");
        let ws = Path::new("/work");

        assert_eq!(contract.source_path(ws).unwrap(), PathBuf::from("/work/out/plan.md"));
        assert_eq!(contract.schema_path(ws), Some(PathBuf::from("/specs/plan.json")));
    }

    #[test]
    fn test_missing_source_is_configuration_failure() {
        let contract = ContractDescriptor::test_command("true");
        let err = contract.source_path(Path::new("/w")).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(ContractKind::JsonSchema.to_string(), "json_schema");
        assert_eq!(
            serde_json::to_value(ContractKind::TestSuite).unwrap(),
            serde_json::json!("test_suite")
        );
    }
}
