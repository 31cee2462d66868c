//! JSON output validator.

use async_trait::async_trait;
use jsonschema::JSONSchema;
use std::path::Path;
use tracing::debug;

use super::descriptor::{read_contract_json, read_output, ContractDescriptor, ContractKind, ContractValidator};
use super::errors::{codes, ValidationFailure};

/// Checks that the source parses as JSON and, when a schema is configured,
/// satisfies it.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSchemaValidator;

impl JsonSchemaValidator {
    /// Creates the validator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ContractValidator for JsonSchemaValidator {
    fn kind(&self) -> ContractKind {
        ContractKind::JsonSchema
    }

    async fn validate(
        &self,
        contract: &ContractDescriptor,
        workspace: &Path,
    ) -> Result<(), ValidationFailure> {
        let source = contract.source_path(workspace)?;
        let text = read_output(&source).await?;

        let document: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
            ValidationFailure::validation(
                codes::MALFORMED,
                format!("{} is not valid JSON: {e}", source.display()),
            )
            .with_context("line", serde_json::json!(e.line()))
            .with_context("column", serde_json::json!(e.column()))
        })?;

        let Some(schema_path) = contract.schema_path(workspace) else {
            debug!(source = %source.display(), "JSON output parsed, no schema configured");
            return Ok(());
        };

        let schema: serde_json::Value = read_contract_json(&schema_path, "JSON schema").await?;
        let compiled = JSONSchema::compile(&schema).map_err(|e| {
            ValidationFailure::configuration(
                codes::CONFIGURATION,
                format!("JSON schema {} does not compile: {e}", schema_path.display()),
            )
        })?;

        let violations = schema_violations(&compiled, &document);
        if violations.is_empty() {
            debug!(
                source = %source.display(),
                schema = %schema_path.display(),
                "JSON output satisfies schema"
            );
            return Ok(());
        }

        Err(ValidationFailure::validation(
            codes::SCHEMA_VIOLATION,
            format!(
                "{} violates schema {} ({} violation(s))",
                source.display(),
                schema_path.display(),
                violations.len()
            ),
        )
        .with_context("schema", serde_json::json!(schema_path.display().to_string()))
        .with_details(violations))
    }
}

fn schema_violations(schema: &JSONSchema, document: &serde_json::Value) -> Vec<String> {
    match schema.validate(document) {
        Ok(()) => Vec::new(),
        Err(errors) => errors
            .map(|e| {
                let at = e.instance_path.to_string();
                let at = if at.is_empty() { "/".to_string() } else { at };
                format!("at {at}: {e}")
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const SCHEMA: &str = r#"{
        "type": "object",
        "required": ["name", "score"],
        "properties": {
            "name": {"type": "string"},
            "score": {"type": "number", "minimum": 0}
        }
    }"#;

    fn workspace() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("schema.json"), SCHEMA).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_valid_document_passes() {
        let ws = workspace();
        fs::write(ws.path().join("out.json"), r#"{"name": "a", "score": 3}"#).unwrap();

        let contract = ContractDescriptor::json("out.json").with_schema("schema.json");
        JsonSchemaValidator::new()
            .validate(&contract, ws.path())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_malformed_json_is_retryable() {
        let ws = workspace();
        fs::write(ws.path().join("out.json"), "{\"name\": ").unwrap();

        let err = JsonSchemaValidator::new()
            .validate(&ContractDescriptor::json("out.json"), ws.path())
            .await
            .unwrap_err();
        assert!(err.retryable);
        assert_eq!(err.code(), codes::MALFORMED);
    }

    #[tokio::test]
    async fn test_violations_listed_with_paths() {
        let ws = workspace();
        fs::write(ws.path().join("out.json"), r#"{"score": -1}"#).unwrap();

        let contract = ContractDescriptor::json("out.json").with_schema("schema.json");
        let err = JsonSchemaValidator::new()
            .validate(&contract, ws.path())
            .await
            .unwrap_err();

        assert!(err.retryable);
        assert_eq!(err.code(), codes::SCHEMA_VIOLATION);
        assert_eq!(err.details.len(), 2);
        assert!(err.details.iter().any(|d| d.starts_with("at /score:")));
        assert!(err.details.iter().any(|d| d.contains("name")));
    }

    #[tokio::test]
    async fn test_missing_output_is_retryable() {
        let ws = workspace();
        let err = JsonSchemaValidator::new()
            .validate(&ContractDescriptor::json("absent.json"), ws.path())
            .await
            .unwrap_err();
        assert!(err.retryable);
        assert_eq!(err.code(), codes::MISSING_OUTPUT);
    }

    #[tokio::test]
    async fn test_broken_schema_is_configuration_failure() {
        let ws = workspace();
        fs::write(ws.path().join("out.json"), "{}").unwrap();
        fs::write(ws.path().join("bad.json"), r#"{"type": 12}"#).unwrap();

        let contract = ContractDescriptor::json("out.json").with_schema("bad.json");
        let err = JsonSchemaValidator::new()
            .validate(&contract, ws.path())
            .await
            .unwrap_err();
        assert!(!err.retryable);
        assert!(err.is_configuration());

        let missing = ContractDescriptor::json("out.json").with_schema("nope.json");
        let err = JsonSchemaValidator::new()
            .validate(&missing, ws.path())
            .await
            .unwrap_err();
        assert!(err.is_configuration());
    }
}
