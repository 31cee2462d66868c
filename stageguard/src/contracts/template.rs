//! Template validator for JSON, YAML and Markdown outputs.
//!
//! A template spec is a JSON file:
//!
//! ```json
//! {
//!   "type": "markdown",
//!   "required_fields": ["title", "owner.email"],
//!   "required_sections": ["Summary", "Risks"],
//!   "constraints": {
//!     "title": {"min_length": 5, "max_length": 80},
//!     "status": {"enum": ["draft", "final"]},
//!     "owner.email": {"pattern": "^[^@]+@[^@]+$"}
//!   }
//! }
//! ```
//!
//! Markdown fields come from an optional YAML front matter block.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

use super::descriptor::{read_contract_json, read_output, ContractDescriptor, ContractKind, ContractValidator};
use super::errors::{codes, ValidationFailure};

/// Document format a template applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateType {
    /// A JSON document.
    Json,
    /// A YAML document.
    Yaml,
    /// A Markdown document with optional YAML front matter.
    Markdown,
}

impl TemplateType {
    /// Parses a type name from a template spec.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            "markdown" | "md" => Some(Self::Markdown),
            _ => None,
        }
    }

    /// Infers the type from a file extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_name)
    }
}

/// Constraints on one field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FieldConstraint {
    /// Minimum length of a string (in characters) or array.
    #[serde(default)]
    pub min_length: Option<usize>,
    /// Maximum length of a string (in characters) or array.
    #[serde(default)]
    pub max_length: Option<usize>,
    /// Regex a string value must match.
    #[serde(default)]
    pub pattern: Option<String>,
    /// Allowed values.
    #[serde(default, rename = "enum")]
    pub allowed: Option<Vec<serde_json::Value>>,
}

/// A parsed template spec.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateSpec {
    /// Document type name; inferred from the source extension when absent.
    #[serde(default, rename = "type")]
    pub template_type: Option<String>,
    /// Dotted paths that must be present and non-null.
    #[serde(default)]
    pub required_fields: Vec<String>,
    /// Markdown headings that must be present.
    #[serde(default)]
    pub required_sections: Vec<String>,
    /// Per-field constraints, keyed by dotted path.
    #[serde(default)]
    pub constraints: BTreeMap<String, FieldConstraint>,
}

/// Checks structured documents against a template spec.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateValidator;

impl TemplateValidator {
    /// Creates the validator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ContractValidator for TemplateValidator {
    fn kind(&self) -> ContractKind {
        ContractKind::Template
    }

    async fn validate(
        &self,
        contract: &ContractDescriptor,
        workspace: &Path,
    ) -> Result<(), ValidationFailure> {
        let source = contract.source_path(workspace)?;
        let spec_path = contract.schema_path(workspace).ok_or_else(|| {
            ValidationFailure::configuration(codes::CONFIGURATION, "template contract has no spec file")
        })?;
        let spec: TemplateSpec = read_contract_json(&spec_path, "template spec").await?;

        let template_type = resolve_type(&spec, &source)?;
        let patterns = compile_patterns(&spec)?;
        let text = read_output(&source).await?;

        let violations = check_document(&spec, &patterns, template_type, &text)
            .map_err(|message| {
                ValidationFailure::validation(
                    codes::MALFORMED,
                    format!("{} could not be parsed: {message}", source.display()),
                )
            })?;

        if violations.is_empty() {
            debug!(source = %source.display(), ?template_type, "Output matches template");
            return Ok(());
        }
        Err(ValidationFailure::validation(
            codes::TEMPLATE_MISMATCH,
            format!(
                "{} does not match template {} ({} violation(s))",
                source.display(),
                spec_path.display(),
                violations.len()
            ),
        )
        .with_context("template", serde_json::json!(spec_path.display().to_string()))
        .with_details(violations))
    }
}

fn resolve_type(spec: &TemplateSpec, source: &Path) -> Result<TemplateType, ValidationFailure> {
    match spec.template_type.as_deref() {
        Some(name) => TemplateType::from_name(name).ok_or_else(|| {
            ValidationFailure::configuration(
                codes::CONFIGURATION,
                format!("unsupported template type '{name}'"),
            )
        }),
        None => TemplateType::from_path(source).ok_or_else(|| {
            ValidationFailure::configuration(
                codes::CONFIGURATION,
                format!(
                    "template type not set and cannot be inferred from {}",
                    source.display()
                ),
            )
        }),
    }
}

fn compile_patterns(spec: &TemplateSpec) -> Result<BTreeMap<&str, Regex>, ValidationFailure> {
    let mut patterns = BTreeMap::new();
    for (field, constraint) in &spec.constraints {
        if let Some(pattern) = &constraint.pattern {
            let regex = Regex::new(pattern).map_err(|e| {
                ValidationFailure::configuration(
                    codes::CONFIGURATION,
                    format!("invalid pattern for field '{field}': {e}"),
                )
            })?;
            patterns.insert(field.as_str(), regex);
        }
    }
    Ok(patterns)
}

/// Returns the violations, or an error message when the document does not parse.
fn check_document(
    spec: &TemplateSpec,
    patterns: &BTreeMap<&str, Regex>,
    template_type: TemplateType,
    text: &str,
) -> Result<Vec<String>, String> {
    let mut violations = Vec::new();

    let fields = match template_type {
        TemplateType::Json => serde_json::from_str(text).map_err(|e| e.to_string())?,
        TemplateType::Yaml => parse_yaml(text)?,
        TemplateType::Markdown => {
            let (front_matter, body) = split_front_matter(text);
            let headings = markdown_headings(body);
            for section in &spec.required_sections {
                let wanted = normalize_heading(section);
                if !headings.iter().any(|h| *h == wanted) {
                    violations.push(format!("missing required section '{section}'"));
                }
            }
            match front_matter {
                Some(yaml) => parse_yaml(yaml)?,
                None => serde_json::Value::Null,
            }
        }
    };

    if template_type != TemplateType::Markdown && !spec.required_sections.is_empty() {
        warn!(?template_type, "required_sections only apply to markdown templates; ignored");
    }

    for field in &spec.required_fields {
        if lookup(&fields, field).map_or(true, serde_json::Value::is_null) {
            violations.push(format!("missing required field '{field}'"));
        }
    }

    for (field, constraint) in &spec.constraints {
        if let Some(value) = lookup(&fields, field).filter(|v| !v.is_null()) {
            check_constraint(field, value, constraint, patterns.get(field.as_str()), &mut violations);
        }
    }

    Ok(violations)
}

fn check_constraint(
    field: &str,
    value: &serde_json::Value,
    constraint: &FieldConstraint,
    pattern: Option<&Regex>,
    violations: &mut Vec<String>,
) {
    if constraint.min_length.is_some() || constraint.max_length.is_some() {
        match value_length(value) {
            Some(len) => {
                if let Some(min) = constraint.min_length.filter(|min| len < *min) {
                    violations.push(format!("field '{field}' is shorter than {min} (length {len})"));
                }
                if let Some(max) = constraint.max_length.filter(|max| len > *max) {
                    violations.push(format!("field '{field}' is longer than {max} (length {len})"));
                }
            }
            None => violations.push(format!("field '{field}' has no length")),
        }
    }

    if let Some(regex) = pattern {
        match value.as_str() {
            Some(s) if regex.is_match(s) => {}
            Some(s) => violations.push(format!(
                "field '{field}' value '{s}' does not match pattern '{}'",
                regex.as_str()
            )),
            None => violations.push(format!("field '{field}' must be a string to match a pattern")),
        }
    }

    if let Some(allowed) = &constraint.allowed {
        if !allowed.contains(value) {
            violations.push(format!(
                "field '{field}' value {value} is not one of {}",
                serde_json::json!(allowed)
            ));
        }
    }
}

fn parse_yaml(text: &str) -> Result<serde_json::Value, String> {
    serde_yaml::from_str(text).map_err(|e| e.to_string())
}

fn value_length(value: &serde_json::Value) -> Option<usize> {
    match value {
        serde_json::Value::String(s) => Some(s.chars().count()),
        serde_json::Value::Array(items) => Some(items.len()),
        serde_json::Value::Object(map) => Some(map.len()),
        _ => None,
    }
}

/// Resolves a dotted path; numeric segments index arrays.
fn lookup<'a>(value: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    path.split('.').try_fold(value, |current, segment| match current {
        serde_json::Value::Object(map) => map.get(segment),
        serde_json::Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Splits `---` delimited YAML front matter from the body.
fn split_front_matter(text: &str) -> (Option<&str>, &str) {
    let Some(rest) = text
        .strip_prefix("---\n")
        .or_else(|| text.strip_prefix("---\r\n"))
    else {
        return (None, text);
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            return (Some(&rest[..offset]), &rest[offset + line.len()..]);
        }
        offset += line.len();
    }
    (None, text)
}

fn markdown_headings(body: &str) -> Vec<String> {
    let mut headings = Vec::new();
    let mut in_fence = false;
    for line in body.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        let level = trimmed.chars().take_while(|c| *c == '#').count();
        if (1..=6).contains(&level) {
            let rest = &trimmed[level..];
            if rest.is_empty() || rest.starts_with(' ') || rest.starts_with('\t') {
                headings.push(normalize_heading(rest.trim().trim_end_matches('#')));
            }
        }
    }
    headings
}

fn normalize_heading(heading: &str) -> String {
    heading
        .trim()
        .trim_start_matches('#')
        .trim()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    async fn run(spec: &str, file: &str, content: &str) -> Result<(), ValidationFailure> {
        let ws = tempfile::tempdir().unwrap();
        fs::write(ws.path().join("spec.json"), spec).unwrap();
        fs::write(ws.path().join(file), content).unwrap();
        TemplateValidator::new()
            .validate(&ContractDescriptor::template(file, "spec.json"), ws.path())
            .await
    }

    #[tokio::test]
    async fn test_json_required_fields_and_constraints() {
        let spec = r#"{
            "required_fields": ["title", "owner.email", "steps.0"],
            "constraints": {
                "title": {"min_length": 3, "max_length": 20},
                "status": {"enum": ["draft", "final"]},
                "owner.email": {"pattern": "^[^@]+@[^@]+$"}
            }
        }"#;

        let ok = r#"{"title": "Plan", "status": "draft",
                     "owner": {"email": "a@b"}, "steps": ["one"]}"#;
        run(spec, "plan.json", ok).await.unwrap();

        let bad = r#"{"title": "P", "status": "wip", "owner": {"email": "nope"}, "steps": []}"#;
        let err = run(spec, "plan.json", bad).await.unwrap_err();
        assert!(err.retryable);
        assert_eq!(err.code(), codes::TEMPLATE_MISMATCH);
        assert_eq!(err.details.len(), 4, "{:?}", err.details);
        assert!(err.details.contains(&"missing required field 'steps.0'".to_string()));
    }

    #[tokio::test]
    async fn test_yaml_type_inferred_from_extension() {
        let spec = r#"{"required_fields": ["name", "version"]}"#;
        run(spec, "chart.yaml", "name: web\nversion: 1.2.0\n").await.unwrap();

        let err = run(spec, "chart.yml", "name: web\n").await.unwrap_err();
        assert_eq!(err.details, vec!["missing required field 'version'".to_string()]);
    }

    #[tokio::test]
    async fn test_markdown_sections_and_front_matter() {
        let spec = r#"{
            "type": "markdown",
            "required_fields": ["author"],
            "required_sections": ["Summary", "Risks"]
        }"#;
        let doc = "---\nauthor: sam\n---\n# Summary\ntext\n\n```\n# Risks\n```\n";

        let err = run(spec, "report.md", doc).await.unwrap_err();
        assert_eq!(err.details, vec!["missing required section 'Risks'".to_string()]);

        let fixed = "---\nauthor: sam\n---\n# Summary\ntext\n## Risks ##\nnone\n";
        run(spec, "report.md", fixed).await.unwrap();
    }

    #[tokio::test]
    async fn test_unparseable_output_is_retryable() {
        let err = run(r#"{"type": "json"}"#, "out.txt", "{oops").await.unwrap_err();
        assert!(err.retryable);
        assert_eq!(err.code(), codes::MALFORMED);
    }

    #[tokio::test]
    async fn test_configuration_failures() {
        let unsupported = run(r#"{"type": "toml"}"#, "out.toml", "a = 1").await.unwrap_err();
        assert!(unsupported.is_configuration());

        let no_type = run("{}", "out.txt", "x").await.unwrap_err();
        assert!(no_type.is_configuration());

        let bad_regex = run(
            r#"{"constraints": {"a": {"pattern": "(unclosed"}}}"#,
            "out.json",
            r#"{"a": "x"}"#,
        )
        .await
        .unwrap_err();
        assert!(bad_regex.is_configuration());
        assert!(!bad_regex.retryable);
    }

    #[test]
    fn test_lookup_dotted_paths() {
        let value = serde_json::json!({"a": {"b": [10, {"c": true}]}});
        assert_eq!(lookup(&value, "a.b.0"), Some(&serde_json::json!(10)));
        assert_eq!(lookup(&value, "a.b.1.c"), Some(&serde_json::json!(true)));
        assert_eq!(lookup(&value, "a.x"), None);
    }

    #[test]
    fn test_split_front_matter() {
        let (fm, body) = split_front_matter("---\nk: v\n---\n# Body\n");
        assert_eq!(fm, Some("k: v\n"));
        assert_eq!(body, "# Body\n");

        let (fm, body) = split_front_matter("# No front matter\n");
        assert!(fm.is_none());
        assert_eq!(body, "# No front matter\n");
    }
}
