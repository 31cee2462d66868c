//! Test-suite validator.
//!
//! Runs a command in the workspace; the contract holds when it exits with
//! status zero within the timeout. The child is killed when the timeout fires.

use async_trait::async_trait;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::descriptor::{ContractDescriptor, ContractKind, ContractValidator};
use super::errors::{codes, ValidationFailure};
use crate::config::ValidatorConfig;
use crate::observability::SpanTimer;

/// Runs a contract's test command.
#[derive(Debug, Clone, Default)]
pub struct TestSuiteValidator {
    config: ValidatorConfig,
}

impl TestSuiteValidator {
    /// Creates a validator with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a validator with the given settings.
    #[must_use]
    pub fn with_config(config: ValidatorConfig) -> Self {
        Self { config }
    }

    fn build_command(
        contract: &ContractDescriptor,
        workspace: &Path,
    ) -> Result<(Command, String), ValidationFailure> {
        let shell = contract.command.as_deref().filter(|c| !c.trim().is_empty());
        let program = contract.program.as_deref().filter(|p| !p.trim().is_empty());
        let (mut command, shown) = match (shell, program) {
            (Some(_), Some(_)) => {
                return Err(ValidationFailure::configuration(
                    codes::CONFIGURATION,
                    "test contract sets both command and program",
                ));
            }
            (Some(shell), None) => {
                let mut command = Command::new("sh");
                command.arg("-c").arg(shell);
                (command, shell.to_string())
            }
            (None, Some(program)) => {
                let mut command = Command::new(program);
                command.args(&contract.args);
                let shown = std::iter::once(program)
                    .chain(contract.args.iter().map(String::as_str))
                    .collect::<Vec<_>>()
                    .join(" ");
                (command, shown)
            }
            (None, None) => {
                return Err(ValidationFailure::configuration(
                    codes::CONFIGURATION,
                    "test contract has no command configured",
                ));
            }
        };

        command
            .current_dir(workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok((command, shown))
    }

    fn failure_from_output(&self, shown: &str, output: &Output) -> ValidationFailure {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let status = output
            .status
            .code()
            .map_or_else(|| "terminated by signal".to_string(), |c| format!("exit code {c}"));

        ValidationFailure::validation(
            codes::TESTS_FAILED,
            format!("test command `{shown}` failed ({status})"),
        )
        .with_exit_code(output.status.code())
        .with_output(
            tail_lines(&stdout, self.config.tail_lines),
            tail_lines(&stderr, self.config.tail_lines),
        )
        .with_context("command", serde_json::json!(shown))
    }
}

#[async_trait]
impl ContractValidator for TestSuiteValidator {
    fn kind(&self) -> ContractKind {
        ContractKind::TestSuite
    }

    async fn validate(
        &self,
        contract: &ContractDescriptor,
        workspace: &Path,
    ) -> Result<(), ValidationFailure> {
        let (mut command, shown) = Self::build_command(contract, workspace)?;
        let limit: Duration = contract
            .timeout()
            .unwrap_or_else(|| self.config.default_timeout());

        let child = command.spawn().map_err(|e| {
            ValidationFailure::configuration(
                codes::SPAWN,
                format!("test command `{shown}` could not be started: {e}"),
            )
            .with_context("workspace", serde_json::json!(workspace.display().to_string()))
        })?;

        let timer = SpanTimer::start("test_suite");
        // On timeout the future, and with it the child, is dropped and killed.
        let output = match timeout(limit, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ValidationFailure::configuration(
                    codes::SPAWN,
                    format!("waiting for test command `{shown}` failed: {e}"),
                ));
            }
            Err(_) => {
                warn!(command = %shown, timeout_secs = limit.as_secs_f64(), "Test command timed out");
                return Err(ValidationFailure::validation(
                    codes::TIMEOUT,
                    format!(
                        "test command `{shown}` timed out after {:.1}s",
                        limit.as_secs_f64()
                    ),
                )
                .with_context("timeout_seconds", serde_json::json!(limit.as_secs_f64())));
            }
        };
        let elapsed_ms = timer.finish();

        if output.status.success() {
            debug!(command = %shown, elapsed_ms, "Test command passed");
            Ok(())
        } else {
            Err(self.failure_from_output(&shown, &output))
        }
    }
}

/// The last `n` lines of `text`.
fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn validator() -> TestSuiteValidator {
        TestSuiteValidator::with_config(ValidatorConfig::new().with_default_timeout(30.0))
    }

    #[tokio::test]
    async fn test_passing_command() {
        let ws = tempfile::tempdir().unwrap();
        std::fs::write(ws.path().join("marker"), "").unwrap();

        // Runs inside the workspace.
        let contract = ContractDescriptor::test_command("test -f marker && echo ok");
        validator().validate(&contract, ws.path()).await.unwrap();
    }

    #[tokio::test]
    async fn test_failing_command_keeps_output_tail() {
        let ws = tempfile::tempdir().unwrap();
        let contract = ContractDescriptor::test_command(
            "for i in $(seq 1 15); do echo line$i; done; echo boom >&2; exit 3",
        );

        let err = validator().validate(&contract, ws.path()).await.unwrap_err();
        assert!(err.retryable);
        assert_eq!(err.code(), codes::TESTS_FAILED);
        assert_eq!(err.exit_code, Some(3));

        let stdout = err.stdout_tail.unwrap();
        assert_eq!(stdout.lines().count(), 10);
        assert!(stdout.starts_with("line6"));
        assert!(stdout.ends_with("line15"));
        assert_eq!(err.stderr_tail.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_program_with_args() {
        let ws = tempfile::tempdir().unwrap();
        let contract =
            ContractDescriptor::test_program("sh", vec!["-c".to_string(), "exit 0".to_string()]);
        validator().validate(&contract, ws.path()).await.unwrap();
    }

    #[tokio::test]
    async fn test_timeout_is_retryable() {
        let ws = tempfile::tempdir().unwrap();
        let contract = ContractDescriptor::test_command("sleep 5").with_timeout(0.2);

        let started = std::time::Instant::now();
        let err = validator().validate(&contract, ws.path()).await.unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(4));
        assert!(err.retryable);
        assert_eq!(err.code(), codes::TIMEOUT);
    }

    #[tokio::test]
    async fn test_missing_command_is_configuration_failure() {
        let ws = tempfile::tempdir().unwrap();
        let mut contract = ContractDescriptor::test_command("true");
        contract.command = None;

        let err = validator().validate(&contract, ws.path()).await.unwrap_err();
        assert!(err.is_configuration());
        assert!(!err.retryable);
    }

    #[tokio::test]
    async fn test_blank_command_is_configuration_failure() {
        let ws = tempfile::tempdir().unwrap();
        for blank in ["", "   "] {
            let err = validator()
                .validate(&ContractDescriptor::test_command(blank), ws.path())
                .await
                .unwrap_err();
            assert!(err.is_configuration(), "{blank:?} should be rejected");
            assert!(!err.retryable);
            assert_eq!(err.code(), codes::CONFIGURATION);
        }

        let err = validator()
            .validate(&ContractDescriptor::test_program(" ", vec![]), ws.path())
            .await
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_unstartable_program_is_configuration_failure() {
        let ws = tempfile::tempdir().unwrap();
        let contract = ContractDescriptor::test_program("/nonexistent/stageguard-test-bin", vec![]);

        let err = validator().validate(&contract, ws.path()).await.unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(err.code(), codes::SPAWN);
    }

    #[test]
    fn test_tail_lines() {
        assert_eq!(tail_lines("a\nb\nc\n", 2), "b\nc");
        assert_eq!(tail_lines("a", 10), "a");
        assert_eq!(tail_lines("", 10), "");
    }
}
