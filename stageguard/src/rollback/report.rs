//! Rollback outcome.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::types::RollbackOperation;

/// One operation whose reversal failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevertFailure {
    /// The operation that could not be undone.
    pub operation: RollbackOperation,
    /// What went wrong.
    pub reason: String,
}

impl fmt::Display for RevertFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} (seq {}): {}",
            self.operation.op_type, self.operation.target, self.operation.sequence, self.reason
        )
    }
}

/// Everything a rollback did, skipped or failed to do.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RollbackReport {
    /// Pipeline that was rolled back.
    pub pipeline_id: String,
    /// Step of the target checkpoint; `None` for a full rollback.
    pub checkpoint_step: Option<String>,
    /// Operations undone, in the order they were undone.
    pub reverted: Vec<RollbackOperation>,
    /// Non-fatal notes, e.g. deleted files without a backup.
    pub warnings: Vec<String>,
    /// Operations left for an operator.
    pub manual: Vec<RollbackOperation>,
    /// Reversals that failed.
    pub failures: Vec<RevertFailure>,
    /// Wall time of the rollback.
    pub duration_ms: f64,
}

impl RollbackReport {
    /// Creates an empty report.
    #[must_use]
    pub fn new(pipeline_id: impl Into<String>, checkpoint_step: Option<String>) -> Self {
        Self {
            pipeline_id: pipeline_id.into(),
            checkpoint_step,
            ..Self::default()
        }
    }

    /// True when nothing failed and nothing needs manual follow-up.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.manual.is_empty()
    }

    /// One-paragraph description, used as the aggregate error message.
    #[must_use]
    pub fn summary(&self) -> String {
        let scope = self
            .checkpoint_step
            .as_deref()
            .map_or_else(String::new, |step| format!(" to checkpoint '{step}'"));
        let mut summary = format!(
            "Rollback of pipeline '{}'{scope}: {} reverted, {} failed, {} need manual intervention, {} warnings",
            self.pipeline_id,
            self.reverted.len(),
            self.failures.len(),
            self.manual.len(),
            self.warnings.len()
        );

        for failure in &self.failures {
            summary.push_str("\n  failed: ");
            summary.push_str(&failure.to_string());
        }
        for op in &self.manual {
            summary.push_str(&format!("\n  manual: {} {}", op.op_type, op.target));
        }
        summary
    }
}
