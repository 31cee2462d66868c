//! Operator-facing rollback plans.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use super::types::{Checkpoint, Reversal, RollbackLog, RollbackOperation};
use crate::utils::{format_iso8601, Timestamp};

/// Marker printed next to every operation an operator has to undo by hand.
pub const MANUAL_INTERVENTION_NOTICE: &str = "MANUAL INTERVENTION REQUIRED";

/// What a rollback would do with one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlannedAction {
    /// Delete the created path.
    Delete,
    /// Copy the backup over the target.
    Restore {
        /// Backup to restore from.
        backup: PathBuf,
    },
    /// The file was deleted without a backup; nothing can be restored.
    Unrecoverable,
    /// Left to an operator.
    Manual {
        /// Steps to follow, in order.
        steps: Vec<String>,
    },
    /// The logged record cannot be reverted as stored.
    Invalid {
        /// Why.
        reason: String,
    },
}

impl PlannedAction {
    fn for_operation(op: &RollbackOperation) -> Self {
        match op.reversal() {
            Ok(Reversal::DeletePath(_)) => Self::Delete,
            Ok(Reversal::RestoreBackup { backup, .. }) => Self::Restore {
                backup: backup.to_path_buf(),
            },
            Ok(Reversal::Unrecoverable(_)) => Self::Unrecoverable,
            Ok(Reversal::Manual(steps)) => Self::Manual {
                steps: steps.to_vec(),
            },
            Err(reason) => Self::Invalid { reason },
        }
    }
}

/// One operation of a plan together with its planned action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanEntry {
    /// The logged operation.
    pub operation: RollbackOperation,
    /// What a rollback would do with it.
    pub action: PlannedAction,
}

/// The operations a rollback would touch, in chronological order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollbackPlan {
    /// Pipeline the plan is for.
    pub pipeline_id: String,
    /// Step of the bounding checkpoint, if any.
    pub checkpoint_step: Option<String>,
    /// Timestamp of the bounding checkpoint, if any.
    pub checkpoint_timestamp: Option<Timestamp>,
    /// Planned entries, oldest first.
    pub entries: Vec<PlanEntry>,
}

impl RollbackPlan {
    /// Builds the plan for `log`, bounded by `checkpoint` when given.
    #[must_use]
    pub fn build(log: &RollbackLog, checkpoint: Option<&Checkpoint>) -> Self {
        let entries = log
            .undo_order(checkpoint)
            .into_iter()
            .rev()
            .map(|op| PlanEntry {
                operation: op.clone(),
                action: PlannedAction::for_operation(op),
            })
            .collect();

        Self {
            pipeline_id: log.pipeline_id.clone(),
            checkpoint_step: checkpoint.map(|cp| cp.step_id.clone()),
            checkpoint_timestamp: checkpoint.map(|cp| cp.timestamp),
            entries,
        }
    }

    /// True when there is nothing to roll back.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries that need an operator.
    pub fn manual_entries(&self) -> impl Iterator<Item = &PlanEntry> {
        self.entries
            .iter()
            .filter(|entry| matches!(entry.action, PlannedAction::Manual { .. }))
    }

    /// True when a rollback would leave work for an operator.
    #[must_use]
    pub fn requires_manual_intervention(&self) -> bool {
        self.manual_entries().next().is_some()
    }

    fn count(&self, pred: impl Fn(&PlannedAction) -> bool) -> usize {
        self.entries.iter().filter(|e| pred(&e.action)).count()
    }
}

impl fmt::Display for RollbackPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Rollback plan for pipeline: {}", self.pipeline_id)?;
        match (&self.checkpoint_step, &self.checkpoint_timestamp) {
            (Some(step), Some(ts)) => writeln!(
                f,
                "Scope: operations after checkpoint '{step}' ({})",
                format_iso8601(ts)
            )?,
            _ => writeln!(f, "Scope: all logged operations")?,
        }

        if self.entries.is_empty() {
            return writeln!(f, "No operations recorded.");
        }

        writeln!(f)?;
        for (index, entry) in self.entries.iter().enumerate() {
            let op = &entry.operation;
            writeln!(
                f,
                "{}. [{}] {} (at {})",
                index + 1,
                op.op_type,
                op.target,
                format_iso8601(&op.timestamp)
            )?;
            match &entry.action {
                PlannedAction::Delete => writeln!(f, "   Revert: delete {}", op.target)?,
                PlannedAction::Restore { backup } => {
                    writeln!(f, "   Revert: restore from backup {}", backup.display())?;
                }
                PlannedAction::Unrecoverable => {
                    writeln!(f, "   Revert: none, no backup was taken (unrecoverable)")?;
                }
                PlannedAction::Manual { steps } => {
                    writeln!(f, "   {MANUAL_INTERVENTION_NOTICE}")?;
                    if steps.is_empty() {
                        writeln!(f, "   (no revert steps were recorded)")?;
                    }
                    for (n, step) in steps.iter().enumerate() {
                        writeln!(f, "     {}. {step}", n + 1)?;
                    }
                }
                PlannedAction::Invalid { reason } => {
                    writeln!(f, "   Revert: will fail, {reason}")?;
                }
            }
        }

        writeln!(f)?;
        write!(
            f,
            "Summary: {} operations, {} automatic, {} manual, {} unrecoverable, {} invalid",
            self.entries.len(),
            self.count(|a| matches!(a, PlannedAction::Delete | PlannedAction::Restore { .. })),
            self.count(|a| matches!(a, PlannedAction::Manual { .. })),
            self.count(|a| matches!(a, PlannedAction::Unrecoverable)),
            self.count(|a| matches!(a, PlannedAction::Invalid { .. })),
        )?;
        writeln!(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::now_utc;
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn sample_log() -> RollbackLog {
        let base = now_utc();
        let mut log = RollbackLog::new("p");
        log.push(RollbackOperation::file_created("/w/new.rs").with_timestamp(base));
        log.push(
            RollbackOperation::file_modified("/w/lib.rs", "/b/000001-lib")
                .with_timestamp(base + Duration::seconds(1)),
        );
        log.push(
            RollbackOperation::git_commit("abc123", "/w").with_timestamp(base + Duration::seconds(2)),
        );
        log
    }

    #[test]
    fn test_plan_is_chronological() {
        let plan = RollbackPlan::build(&sample_log(), None);
        let targets: Vec<&str> = plan
            .entries
            .iter()
            .map(|e| e.operation.target.as_str())
            .collect();
        assert_eq!(targets, vec!["/w/new.rs", "/w/lib.rs", "abc123"]);
        assert_eq!(plan.entries[0].action, PlannedAction::Delete);
        assert!(plan.requires_manual_intervention());
    }

    #[test]
    fn test_plan_text_flags_manual_steps() {
        let text = RollbackPlan::build(&sample_log(), None).to_string();

        assert!(text.starts_with("Rollback plan for pipeline: p\n"));
        assert!(text.contains("[file_created] /w/new.rs"));
        assert!(text.contains("restore from backup /b/000001-lib"));
        assert!(text.contains(MANUAL_INTERVENTION_NOTICE));
        assert!(text.contains("3. git revert --no-edit abc123"));
        assert!(text.contains("Summary: 3 operations, 2 automatic, 1 manual"));
    }

    #[test]
    fn test_plan_bounded_by_checkpoint() {
        let log = sample_log();
        let mut checkpoint = Checkpoint::new("p", "s", "/w", HashMap::new());
        checkpoint.timestamp = log.operations[0].timestamp;

        let plan = RollbackPlan::build(&log, Some(&checkpoint));
        assert_eq!(plan.entries.len(), 2);
        assert_eq!(plan.checkpoint_step.as_deref(), Some("s"));
        assert!(plan.to_string().contains("after checkpoint 's'"));
    }

    #[test]
    fn test_empty_plan() {
        let plan = RollbackPlan::build(&RollbackLog::new("p"), None);
        assert!(plan.is_empty());
        assert!(plan.to_string().contains("No operations recorded."));
    }

    #[test]
    fn test_invalid_record_is_reported() {
        let mut log = RollbackLog::new("p");
        let mut op = RollbackOperation::file_modified("/w/a", "/b/a");
        op.backup = None;
        log.operations.push(op);

        let plan = RollbackPlan::build(&log, None);
        assert!(matches!(plan.entries[0].action, PlannedAction::Invalid { .. }));
        assert!(plan.to_string().contains("will fail"));
    }
}
