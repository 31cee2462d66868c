//! The rollback manager.
//!
//! Facade over the checkpoint, log and backup stores of one base directory.
//! All persisted state of a pipeline lives in `<base>/<pipeline_id>/`.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use super::backup::BackupStore;
use super::checkpoints::CheckpointStore;
use super::layout::PipelineLayout;
use super::lock::PipelineLock;
use super::log::RollbackLogStore;
use super::plan::RollbackPlan;
use super::report::{RevertFailure, RollbackReport};
use super::types::{Checkpoint, Reversal, RollbackLog, RollbackOperation};
use crate::config::StoreConfig;
use crate::errors::{RollbackError, StoreError};
use crate::events::{event_types, Event, EventSink, NoOpEventSink};
use crate::observability::SpanTimer;
use crate::utils::{copy_file_atomic, format_iso8601, remove_path_if_exists};

/// Records pipeline mutations and undoes them on request.
///
/// Construct one per base directory. Instances sharing a base directory
/// coordinate through per-pipeline file locks.
pub struct RollbackManager {
    config: StoreConfig,
    checkpoints: CheckpointStore,
    log: RollbackLogStore,
    backups: BackupStore,
    event_sink: Arc<dyn EventSink>,
}

impl fmt::Debug for RollbackManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RollbackManager")
            .field("base_dir", &self.config.base_dir)
            .field("fsync", &self.config.fsync)
            .finish_non_exhaustive()
    }
}

impl RollbackManager {
    /// Creates a manager rooted at `base_dir` with default settings.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self::with_config(StoreConfig::new(base_dir))
    }

    /// Creates a manager from a store configuration.
    #[must_use]
    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            checkpoints: CheckpointStore::new(&config.base_dir, config.fsync),
            log: RollbackLogStore::new(&config.base_dir, config.fsync),
            backups: BackupStore::new(&config.base_dir, config.fsync),
            config,
            event_sink: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Base directory holding all pipelines.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.config.base_dir
    }

    fn emit(&self, event_type: &'static str, pipeline_id: &str, data: serde_json::Value) {
        self.event_sink.emit(&Event::new(event_type, pipeline_id, data));
    }

    /// Store configuration in use.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // --- checkpoints ---

    /// Persists a checkpoint for `(pipeline_id, step_id)`, replacing any earlier one.
    pub fn create_checkpoint(
        &self,
        pipeline_id: &str,
        step_id: &str,
        workspace_path: impl AsRef<Path>,
        artifacts: HashMap<String, PathBuf>,
    ) -> Result<Checkpoint, StoreError> {
        let checkpoint =
            self.checkpoints
                .create(pipeline_id, step_id, workspace_path.as_ref(), artifacts)?;

        info!(pipeline_id, step_id, "Checkpoint created");
        self.emit(
            event_types::CHECKPOINT_CREATED,
            pipeline_id,
            serde_json::json!({
                "step_id": step_id,
                "timestamp": format_iso8601(&checkpoint.timestamp),
                "artifacts": checkpoint.artifacts.len(),
            }),
        );
        Ok(checkpoint)
    }

    /// Loads a checkpoint.
    pub fn load_checkpoint(&self, pipeline_id: &str, step_id: &str) -> Result<Checkpoint, StoreError> {
        self.checkpoints.load(pipeline_id, step_id)
    }

    /// Lists the checkpoints of a pipeline, oldest first.
    pub fn list_checkpoints(&self, pipeline_id: &str) -> Result<Vec<Checkpoint>, StoreError> {
        self.checkpoints.list(pipeline_id)
    }

    /// Most recent checkpoint of a pipeline.
    pub fn latest_checkpoint(&self, pipeline_id: &str) -> Result<Option<Checkpoint>, StoreError> {
        self.checkpoints.latest(pipeline_id)
    }

    // --- rollback log ---

    /// Creates the pipeline's log, or returns the existing one untouched.
    pub fn init_rollback_log(&self, pipeline_id: &str) -> Result<RollbackLog, StoreError> {
        let log = self.log.init(pipeline_id)?;
        self.emit(
            event_types::LOG_INITIALIZED,
            pipeline_id,
            serde_json::json!({
                "operations": log.len(),
            }),
        );
        Ok(log)
    }

    /// Durably appends an operation to the pipeline's log.
    ///
    /// Returns the stored operation carrying its sequence number.
    pub fn log_operation(
        &self,
        pipeline_id: &str,
        operation: RollbackOperation,
    ) -> Result<RollbackOperation, StoreError> {
        let stored = self.log.append(pipeline_id, operation)?;
        self.emit(
            event_types::OPERATION_LOGGED,
            pipeline_id,
            serde_json::json!({
                "sequence": stored.sequence,
                "type": stored.op_type.as_str(),
                "target": stored.target,
                "can_revert": stored.can_revert,
            }),
        );
        Ok(stored)
    }

    /// Loads the pipeline's log.
    pub fn load_rollback_log(&self, pipeline_id: &str) -> Result<RollbackLog, StoreError> {
        self.log.load(pipeline_id)
    }

    // --- backups ---

    /// Copies a file into the pipeline's backup area before it is mutated.
    pub fn create_backup(
        &self,
        pipeline_id: &str,
        file_path: impl AsRef<Path>,
    ) -> Result<PathBuf, StoreError> {
        let file_path = file_path.as_ref();
        let backup = self.backups.create(pipeline_id, file_path)?;
        self.emit(
            event_types::BACKUP_CREATED,
            pipeline_id,
            serde_json::json!({
                "source": file_path.display().to_string(),
                "backup": backup.display().to_string(),
            }),
        );
        Ok(backup)
    }

    // --- plans ---

    /// Structured plan of what a rollback would do.
    pub fn plan(
        &self,
        pipeline_id: &str,
        checkpoint: Option<&Checkpoint>,
    ) -> Result<RollbackPlan, StoreError> {
        let log = self.log.load(pipeline_id)?;
        Ok(RollbackPlan::build(&log, checkpoint))
    }

    /// Human-readable plan covering every logged operation.
    pub fn get_rollback_plan(&self, pipeline_id: &str) -> Result<String, StoreError> {
        Ok(self.plan(pipeline_id, None)?.to_string())
    }

    /// Human-readable plan limited to what a rollback to `checkpoint` would touch.
    pub fn plan_to_checkpoint(
        &self,
        pipeline_id: &str,
        checkpoint: &Checkpoint,
    ) -> Result<String, StoreError> {
        Ok(self.plan(pipeline_id, Some(checkpoint))?.to_string())
    }

    // --- rollback ---

    /// Undoes logged operations, most recent first.
    ///
    /// With a checkpoint only operations strictly after it are undone;
    /// without one the whole log is. Every eligible operation is attempted.
    /// Returns `Ok` only when every operation was reverted mechanically;
    /// failures and manual-only operations produce
    /// [`RollbackError::Incomplete`] carrying the full report.
    ///
    /// The log is not modified. Reversals are idempotent, so running the
    /// same rollback again converges to the same workspace.
    #[instrument(skip_all, fields(pipeline_id = %pipeline_id, checkpoint = checkpoint.map(|cp| cp.step_id.as_str())))]
    pub fn rollback(
        &self,
        pipeline_id: &str,
        checkpoint: Option<&Checkpoint>,
    ) -> Result<RollbackReport, RollbackError> {
        if let Some(cp) = checkpoint {
            check_target(pipeline_id, cp)?;
        }

        let layout = PipelineLayout::new(&self.config.base_dir, pipeline_id)?;
        let _lock = PipelineLock::acquire(&layout)?;
        let log = self.log.load_from(&layout)?;

        let timer = SpanTimer::start("rollback");
        let mut report = RollbackReport::new(pipeline_id, checkpoint.map(|cp| cp.step_id.clone()));
        let pending = log.undo_order(checkpoint);

        info!(operations = pending.len(), "Rollback started");
        self.emit(
            event_types::ROLLBACK_STARTED,
            pipeline_id,
            serde_json::json!({
                "checkpoint": report.checkpoint_step,
                "operations": pending.len(),
            }),
        );

        for op in pending {
            match self.revert(op) {
                Ok(Outcome::Reverted) => report.reverted.push(op.clone()),
                Ok(Outcome::Warning(message)) => {
                    warn!(sequence = op.sequence, target = %op.target, "{message}");
                    report.warnings.push(message);
                }
                Ok(Outcome::Manual) => {
                    warn!(
                        sequence = op.sequence,
                        op_type = %op.op_type,
                        target = %op.target,
                        "Operation needs manual intervention"
                    );
                    report.manual.push(op.clone());
                }
                Err(reason) => {
                    error!(
                        sequence = op.sequence,
                        op_type = %op.op_type,
                        target = %op.target,
                        reason = %reason,
                        "Failed to revert operation"
                    );
                    self.emit(
                        event_types::OPERATION_FAILED,
                        pipeline_id,
                        serde_json::json!({
                            "sequence": op.sequence,
                            "type": op.op_type.as_str(),
                            "target": op.target,
                            "reason": reason,
                        }),
                    );
                    report.failures.push(RevertFailure {
                        operation: op.clone(),
                        reason,
                    });
                }
            }
        }

        report.duration_ms = timer.finish();
        info!(
            reverted = report.reverted.len(),
            failed = report.failures.len(),
            manual = report.manual.len(),
            warnings = report.warnings.len(),
            duration_ms = report.duration_ms,
            "Rollback finished"
        );
        self.emit(
            event_types::ROLLBACK_COMPLETED,
            pipeline_id,
            serde_json::json!({
                "checkpoint": report.checkpoint_step,
                "reverted": report.reverted.len(),
                "failed": report.failures.len(),
                "manual": report.manual.len(),
                "warnings": report.warnings.len(),
                "clean": report.is_clean(),
                "duration_ms": report.duration_ms,
            }),
        );

        if report.is_clean() {
            Ok(report)
        } else {
            Err(RollbackError::Incomplete(Box::new(report)))
        }
    }

    fn revert(&self, op: &RollbackOperation) -> Result<Outcome, String> {
        match op.reversal()? {
            Reversal::DeletePath(path) => {
                let removed = remove_path_if_exists(path)
                    .map_err(|e| format!("failed to delete {}: {e}", path.display()))?;
                debug!(path = %path.display(), removed, "Created path removed");
                Ok(Outcome::Reverted)
            }
            Reversal::RestoreBackup { backup, target } => {
                copy_file_atomic(backup, target, self.config.fsync).map_err(|e| match e {
                    StoreError::NotFound { .. } => {
                        format!("backup {} is missing", backup.display())
                    }
                    other => other.to_string(),
                })?;
                debug!(
                    target = %target.display(),
                    backup = %backup.display(),
                    "File restored from backup"
                );
                Ok(Outcome::Reverted)
            }
            Reversal::Unrecoverable(path) => Ok(Outcome::Warning(format!(
                "{} was deleted without a backup and cannot be restored",
                path.display()
            ))),
            Reversal::Manual(_) => Ok(Outcome::Manual),
        }
    }

    // --- cleanup ---

    /// Removes every checkpoint, the log and all backups of a pipeline.
    ///
    /// Cleaning an unknown or already cleaned pipeline succeeds.
    #[instrument(skip(self))]
    pub fn cleanup_checkpoints(&self, pipeline_id: &str) -> Result<(), StoreError> {
        let layout = PipelineLayout::new(&self.config.base_dir, pipeline_id)?;
        let root = layout.root();
        if !root.exists() {
            debug!("Nothing to clean up");
            return Ok(());
        }

        let lock = PipelineLock::acquire(&layout)?;
        match fs::remove_dir_all(root) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(StoreError::io("removing", root, e)),
        }
        drop(lock);

        info!("Pipeline state removed");
        self.emit(event_types::CHECKPOINTS_CLEANED, pipeline_id, serde_json::json!({}));
        Ok(())
    }
}

enum Outcome {
    Reverted,
    Warning(String),
    Manual,
}

fn check_target(pipeline_id: &str, checkpoint: &Checkpoint) -> Result<(), RollbackError> {
    if checkpoint.pipeline_id != pipeline_id {
        return Err(RollbackError::InvalidTarget {
            reason: format!(
                "checkpoint '{}' belongs to pipeline '{}', not '{pipeline_id}'",
                checkpoint.step_id, checkpoint.pipeline_id
            ),
        });
    }
    if !checkpoint.can_rollback {
        return Err(RollbackError::InvalidTarget {
            reason: format!(
                "checkpoint '{}' was never persisted and cannot be rolled back to",
                checkpoint.step_id
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;

    #[test]
    fn test_rejects_foreign_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let manager = RollbackManager::new(dir.path());
        let checkpoint = manager
            .create_checkpoint("other", "s", "/w", HashMap::new())
            .unwrap();

        let err = manager.rollback("p", Some(&checkpoint)).unwrap_err();
        assert!(matches!(err, RollbackError::InvalidTarget { .. }));
    }

    #[test]
    fn test_rejects_unpersisted_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let manager = RollbackManager::new(dir.path());
        manager.init_rollback_log("p").unwrap();
        let checkpoint = Checkpoint::new("p", "s", "/w", HashMap::new());

        let err = manager.rollback("p", Some(&checkpoint)).unwrap_err();
        assert!(err.to_string().contains("never persisted"));
    }

    #[test]
    fn test_rollback_without_log_cannot_start() {
        let dir = tempfile::tempdir().unwrap();
        let manager = RollbackManager::new(dir.path());

        let err = manager.rollback("p", None).unwrap_err();
        assert!(matches!(err, RollbackError::Store(StoreError::NotFound { .. })));
    }

    #[test]
    fn test_events_emitted() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(CollectingEventSink::new());
        let manager = RollbackManager::new(dir.path()).with_event_sink(sink.clone());

        manager.init_rollback_log("p").unwrap();
        manager
            .log_operation("p", RollbackOperation::file_created(dir.path().join("x")))
            .unwrap();
        manager.rollback("p", None).unwrap();

        assert_eq!(sink.events_of_type("rollback.").len(), 4);
        assert_eq!(sink.events_for("p").len(), 4);
        let completed = sink
            .events_of_type(event_types::ROLLBACK_COMPLETED)
            .pop()
            .unwrap();
        assert_eq!(completed.data["clean"], true);
    }

    #[test]
    fn test_debug_shows_base_dir() {
        let manager = RollbackManager::new("/var/lib/sg");
        let debug = format!("{manager:?}");
        assert!(debug.contains("/var/lib/sg"));
        assert_eq!(manager.base_dir(), Path::new("/var/lib/sg"));
    }
}
