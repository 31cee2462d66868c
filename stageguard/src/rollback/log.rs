//! Rollback log store.
//!
//! The log of a pipeline is a single JSON document rewritten on every append.
//! Appends run under the pipeline lock as load, push, atomic replace; a
//! failed append leaves the previous document in place.

use std::path::PathBuf;
use tracing::{debug, info};

use super::layout::PipelineLayout;
use super::lock::PipelineLock;
use super::types::{RollbackLog, RollbackOperation};
use crate::errors::StoreError;
use crate::utils::{read_json, write_json_atomic};

const RECORD: &str = "rollback log";

/// Persists the append-only operation log of each pipeline.
#[derive(Debug, Clone)]
pub struct RollbackLogStore {
    base_dir: PathBuf,
    fsync: bool,
}

impl RollbackLogStore {
    /// Creates a store rooted at `base_dir`.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>, fsync: bool) -> Self {
        Self {
            base_dir: base_dir.into(),
            fsync,
        }
    }

    /// Ensures a log exists for the pipeline and returns it.
    ///
    /// An existing log is loaded and returned unchanged. A corrupt log is
    /// reported, never replaced.
    pub fn init(&self, pipeline_id: &str) -> Result<RollbackLog, StoreError> {
        let layout = PipelineLayout::new(&self.base_dir, pipeline_id)?;
        let _lock = PipelineLock::acquire(&layout)?;

        match self.load_from(&layout) {
            Ok(log) => {
                debug!(
                    pipeline_id,
                    operations = log.len(),
                    "Existing rollback log loaded"
                );
                Ok(log)
            }
            Err(StoreError::NotFound { .. }) => {
                let log = RollbackLog::new(pipeline_id);
                write_json_atomic(&layout.log_path(), &log, RECORD, self.fsync)?;
                info!(pipeline_id, "Rollback log created");
                Ok(log)
            }
            Err(e) => Err(e),
        }
    }

    /// Durably appends an operation and returns it with its sequence number.
    ///
    /// The operation is validated first; an invalid operation is rejected and
    /// nothing is written. A pipeline without a log gets one.
    pub fn append(
        &self,
        pipeline_id: &str,
        operation: RollbackOperation,
    ) -> Result<RollbackOperation, StoreError> {
        operation.validate()?;

        let layout = PipelineLayout::new(&self.base_dir, pipeline_id)?;
        let _lock = PipelineLock::acquire(&layout)?;

        let mut log = match self.load_from(&layout) {
            Ok(log) => log,
            Err(StoreError::NotFound { .. }) => RollbackLog::new(pipeline_id),
            Err(e) => return Err(e),
        };
        let stored = log.push(operation).clone();
        write_json_atomic(&layout.log_path(), &log, RECORD, self.fsync)?;

        debug!(
            pipeline_id,
            sequence = stored.sequence,
            op_type = %stored.op_type,
            target = %stored.target,
            can_revert = stored.can_revert,
            "Operation logged"
        );
        Ok(stored)
    }

    /// Loads the current log of a pipeline.
    ///
    /// Fails with not-found when the log was never initialized.
    pub fn load(&self, pipeline_id: &str) -> Result<RollbackLog, StoreError> {
        let layout = PipelineLayout::new(&self.base_dir, pipeline_id)?;
        self.load_from(&layout)
    }

    pub(crate) fn load_from(&self, layout: &PipelineLayout) -> Result<RollbackLog, StoreError> {
        read_json(&layout.log_path(), RECORD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rollback::types::OperationType;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn store(dir: &tempfile::TempDir) -> RollbackLogStore {
        RollbackLogStore::new(dir.path(), false)
    }

    #[test]
    fn test_init_fresh_log_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = store(&dir).init("p").unwrap();

        assert_eq!(log.pipeline_id, "p");
        assert!(log.is_empty());
        assert!(dir.path().join("p").join("rollback_log.json").exists());
    }

    #[test]
    fn test_append_order_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store.init("p").unwrap();

        let op1 = store
            .append("p", RollbackOperation::file_created("/w/one.txt"))
            .unwrap();
        let op2 = store
            .append("p", RollbackOperation::git_commit("abc123", "/w"))
            .unwrap();

        let log = store.load("p").unwrap();
        assert_eq!(log.operations, vec![op1, op2]);
        assert_eq!(log.operations[1].op_type, OperationType::GitCommit);
        assert_eq!(log.operations[1].sequence, 2);
    }

    #[test]
    fn test_init_keeps_existing_operations() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store.init("p").unwrap();
        store
            .append("p", RollbackOperation::file_created("/w/a"))
            .unwrap();

        let again = store.init("p").unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(store.load("p").unwrap().len(), 1);
    }

    #[test]
    fn test_init_does_not_replace_corrupt_log() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let log_path = dir.path().join("p").join("rollback_log.json");
        fs::create_dir_all(log_path.parent().unwrap()).unwrap();
        fs::write(&log_path, "[truncated").unwrap();

        assert!(matches!(store.init("p"), Err(StoreError::Decode { .. })));
        assert_eq!(fs::read_to_string(&log_path).unwrap(), "[truncated");
    }

    #[test]
    fn test_load_uninitialized_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert!(store(&dir).load("p").unwrap_err().is_not_found());
    }

    #[test]
    fn test_append_without_init_creates_log() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let op = store
            .append("p", RollbackOperation::file_created("/w/a"))
            .unwrap();
        assert_eq!(op.sequence, 1);
        assert_eq!(store.load("p").unwrap().len(), 1);
    }

    #[test]
    fn test_append_rejects_modified_without_backup() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store.init("p").unwrap();

        let mut op = RollbackOperation::file_modified("/w/a", "/b/a");
        op.backup = None;
        assert!(matches!(
            store.append("p", op),
            Err(StoreError::InvalidOperation { .. })
        ));
        assert!(store.load("p").unwrap().is_empty());
    }

    #[test]
    fn test_log_order_wins_over_build_time() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let built_early = RollbackOperation::file_modified("/w/a.txt", "/b/000001-a");
        let built_late = RollbackOperation::file_created("/w/new.txt")
            .with_timestamp(built_early.timestamp + chrono::Duration::seconds(5));

        let first = store.append("p", built_late).unwrap();
        let second = store.append("p", built_early).unwrap();
        assert!(second.timestamp >= first.timestamp);

        let log = store.load("p").unwrap();
        let undo: Vec<u64> = log.undo_order(None).iter().map(|op| op.sequence).collect();
        assert_eq!(undo, vec![2, 1]);
    }
}
