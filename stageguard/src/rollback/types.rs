//! Persisted records: checkpoints, logged operations and the rollback log.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::errors::StoreError;
use crate::utils::{now_utc, Timestamp};

/// Current on-disk format version of [`RollbackLog`].
pub const LOG_FORMAT_VERSION: u32 = 1;

/// A persisted marker of workspace and artifact state at a pipeline step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Pipeline the checkpoint belongs to.
    pub pipeline_id: String,
    /// Step the checkpoint was taken for.
    pub step_id: String,
    /// Workspace location at checkpoint time.
    pub workspace_path: PathBuf,
    /// Logical artifact name to file path, as produced by the step.
    #[serde(default)]
    pub artifacts: HashMap<String, PathBuf>,
    /// When the checkpoint was created.
    pub timestamp: Timestamp,
    /// True once the checkpoint is persisted and usable as a rollback target.
    pub can_rollback: bool,
}

impl Checkpoint {
    /// Builds an unpersisted checkpoint stamped with the current time.
    #[must_use]
    pub fn new(
        pipeline_id: impl Into<String>,
        step_id: impl Into<String>,
        workspace_path: impl Into<PathBuf>,
        artifacts: HashMap<String, PathBuf>,
    ) -> Self {
        Self {
            pipeline_id: pipeline_id.into(),
            step_id: step_id.into(),
            workspace_path: workspace_path.into(),
            artifacts,
            timestamp: now_utc(),
            can_rollback: false,
        }
    }

    /// Returns the path recorded for an artifact.
    #[must_use]
    pub fn artifact(&self, name: &str) -> Option<&Path> {
        self.artifacts.get(name).map(PathBuf::as_path)
    }
}

/// Tag of a logged operation.
///
/// The set is open: unknown tags are carried verbatim in [`OperationType::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OperationType {
    /// A file that did not exist was created.
    FileCreated,
    /// An existing file was changed.
    FileModified,
    /// An existing file was removed.
    FileDeleted,
    /// A version-control commit was made.
    GitCommit,
    /// Any other action, identified by its tag.
    Other(String),
}

impl OperationType {
    /// Returns the wire tag.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::FileCreated => "file_created",
            Self::FileModified => "file_modified",
            Self::FileDeleted => "file_deleted",
            Self::GitCommit => "git_commit",
            Self::Other(tag) => tag,
        }
    }

    /// True for the three file operation types.
    #[must_use]
    pub fn is_file_operation(&self) -> bool {
        matches!(
            self,
            Self::FileCreated | Self::FileModified | Self::FileDeleted
        )
    }
}

impl From<String> for OperationType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "file_created" => Self::FileCreated,
            "file_modified" => Self::FileModified,
            "file_deleted" => Self::FileDeleted,
            "git_commit" => Self::GitCommit,
            _ => Self::Other(tag),
        }
    }
}

impl From<&str> for OperationType {
    fn from(tag: &str) -> Self {
        Self::from(tag.to_string())
    }
}

impl From<OperationType> for String {
    fn from(op_type: OperationType) -> Self {
        match op_type {
            OperationType::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a logged operation is undone.
///
/// Computed by [`RollbackOperation::reversal`]; rollback and plan rendering
/// both match on it exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reversal<'a> {
    /// Remove the path that the operation created.
    DeletePath(&'a Path),
    /// Copy the backup over the target.
    RestoreBackup {
        /// The backup copy.
        backup: &'a Path,
        /// The file to restore.
        target: &'a Path,
    },
    /// The content is gone; nothing can be restored.
    Unrecoverable(&'a Path),
    /// An operator has to follow these steps.
    Manual(&'a [String]),
}

/// One logged mutating action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackOperation {
    /// Position in the pipeline's log, starting at 1. Assigned when logged.
    #[serde(default)]
    pub sequence: u64,
    /// Operation tag.
    #[serde(rename = "type")]
    pub op_type: OperationType,
    /// File path for file operations, opaque identifier otherwise.
    pub target: String,
    /// Backup copy of the target taken before the mutation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<PathBuf>,
    /// When the operation happened.
    pub timestamp: Timestamp,
    /// Whether the manager can undo this operation mechanically.
    pub can_revert: bool,
    /// Instructions for undoing the operation by hand.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub revert_steps: Vec<String>,
}

impl RollbackOperation {
    fn new(op_type: OperationType, target: String, backup: Option<PathBuf>) -> Self {
        Self {
            sequence: 0,
            op_type,
            target,
            backup,
            timestamp: now_utc(),
            can_revert: true,
            revert_steps: Vec::new(),
        }
    }

    /// A file was created; undone by deleting it.
    #[must_use]
    pub fn file_created(path: impl AsRef<Path>) -> Self {
        Self::new(OperationType::FileCreated, path_string(path), None)
    }

    /// A file was modified; undone by restoring `backup`.
    #[must_use]
    pub fn file_modified(path: impl AsRef<Path>, backup: impl Into<PathBuf>) -> Self {
        Self::new(
            OperationType::FileModified,
            path_string(path),
            Some(backup.into()),
        )
    }

    /// A file was deleted; undone by restoring `backup` when one was taken.
    #[must_use]
    pub fn file_deleted(path: impl AsRef<Path>, backup: Option<PathBuf>) -> Self {
        Self::new(OperationType::FileDeleted, path_string(path), backup)
    }

    /// A commit was made in `repository`. Never reverted automatically.
    #[must_use]
    pub fn git_commit(commit: impl Into<String>, repository: impl AsRef<Path>) -> Self {
        let commit = commit.into();
        let repository = repository.as_ref().display().to_string();
        let steps = vec![
            format!("cd {repository}"),
            format!("git show --stat {commit}"),
            format!("git revert --no-edit {commit}"),
            "Push or discard the revert commit according to the branch policy".to_string(),
        ];
        Self::manual(OperationType::GitCommit, commit, steps)
    }

    /// An action that only an operator can undo, following `steps`.
    #[must_use]
    pub fn manual(
        op_type: impl Into<OperationType>,
        target: impl Into<String>,
        steps: Vec<String>,
    ) -> Self {
        Self {
            can_revert: false,
            revert_steps: steps,
            ..Self::new(op_type.into(), target.into(), None)
        }
    }

    /// Overrides the operation timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// The target interpreted as a path.
    #[must_use]
    pub fn target_path(&self) -> &Path {
        Path::new(&self.target)
    }

    /// Works out how this operation is undone.
    ///
    /// Fails for a revertible `file_modified` without a backup and for
    /// revertible operations the manager has no reversal for.
    pub fn reversal(&self) -> Result<Reversal<'_>, String> {
        if !self.can_revert {
            return Ok(Reversal::Manual(&self.revert_steps));
        }

        let target = self.target_path();
        match (&self.op_type, self.backup.as_deref()) {
            (OperationType::FileCreated, _) => Ok(Reversal::DeletePath(target)),
            (OperationType::FileModified | OperationType::FileDeleted, Some(backup)) => {
                Ok(Reversal::RestoreBackup { backup, target })
            }
            (OperationType::FileModified, None) => {
                Err("no backup recorded for a modified file".to_string())
            }
            (OperationType::FileDeleted, None) => Ok(Reversal::Unrecoverable(target)),
            (other, _) => Err(format!(
                "operations of type '{other}' cannot be reverted automatically; \
                 log them with revert steps instead"
            )),
        }
    }

    /// Checks the logging invariants.
    pub fn validate(&self) -> Result<(), StoreError> {
        let invalid = |reason: String| StoreError::InvalidOperation {
            op_type: self.op_type.to_string(),
            target: self.target.clone(),
            reason,
        };

        if self.target.trim().is_empty() {
            return Err(invalid("target cannot be empty".to_string()));
        }
        if self.op_type.as_str().trim().is_empty() {
            return Err(invalid("type cannot be empty".to_string()));
        }
        self.reversal().map(|_| ()).map_err(invalid)
    }
}

fn path_string(path: impl AsRef<Path>) -> String {
    path.as_ref().to_string_lossy().into_owned()
}

/// The append-only operation log of one pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackLog {
    /// On-disk format version.
    #[serde(default = "default_version")]
    pub version: u32,
    /// Pipeline the log belongs to.
    pub pipeline_id: String,
    /// Operations in the order they were logged.
    #[serde(default)]
    pub operations: Vec<RollbackOperation>,
}

fn default_version() -> u32 {
    LOG_FORMAT_VERSION
}

impl RollbackLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new(pipeline_id: impl Into<String>) -> Self {
        Self {
            version: LOG_FORMAT_VERSION,
            pipeline_id: pipeline_id.into(),
            operations: Vec::new(),
        }
    }

    /// Number of logged operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// True when nothing has been logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Sequence number the next appended operation receives.
    #[must_use]
    pub fn next_sequence(&self) -> u64 {
        self.operations
            .iter()
            .map(|op| op.sequence)
            .max()
            .unwrap_or(0)
            + 1
    }

    /// Assigns the next sequence number and appends the operation.
    ///
    /// The timestamp is raised to the last operation's when it is older, so
    /// log order and timestamp order agree.
    pub fn push(&mut self, mut operation: RollbackOperation) -> &RollbackOperation {
        operation.sequence = self.next_sequence();
        if let Some(last) = self.operations.last() {
            operation.timestamp = operation.timestamp.max(last.timestamp);
        }
        self.operations.push(operation);
        &self.operations[self.operations.len() - 1]
    }

    /// Operations a rollback to `checkpoint` would undo, in reverse log order.
    ///
    /// Without a checkpoint every operation is selected. With one, only
    /// operations strictly after the checkpoint timestamp are.
    #[must_use]
    pub fn undo_order(&self, checkpoint: Option<&Checkpoint>) -> Vec<&RollbackOperation> {
        let mut selected: Vec<&RollbackOperation> = self
            .operations
            .iter()
            .filter(|op| checkpoint.map_or(true, |cp| op.timestamp > cp.timestamp))
            .collect();
        selected.sort_by_key(|op| std::cmp::Reverse(op.sequence));
        selected
    }
}
