//! Checkpoint store.
//!
//! One JSON record per `(pipeline_id, step_id)`. Records are replaced
//! atomically, so a retried step overwrites its earlier checkpoint.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::layout::{PipelineLayout, CHECKPOINT_EXTENSION};
use super::types::Checkpoint;
use crate::errors::StoreError;
use crate::utils::{read_json, write_json_atomic};

const RECORD: &str = "checkpoint";

/// Persists and loads checkpoints under a base directory.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    base_dir: PathBuf,
    fsync: bool,
}

impl CheckpointStore {
    /// Creates a store rooted at `base_dir`.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>, fsync: bool) -> Self {
        Self {
            base_dir: base_dir.into(),
            fsync,
        }
    }

    /// Builds, persists and returns a checkpoint.
    ///
    /// The returned record has `can_rollback` set; it is only set once the
    /// write succeeded.
    pub fn create(
        &self,
        pipeline_id: &str,
        step_id: &str,
        workspace_path: &Path,
        artifacts: HashMap<String, PathBuf>,
    ) -> Result<Checkpoint, StoreError> {
        let layout = PipelineLayout::new(&self.base_dir, pipeline_id)?;
        let path = layout.checkpoint_path(step_id)?;

        let mut checkpoint = Checkpoint::new(pipeline_id, step_id, workspace_path, artifacts);
        checkpoint.can_rollback = true;
        write_json_atomic(&path, &checkpoint, RECORD, self.fsync)?;

        debug!(
            pipeline_id,
            step_id,
            path = %path.display(),
            artifacts = checkpoint.artifacts.len(),
            "Checkpoint persisted"
        );
        Ok(checkpoint)
    }

    /// Loads the checkpoint of `(pipeline_id, step_id)`.
    pub fn load(&self, pipeline_id: &str, step_id: &str) -> Result<Checkpoint, StoreError> {
        let layout = PipelineLayout::new(&self.base_dir, pipeline_id)?;
        read_json(&layout.checkpoint_path(step_id)?, RECORD)
    }

    /// Lists every checkpoint of a pipeline, oldest first.
    ///
    /// An unknown pipeline has no checkpoints. Files that are not checkpoint
    /// records (e.g. temp files left by a crash) are skipped; a corrupt
    /// record is an error.
    pub fn list(&self, pipeline_id: &str) -> Result<Vec<Checkpoint>, StoreError> {
        let layout = PipelineLayout::new(&self.base_dir, pipeline_id)?;
        let dir = layout.checkpoints_dir();

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io("listing", &dir, e)),
        };

        let mut checkpoints = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| StoreError::io("listing", &dir, e))?.path();
            let is_record = path.extension().and_then(|ext| ext.to_str())
                == Some(CHECKPOINT_EXTENSION)
                && path.is_file();
            if !is_record {
                continue;
            }

            match read_json::<Checkpoint>(&path, RECORD) {
                Ok(checkpoint) => checkpoints.push(checkpoint),
                // Removed between listing and reading.
                Err(StoreError::NotFound { .. }) => {
                    warn!(path = %path.display(), "Checkpoint vanished while listing");
                }
                Err(e) => return Err(e),
            }
        }

        checkpoints.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.step_id.cmp(&b.step_id))
        });
        Ok(checkpoints)
    }

    /// Returns the most recent checkpoint of a pipeline, if any.
    pub fn latest(&self, pipeline_id: &str) -> Result<Option<Checkpoint>, StoreError> {
        Ok(self.list(pipeline_id)?.pop())
    }
}
