//! On-disk layout of a pipeline's persisted state.
//!
//! ```text
//! <base>/<pipeline_id>/checkpoints/<step_id>.json
//! <base>/<pipeline_id>/rollback_log.json
//! <base>/<pipeline_id>/backups/<sequence>-<encoded-path>
//! <base>/<pipeline_id>/.lock
//! ```

use std::path::{Path, PathBuf};

use crate::errors::StoreError;
use crate::utils::validate_identifier;

/// File name of the rollback log inside a pipeline directory.
pub const ROLLBACK_LOG_FILENAME: &str = "rollback_log.json";
/// Directory holding checkpoint records.
pub const CHECKPOINTS_DIRNAME: &str = "checkpoints";
/// Directory holding backup copies.
pub const BACKUPS_DIRNAME: &str = "backups";
/// Lock file serializing writers of one pipeline.
pub const LOCK_FILENAME: &str = ".lock";
/// Extension of checkpoint records.
pub const CHECKPOINT_EXTENSION: &str = "json";

/// Paths of one pipeline's subtree under the store base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineLayout {
    pipeline_id: String,
    root: PathBuf,
}

impl PipelineLayout {
    /// Resolves the layout of `pipeline_id` under `base_dir`.
    pub fn new(base_dir: &Path, pipeline_id: &str) -> Result<Self, StoreError> {
        validate_identifier("pipeline id", pipeline_id)?;
        Ok(Self {
            pipeline_id: pipeline_id.to_string(),
            root: base_dir.join(pipeline_id),
        })
    }

    /// The pipeline identifier.
    #[must_use]
    pub fn pipeline_id(&self) -> &str {
        &self.pipeline_id
    }

    /// The pipeline's root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of checkpoint records.
    #[must_use]
    pub fn checkpoints_dir(&self) -> PathBuf {
        self.root.join(CHECKPOINTS_DIRNAME)
    }

    /// Record path of the checkpoint for `step_id`.
    pub fn checkpoint_path(&self, step_id: &str) -> Result<PathBuf, StoreError> {
        validate_identifier("step id", step_id)?;
        Ok(self
            .checkpoints_dir()
            .join(format!("{step_id}.{CHECKPOINT_EXTENSION}")))
    }

    /// Path of the rollback log.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.root.join(ROLLBACK_LOG_FILENAME)
    }

    /// Directory of backup copies.
    #[must_use]
    pub fn backups_dir(&self) -> PathBuf {
        self.root.join(BACKUPS_DIRNAME)
    }

    /// Path of the writer lock file.
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILENAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let layout = PipelineLayout::new(Path::new("/base"), "p1").unwrap();

        assert_eq!(layout.root(), Path::new("/base/p1"));
        assert_eq!(layout.log_path(), Path::new("/base/p1/rollback_log.json"));
        assert_eq!(
            layout.checkpoint_path("step-1").unwrap(),
            Path::new("/base/p1/checkpoints/step-1.json")
        );
        assert_eq!(layout.backups_dir(), Path::new("/base/p1/backups"));
        assert_eq!(layout.lock_path(), Path::new("/base/p1/.lock"));
    }

    #[test]
    fn test_layout_rejects_bad_ids() {
        assert!(PipelineLayout::new(Path::new("/base"), "../etc").is_err());
        let layout = PipelineLayout::new(Path::new("/base"), "p").unwrap();
        assert!(layout.checkpoint_path("").is_err());
        assert!(layout.checkpoint_path("a/b").is_err());
    }
}
