//! Backup store.
//!
//! Backups live in `<base>/<pipeline_id>/backups/` and are named
//! `<seq>-<encoded path>`. The sequence prefix is taken under the pipeline
//! lock, so repeated backups of the same file never overwrite each other.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::layout::PipelineLayout;
use super::lock::PipelineLock;
use crate::errors::StoreError;
use crate::utils::{copy_file_noclobber, encode_path};

/// Takes byte-identical copies of files before they are mutated.
#[derive(Debug, Clone)]
pub struct BackupStore {
    base_dir: PathBuf,
    fsync: bool,
}

impl BackupStore {
    /// Creates a store rooted at `base_dir`.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>, fsync: bool) -> Self {
        Self {
            base_dir: base_dir.into(),
            fsync,
        }
    }

    /// Copies `file_path` into the pipeline's backup area and returns the copy's path.
    ///
    /// Fails with not-found when the source does not exist.
    pub fn create(&self, pipeline_id: &str, file_path: &Path) -> Result<PathBuf, StoreError> {
        let layout = PipelineLayout::new(&self.base_dir, pipeline_id)?;
        let _lock = PipelineLock::acquire(&layout)?;

        let dir = layout.backups_dir();
        let encoded = encode_path(file_path);
        let mut sequence = next_backup_sequence(&dir)?;

        loop {
            let dest = dir.join(format!("{sequence:06}-{encoded}"));
            if copy_file_noclobber(file_path, &dest, self.fsync)? {
                debug!(
                    pipeline_id,
                    source = %file_path.display(),
                    backup = %dest.display(),
                    "Backup created"
                );
                return Ok(dest);
            }
            // Taken by a writer that ignored the lock; move past it.
            sequence += 1;
        }
    }
}

fn next_backup_sequence(dir: &Path) -> Result<u64, StoreError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(1),
        Err(e) => return Err(StoreError::io("listing", dir, e)),
    };

    let mut max = 0;
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io("listing", dir, e))?;
        let name = entry.file_name();
        let prefix = name
            .to_str()
            .and_then(|name| name.split_once('-'))
            .and_then(|(prefix, _)| prefix.parse::<u64>().ok());
        if let Some(seq) = prefix {
            max = max.max(seq);
        }
    }
    Ok(max + 1)
}
