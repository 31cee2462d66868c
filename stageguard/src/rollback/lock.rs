//! Per-pipeline writer lock.
//!
//! An advisory lock on `<base>/<pipeline_id>/.lock` serializes every
//! read-modify-write of a pipeline's state. Being file based, it also holds
//! across separate manager instances and processes sharing the base directory.
//! The lock is not reentrant: code holding a [`PipelineLock`] must not try to
//! acquire it again.
//!
//! Cleanup removes the lock file while holding it. A waiter that wakes up on
//! the removed file notices the path no longer names its file and retries on
//! a fresh one.

use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use tracing::trace;

use super::layout::PipelineLayout;
use crate::errors::StoreError;

/// Guard holding the exclusive lock of one pipeline. Released on drop.
#[derive(Debug)]
pub struct PipelineLock {
    file: File,
    pipeline_id: String,
}

impl PipelineLock {
    /// Blocks until the exclusive lock of the pipeline is held.
    ///
    /// Creates the pipeline directory when it does not exist yet.
    pub fn acquire(layout: &PipelineLayout) -> Result<Self, StoreError> {
        let root = layout.root();
        let path = layout.lock_path();
        let lock_error = |source| StoreError::Lock {
            pipeline_id: layout.pipeline_id().to_string(),
            path: path.clone(),
            source,
        };

        loop {
            fs::create_dir_all(root).map_err(|e| StoreError::io("creating directory", root, e))?;
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(&path)
                .map_err(lock_error)?;
            FileExt::lock_exclusive(&file).map_err(lock_error)?;

            if is_current(&file, &path).map_err(lock_error)? {
                trace!(pipeline_id = layout.pipeline_id(), "Pipeline lock acquired");
                return Ok(Self {
                    file,
                    pipeline_id: layout.pipeline_id().to_string(),
                });
            }
            trace!(
                pipeline_id = layout.pipeline_id(),
                "Lock file removed while waiting, retrying"
            );
        }
    }
}

/// True when `path` still names the locked `file`.
#[cfg(unix)]
fn is_current(file: &File, path: &Path) -> io::Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let held = file.metadata()?;
    match fs::metadata(path) {
        Ok(on_disk) => Ok(held.dev() == on_disk.dev() && held.ino() == on_disk.ino()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

// Open files cannot be removed here, so the path always names the held file.
#[cfg(not(unix))]
fn is_current(_file: &File, path: &Path) -> io::Result<bool> {
    Ok(path.exists())
}

impl Drop for PipelineLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        trace!(pipeline_id = %self.pipeline_id, "Pipeline lock released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_lock_creates_pipeline_dir() {
        let dir = tempfile::tempdir().unwrap();
        let layout = PipelineLayout::new(dir.path(), "p").unwrap();

        let lock = PipelineLock::acquire(&layout).unwrap();
        assert!(layout.lock_path().exists());
        drop(lock);

        // Reacquiring after release succeeds.
        PipelineLock::acquire(&layout).unwrap();
    }

    #[test]
    fn test_lock_is_exclusive_across_threads() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_path_buf();
        let inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let base = base.clone();
                let inside = Arc::clone(&inside);
                std::thread::spawn(move || {
                    let layout = PipelineLayout::new(Path::new(&base), "p").unwrap();
                    let _lock = PipelineLock::acquire(&layout).unwrap();
                    assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                    std::thread::sleep(Duration::from_millis(5));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_waiter_relocks_after_lock_file_removed() {
        use std::os::unix::fs::MetadataExt;

        let dir = tempfile::tempdir().unwrap();
        let layout = PipelineLayout::new(dir.path(), "p").unwrap();
        let held = PipelineLock::acquire(&layout).unwrap();

        let base = dir.path().to_path_buf();
        let waiter = std::thread::spawn(move || {
            let layout = PipelineLayout::new(&base, "p").unwrap();
            let lock = PipelineLock::acquire(&layout).unwrap();
            let on_disk = fs::metadata(layout.lock_path()).unwrap();
            let locked = lock.file.metadata().unwrap();
            assert_eq!(locked.ino(), on_disk.ino());
        });

        std::thread::sleep(Duration::from_millis(50));
        fs::remove_dir_all(layout.root()).unwrap();
        drop(held);

        waiter.join().unwrap();
        assert!(layout.lock_path().exists());
    }
}
