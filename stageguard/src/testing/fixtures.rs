//! Test fixtures for rollback testing.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::config::StoreConfig;
use crate::rollback::RollbackManager;

/// A temporary workspace next to a temporary store directory.
///
/// Both live under one temp dir that is removed on drop.
#[derive(Debug)]
pub struct TestWorkspace {
    root: TempDir,
    workspace: PathBuf,
    store: PathBuf,
}

impl TestWorkspace {
    /// Creates the directories.
    pub fn new() -> io::Result<Self> {
        let root = tempfile::tempdir()?;
        let workspace = root.path().join("workspace");
        let store = root.path().join("store");
        fs::create_dir_all(&workspace)?;
        Ok(Self {
            root,
            workspace,
            store,
        })
    }

    /// Root of the temp dir.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// The workspace directory.
    #[must_use]
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// The store base directory. Not created until first use.
    #[must_use]
    pub fn store_dir(&self) -> &Path {
        &self.store
    }

    /// Resolves a workspace-relative path.
    #[must_use]
    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.workspace.join(relative)
    }

    /// Writes a file in the workspace, creating parent directories.
    pub fn write_file(
        &self,
        relative: impl AsRef<Path>,
        contents: impl AsRef<[u8]>,
    ) -> io::Result<PathBuf> {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        Ok(path)
    }

    /// Reads a workspace file as UTF-8.
    pub fn read_file(&self, relative: impl AsRef<Path>) -> io::Result<String> {
        fs::read_to_string(self.path(relative))
    }

    /// A manager over the store directory, without fsync.
    #[must_use]
    pub fn manager(&self) -> RollbackManager {
        RollbackManager::with_config(StoreConfig::new(&self.store).with_fsync(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_files() {
        let ws = TestWorkspace::new().unwrap();
        let path = ws.write_file("src/lib.rs", "fn main() {}").unwrap();

        assert!(path.starts_with(ws.workspace()));
        assert_eq!(ws.read_file("src/lib.rs").unwrap(), "fn main() {}");
        assert!(!ws.store_dir().exists());
        assert_eq!(ws.manager().base_dir(), ws.store_dir());
    }

    #[test]
    fn test_workspace_removed_on_drop() {
        let ws = TestWorkspace::new().unwrap();
        let root = ws.root().to_path_buf();
        drop(ws);
        assert!(!root.exists());
    }
}
