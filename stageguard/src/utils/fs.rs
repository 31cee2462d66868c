//! Durable file IO.
//!
//! Every persisted record is written to a temp file in the destination
//! directory, flushed, then renamed over the destination. Readers therefore
//! see either the previous or the new content, never a torn write.

use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::trace;

use crate::errors::StoreError;

/// Longest readable prefix kept by [`encode_path`].
const MAX_ENCODED_LEN: usize = 96;

/// Serializes `value` as pretty JSON and atomically replaces `path`.
pub fn write_json_atomic<T: Serialize>(
    path: &Path,
    value: &T,
    what: &'static str,
    fsync: bool,
) -> Result<(), StoreError> {
    let json =
        serde_json::to_vec_pretty(value).map_err(|source| StoreError::Encode { what, source })?;

    let mut tmp = temp_file_for(path)?;
    tmp.write_all(&json)
        .map_err(|e| StoreError::io("writing temp file for", path, e))?;
    persist(tmp, path, fsync)?;

    trace!(path = %path.display(), bytes = json.len(), what, "Record written");
    Ok(())
}

/// Reads and decodes a JSON record.
///
/// A missing file maps to [`StoreError::NotFound`].
pub fn read_json<T: DeserializeOwned>(path: &Path, what: &'static str) -> Result<T, StoreError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(StoreError::not_found(what, path));
        }
        Err(e) => return Err(StoreError::io("reading", path, e)),
    };

    serde_json::from_slice(&bytes).map_err(|source| StoreError::Decode {
        what,
        path: path.to_path_buf(),
        source,
    })
}

/// Atomically replaces `dest` with the bytes of `src`, keeping `src`'s permissions.
///
/// Creates the parent directory of `dest` when it is missing.
pub fn copy_file_atomic(src: &Path, dest: &Path, fsync: bool) -> Result<u64, StoreError> {
    let mut tmp = fill_temp_copy(src, dest)?;
    tmp.flush()
        .map_err(|e| StoreError::io("flushing temp file for", dest, e))?;
    let bytes = tmp
        .as_file()
        .metadata()
        .map_err(|e| StoreError::io("inspecting temp file for", dest, e))?
        .len();
    persist(tmp, dest, fsync)?;
    Ok(bytes)
}

/// Copies `src` to `dest` without ever replacing an existing `dest`.
///
/// Returns `Ok(false)` when `dest` already exists.
pub fn copy_file_noclobber(src: &Path, dest: &Path, fsync: bool) -> Result<bool, StoreError> {
    let tmp = fill_temp_copy(src, dest)?;
    if fsync {
        tmp.as_file()
            .sync_all()
            .map_err(|e| StoreError::io("syncing temp file for", dest, e))?;
    }

    match tmp.persist_noclobber(dest) {
        Ok(_) => {
            sync_parent(dest, fsync);
            Ok(true)
        }
        Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(StoreError::io("persisting", dest, e.error)),
    }
}

/// Encodes a path into a single, filesystem-safe file name.
///
/// The readable part keeps ASCII alphanumerics, `.`, `-` and `_`; everything
/// else becomes `_`. A short hash of the full path is appended so that two
/// paths sharing an encoding never map to the same name.
#[must_use]
pub fn encode_path(path: &Path) -> String {
    let raw = path.to_string_lossy();
    let mut readable: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = readable.trim_start_matches(['_', '.']).len();
    readable.drain(..readable.len() - trimmed);
    if readable.len() > MAX_ENCODED_LEN {
        readable.drain(..readable.len() - MAX_ENCODED_LEN);
    }
    if readable.is_empty() {
        readable.push_str("file");
    }

    let digest = Sha256::digest(raw.as_bytes());
    format!("{readable}-{}", &hex::encode(digest)[..8])
}

/// Removes a file, symlink or directory tree, treating an absent path as success.
///
/// Returns whether anything was actually removed.
pub fn remove_path_if_exists(path: &Path) -> io::Result<bool> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };

    let result = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

fn temp_file_for(path: &Path) -> Result<NamedTempFile, StoreError> {
    let dir = parent_dir(path);
    fs::create_dir_all(&dir).map_err(|e| StoreError::io("creating directory", &dir, e))?;
    NamedTempFile::new_in(&dir).map_err(|e| StoreError::io("creating temp file in", &dir, e))
}

fn fill_temp_copy(src: &Path, dest: &Path) -> Result<NamedTempFile, StoreError> {
    let mut source = File::open(src).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => StoreError::not_found("file", src),
        _ => StoreError::io("opening", src, e),
    })?;
    let permissions = source
        .metadata()
        .map_err(|e| StoreError::io("inspecting", src, e))?
        .permissions();

    let mut tmp = temp_file_for(dest)?;
    io::copy(&mut source, &mut tmp).map_err(|e| StoreError::io("copying", src, e))?;
    fs::set_permissions(tmp.path(), permissions)
        .map_err(|e| StoreError::io("setting permissions for", dest, e))?;
    Ok(tmp)
}

fn persist(tmp: NamedTempFile, path: &Path, fsync: bool) -> Result<(), StoreError> {
    if fsync {
        tmp.as_file()
            .sync_all()
            .map_err(|e| StoreError::io("syncing temp file for", path, e))?;
    }
    tmp.persist(path)
        .map_err(|e| StoreError::io("renaming temp file to", path, e.error))?;
    sync_parent(path, fsync);
    Ok(())
}

fn sync_parent(path: &Path, fsync: bool) {
    if !fsync {
        return;
    }
    // Directory fsync makes the rename durable; best effort.
    #[cfg(unix)]
    {
        if let Ok(dir) = File::open(parent_dir(path)) {
            let _ = dir.sync_all();
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
