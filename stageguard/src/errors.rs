//! Error types for the stageguard crate.
//!
//! Errors follow the taxonomy of the rollback safety net:
//! - persistence errors ([`StoreError`]) are fatal to the current step
//! - rollback-execution errors are collected into [`RollbackError::Incomplete`]
//! - contract failures are reported as [`ValidationFailure`]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::contracts::ValidationFailure;
use crate::rollback::RollbackReport;

/// The main error type for stageguard operations.
#[derive(Debug, Error)]
pub enum StageguardError {
    /// A persisted checkpoint, log or backup could not be read or written.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// A rollback could not start or did not complete cleanly.
    #[error("{0}")]
    Rollback(#[from] RollbackError),

    /// A contract validator rejected the step output.
    #[error("{0}")]
    Validation(#[from] ValidationFailure),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the checkpoint, log and backup stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A pipeline or step identifier cannot be used as a directory component.
    #[error("Invalid identifier '{value}': {reason}")]
    InvalidIdentifier {
        /// The rejected identifier.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An operation violates the logging invariants and was not recorded.
    #[error("Invalid {op_type} operation on '{target}': {reason}")]
    InvalidOperation {
        /// The operation type tag.
        op_type: String,
        /// The operation target.
        target: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The requested record does not exist.
    #[error("{what} not found at {}", path.display())]
    NotFound {
        /// Kind of record ("checkpoint", "rollback log", ...).
        what: &'static str,
        /// Where it was expected.
        path: PathBuf,
    },

    /// A filesystem call failed.
    #[error("IO error while {context} {}: {source}", path.display())]
    Io {
        /// What the store was doing.
        context: &'static str,
        /// The path involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A stored record could not be decoded.
    #[error("Corrupt {what} at {}: {source}", path.display())]
    Decode {
        /// Kind of record.
        what: &'static str,
        /// The corrupt file.
        path: PathBuf,
        /// The decoder error.
        #[source]
        source: serde_json::Error,
    },

    /// A record could not be encoded.
    #[error("Failed to encode {what}: {source}")]
    Encode {
        /// Kind of record.
        what: &'static str,
        /// The encoder error.
        #[source]
        source: serde_json::Error,
    },

    /// The per-pipeline lock could not be acquired.
    #[error("Failed to lock pipeline '{pipeline_id}' at {}: {source}", path.display())]
    Lock {
        /// The pipeline whose lock was requested.
        pipeline_id: String,
        /// The lock file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    /// Creates an IO error with context.
    #[must_use]
    pub fn io(context: &'static str, path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            context,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(what: &'static str, path: impl AsRef<Path>) -> Self {
        Self::NotFound {
            what,
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Creates an invalid identifier error.
    #[must_use]
    pub fn invalid_identifier(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if the record was missing.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Short machine-readable kind, used in events.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidIdentifier { .. } => "invalid_identifier",
            Self::InvalidOperation { .. } => "invalid_operation",
            Self::NotFound { .. } => "not_found",
            Self::Io { .. } => "io",
            Self::Decode { .. } => "decode",
            Self::Encode { .. } => "encode",
            Self::Lock { .. } => "lock",
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!(self.kind()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        match self {
            Self::NotFound { path, .. }
            | Self::Io { path, .. }
            | Self::Decode { path, .. }
            | Self::Lock { path, .. } => {
                map.insert("path".to_string(), serde_json::json!(path.display().to_string()));
            }
            Self::InvalidOperation { target, .. } => {
                map.insert("target".to_string(), serde_json::json!(target));
            }
            Self::InvalidIdentifier { .. } | Self::Encode { .. } => {}
        }
        map
    }
}

/// Errors returned by [`RollbackManager::rollback`](crate::rollback::RollbackManager::rollback).
#[derive(Debug, Error)]
pub enum RollbackError {
    /// The log could not be loaded or locked; nothing was reverted.
    #[error("Rollback could not start: {0}")]
    Store(#[from] StoreError),

    /// The checkpoint cannot be used as a rollback target.
    #[error("Invalid rollback target: {reason}")]
    InvalidTarget {
        /// Why the checkpoint was rejected.
        reason: String,
    },

    /// Some operations failed to revert or need manual follow-up.
    #[error("{}", .0.summary())]
    Incomplete(Box<RollbackReport>),
}

impl RollbackError {
    /// Returns the partial report when the rollback ran.
    #[must_use]
    pub fn report(&self) -> Option<&RollbackReport> {
        match self {
            Self::Incomplete(report) => Some(report),
            Self::Store(_) | Self::InvalidTarget { .. } => None,
        }
    }
}

/// Crate-level result alias.
pub type Result<T, E = StageguardError> = std::result::Result<T, E>;
