//! Configuration types for the rollback store and the contract validators.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the on-disk checkpoint/log/backup store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base directory; one subdirectory per pipeline lives below it.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
    /// Whether to fsync records and their directories after each write.
    #[serde(default = "default_fsync")]
    pub fsync: bool,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from(".stageguard")
}

fn default_fsync() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            fsync: default_fsync(),
        }
    }
}

impl StoreConfig {
    /// Creates a store configuration rooted at `base_dir`.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    /// Enables or disables fsync after writes.
    ///
    /// Disabling it trades crash durability for speed; temp-file-then-rename
    /// atomicity is kept either way.
    #[must_use]
    pub fn with_fsync(mut self, fsync: bool) -> Self {
        self.fsync = fsync;
        self
    }
}

/// Configuration shared by the contract validators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Number of trailing stdout/stderr lines kept on a failed test run.
    #[serde(default = "default_tail_lines")]
    pub tail_lines: usize,
    /// Timeout for a test-suite run when the contract sets none.
    #[serde(default = "default_test_timeout")]
    pub default_timeout_seconds: f64,
}

fn default_tail_lines() -> usize {
    10
}

fn default_test_timeout() -> f64 {
    600.0
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            tail_lines: default_tail_lines(),
            default_timeout_seconds: default_test_timeout(),
        }
    }
}

impl ValidatorConfig {
    /// Creates a new validator configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of output lines kept on failure.
    #[must_use]
    pub fn with_tail_lines(mut self, lines: usize) -> Self {
        self.tail_lines = lines;
        self
    }

    /// Sets the default test-suite timeout.
    #[must_use]
    pub fn with_default_timeout(mut self, seconds: f64) -> Self {
        self.default_timeout_seconds = seconds;
        self
    }

    /// Gets the default timeout as Duration.
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.default_timeout_seconds.max(0.0)).unwrap_or(Duration::MAX)
    }
}
