//! Testing utilities for code built on stageguard.
//!
//! This module provides:
//! - A disposable workspace plus store directory
//! - File assertions for rollback outcomes

mod assertions;
mod fixtures;

pub use assertions::{
    assert_file_absent, assert_file_content, assert_file_exists, assert_rollback_clean,
    assert_rollback_incomplete,
};
pub use fixtures::TestWorkspace;
