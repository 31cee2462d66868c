//! Test assertions for rollback outcomes.

use std::path::Path;

use crate::errors::RollbackError;
use crate::rollback::RollbackReport;

/// Asserts that a file exists.
pub fn assert_file_exists(path: &Path) {
    assert!(path.exists(), "Expected {} to exist", path.display());
}

/// Asserts that nothing exists at `path`.
pub fn assert_file_absent(path: &Path) {
    assert!(
        !path.exists(),
        "Expected {} to be absent, but it exists",
        path.display()
    );
}

/// Asserts that a file holds exactly `expected`.
pub fn assert_file_content(path: &Path, expected: impl AsRef<[u8]>) {
    let actual = std::fs::read(path)
        .unwrap_or_else(|e| panic!("Expected {} to be readable: {e}", path.display()));
    assert_eq!(
        actual,
        expected.as_ref(),
        "Unexpected content in {}: {:?}",
        path.display(),
        String::from_utf8_lossy(&actual)
    );
}

/// Asserts that a rollback succeeded and returns its report.
pub fn assert_rollback_clean(
    result: Result<RollbackReport, RollbackError>,
) -> RollbackReport {
    match result {
        Ok(report) => report,
        Err(e) => panic!("Expected a clean rollback, got: {e}"),
    }
}

/// Asserts that a rollback ran but was incomplete and returns its report.
pub fn assert_rollback_incomplete(
    result: Result<RollbackReport, RollbackError>,
) -> RollbackReport {
    match result {
        Err(RollbackError::Incomplete(report)) => *report,
        Err(e) => panic!("Expected an incomplete rollback, got: {e}"),
        Ok(report) => panic!("Expected an incomplete rollback, got a clean one: {}", report.summary()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_assertions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        assert_file_absent(&path);

        std::fs::write(&path, "abc").unwrap();
        assert_file_exists(&path);
        assert_file_content(&path, "abc");
    }

    #[test]
    #[should_panic(expected = "Expected a clean rollback")]
    fn test_clean_assertion_panics_on_error() {
        let report = RollbackReport::new("p", None);
        assert_rollback_clean(Err(RollbackError::Incomplete(Box::new(report))));
    }
}
