//! Identifier validation.
//!
//! Pipeline and step identifiers become directory and file names under the
//! store's base directory, so anything that could escape that directory is
//! rejected up front.

use crate::errors::StoreError;

/// Validates that `value` can be used as a single path component.
///
/// `kind` names the identifier in the error ("pipeline id", "step id").
pub fn validate_identifier(kind: &str, value: &str) -> Result<(), StoreError> {
    if value.trim().is_empty() {
        return Err(StoreError::invalid_identifier(
            value,
            format!("{kind} cannot be empty or whitespace-only"),
        ));
    }

    if value == "." || value == ".." {
        return Err(StoreError::invalid_identifier(
            value,
            format!("{kind} cannot be a relative directory reference"),
        ));
    }

    if let Some(c) = value.chars().find(|c| matches!(c, '/' | '\\') || c.is_control()) {
        return Err(StoreError::invalid_identifier(
            value,
            format!("{kind} cannot contain {c:?}"),
        ));
    }

    Ok(())
}
