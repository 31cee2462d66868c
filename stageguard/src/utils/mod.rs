//! Utility functions for timestamps, durable file IO and identifier checks.

pub mod fs;
pub mod timestamps;
pub mod validation;

pub use fs::{
    copy_file_atomic, copy_file_noclobber, encode_path, read_json, remove_path_if_exists,
    write_json_atomic,
};
pub use timestamps::{format_iso8601, now_utc, Timestamp};
pub use validation::validate_identifier;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_formats_as_utc() {
        let ts = format_iso8601(&now_utc());
        assert!(ts.contains('T'));
        assert!(ts.ends_with("+00:00"));
    }

    #[test]
    fn test_validate_identifier_reexport() {
        assert!(validate_identifier("pipeline", "run-1").is_ok());
    }
}
