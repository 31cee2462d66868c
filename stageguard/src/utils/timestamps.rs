//! Timestamp helpers.
//!
//! Checkpoint and operation records use [`Timestamp`] (UTC, nanosecond
//! precision). Serde encodes it as RFC 3339 with the full fractional part, so
//! records round-trip without losing sub-second ordering.

use chrono::{DateTime, Utc};

/// Represents a timestamp that can be serialized/deserialized.
pub type Timestamp = DateTime<Utc>;

/// Returns the current UTC timestamp.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Formats a timestamp as ISO 8601 string with microsecond precision.
///
/// # Examples
///
/// ```
/// use chrono::TimeZone;
/// use stageguard::utils::format_iso8601;
///
/// let ts = chrono::Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
/// assert_eq!(format_iso8601(&ts), "2024-01-02T03:04:05.000000+00:00");
/// ```
#[must_use]
pub fn format_iso8601(dt: &Timestamp) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_iso8601() {
        let dt = Utc.with_ymd_and_hms(2023, 10, 5, 14, 30, 0).unwrap();
        assert_eq!(format_iso8601(&dt), "2023-10-05T14:30:00.000000+00:00");
    }

    #[test]
    fn test_serde_keeps_nanoseconds() {
        let dt = Utc.timestamp_opt(1_696_512_000, 123_456_789).unwrap();
        let json = serde_json::to_string(&dt).unwrap();
        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, dt);
    }

    #[test]
    fn test_now_utc_non_decreasing() {
        let a = now_utc();
        let b = now_utc();
        assert!(b >= a);
    }
}
