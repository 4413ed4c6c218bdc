//! Engine Time Base
//!
//! One timestamp representation for the whole engine: signed nanoseconds
//! since the Unix epoch. Events carry two of them, `ts_event` (when the
//! represented fact occurred; supplied by the data source during replay)
//! and `ts_created` (wall clock at construction). RFC 3339 strings appear
//! only at the configuration edge and are converted on the way in.

use std::time::{SystemTime, UNIX_EPOCH};

/// Nanoseconds since the Unix epoch. An `i64` covers the engine's horizon
/// comfortably (through the year 2262).
pub type Nanos = i64;

/// Wall-clock now, for `ts_created` stamps.
#[inline]
pub fn now_ns() -> Nanos {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as Nanos)
        .unwrap_or(0)
}

/// Convert an RFC 3339 timestamp (as taken from the CLI or a stored run
/// configuration) into engine nanoseconds. None if the string does not
/// parse or falls outside the representable range.
pub fn parse_timestamp(s: &str) -> Option<Nanos> {
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .and_then(|dt| dt.timestamp_nanos_opt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp() {
        // 2024-06-01T00:00:00Z is 1_717_200_000 epoch seconds.
        assert_eq!(
            parse_timestamp("2024-06-01T00:00:00Z"),
            Some(1_717_200_000 * 1_000_000_000)
        );
        // Offsets are normalised to UTC.
        assert_eq!(
            parse_timestamp("2024-06-01T02:00:00+02:00"),
            Some(1_717_200_000 * 1_000_000_000)
        );
        // Sub-second precision survives.
        assert_eq!(
            parse_timestamp("1970-01-01T00:00:00.000000123Z"),
            Some(123)
        );
        assert_eq!(parse_timestamp("not a timestamp"), None);
        assert_eq!(parse_timestamp("2024-06-01"), None);
    }

    #[test]
    fn test_now_is_sane() {
        // After 2020, before 2100.
        let now = now_ns();
        assert!(now > 1_577_836_800 * 1_000_000_000);
        assert!(now < 4_102_444_800 * 1_000_000_000);
    }
}
