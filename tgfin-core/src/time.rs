//! Time utilities: RFC 3339 stamps for records and the store header.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Format a UTC time into RFC3339.
pub fn to_rfc3339_utc(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// Current time as RFC3339, used for `last_updated` and missing message dates.
pub fn now_rfc3339() -> String {
    to_rfc3339_utc(Utc::now())
}

/// Parse an ISO-8601 timestamp. Offsets are honoured; naive values
/// (Python's `isoformat()` without tz) are read as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|ndt| ndt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_offset_timestamp() {
        let dt = parse_timestamp("2026-02-18T13:00:00+03:00").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2026, 2, 18, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_naive_timestamp_as_utc() {
        let dt = parse_timestamp("2026-02-18T10:00:00.123456").unwrap();
        assert_eq!(to_rfc3339_utc(dt), "2026-02-18T10:00:00.123456+00:00");
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse_timestamp("yesterday").is_none());
    }
}
