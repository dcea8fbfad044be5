//! Timestamp helpers
//!
//! All persisted timestamps are UTC, truncated to whole seconds, and stored
//! as RFC 3339 strings. Sub-second precision is dropped up front so that a
//! value survives a round trip through the document store unchanged.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

/// Current UTC time truncated to whole seconds.
pub fn truncated_now() -> DateTime<Utc> {
    let now = Utc::now();
    Utc.timestamp_opt(now.timestamp(), 0)
        .single()
        .unwrap_or(now)
}

/// Render a timestamp the way it is persisted.
pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse a persisted timestamp. Returns `None` for anything that is not a
/// valid RFC 3339 string.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncated_now_has_no_subsecond_part() {
        let now = truncated_now();
        assert_eq!(now.timestamp_subsec_nanos(), 0);
    }

    #[test]
    fn format_parse_round_trip() {
        let now = truncated_now();
        let rendered = format_timestamp(now);
        assert_eq!(parse_timestamp(&rendered), Some(now));
    }
}
