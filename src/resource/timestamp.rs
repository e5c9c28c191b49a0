//! Conversions from provider timestamp encodings to [`DateTime<Utc>`].

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::{ProviderError, Result};

/// Format used by endpoints that report naive UTC timestamps.
const NAIVE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parses an RFC 3339 timestamp, or a naive `YYYY-MM-DD HH:MM:SS` one taken as UTC.
///
/// # Errors
///
/// Returns a mapping error if neither format matches.
pub fn parse_timestamp(kind: &'static str, value: &str) -> Result<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(value, NAIVE_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| ProviderError::mapping(kind, format!("invalid timestamp '{value}': {e}")))
}

/// Converts Unix seconds to a timestamp.
///
/// # Errors
///
/// Returns a mapping error if the value is out of range.
pub fn from_unix_seconds(kind: &'static str, secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| ProviderError::mapping(kind, format!("timestamp {secs} out of range")))
}
