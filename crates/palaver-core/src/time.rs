//! Timestamp helpers.
//!
//! Every timestamp the chat core produces is UTC truncated to microseconds.
//! Stored timestamps use the fixed-width RFC 3339 form from [`to_db`], which
//! orders lexically the same way it orders chronologically.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

/// Current time, truncated to microsecond precision.
#[must_use]
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Render a timestamp for storage, e.g. `2024-05-01T12:00:00.000001Z`.
#[must_use]
pub fn to_db(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp.
pub fn from_db(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc))
}
