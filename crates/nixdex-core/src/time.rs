//! Parsing of discovery instants and step intervals

use crate::error::CoreError;
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};

/// Parses a step interval such as "6h" or "14d". Only hours and days are
/// accepted and the amount must be positive.
pub fn parse_interval(s: &str) -> Result<TimeDelta, CoreError> {
    let s = s.trim();
    let invalid = || CoreError::InvalidInterval(s.to_string());

    let unit = s.chars().last().ok_or_else(invalid)?;
    let amount: i64 = s[..s.len() - unit.len_utf8()].parse().map_err(|_| invalid())?;
    if amount <= 0 {
        return Err(invalid());
    }

    match unit {
        'h' => TimeDelta::try_hours(amount).ok_or_else(invalid),
        'd' => TimeDelta::try_days(amount).ok_or_else(invalid),
        _ => Err(invalid()),
    }
}

/// Parses an ISO-8601 instant: full RFC 3339 or a bare date (midnight UTC).
pub fn parse_instant(s: &str) -> Result<DateTime<Utc>, CoreError> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| CoreError::InvalidInstant(s.to_string()))
}
