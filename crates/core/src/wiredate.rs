//! Flexible date parsing for `UpdateItem` wire values.
//!
//! Callers send timestamps in whatever format their tooling produces;
//! the accepted set below mirrors what operators actually type. Naive
//! dates resolve to UTC midnight.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::error::CoreError;
use crate::types::Timestamp;

/// Datetime formats tried in order after RFC 3339.
const DATETIME_FMTS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// Date-only formats tried in order.
const DATE_FMTS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%m/%d/%y"];

/// Parse a wire date string into a UTC timestamp.
pub fn parse(s: &str) -> Result<Timestamp, CoreError> {
    let s = s.trim().trim_matches('"').trim();

    if let Some(dt) = relative_date(s) {
        return Ok(dt);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    for fmt in DATETIME_FMTS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    for fmt in DATE_FMTS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap()));
        }
    }

    Err(CoreError::Validation(format!("date could not be decoded: {s}")))
}

/// "today", "yesterday", "tomorrow" resolve against the current UTC date.
fn relative_date(s: &str) -> Option<Timestamp> {
    let today = Utc
        .from_utc_datetime(&Utc::now().date_naive().and_hms_opt(0, 0, 0).unwrap());
    match s {
        "today" => Some(today),
        "yesterday" => Some(today - Duration::days(1)),
        "tomorrow" => Some(today + Duration::days(1)),
        _ => None,
    }
}
