//! Date/time utilities for docstore.
//!
//! Upload timestamps are kept as naive UTC datetimes. In the database they
//! are stored as fixed-width text so that lexical comparison in SQL matches
//! chronological order.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Utc};

use crate::{DocstoreError, Result};

/// Storage format for timestamps in the database.
pub const DB_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Wire format for timestamps in API payloads.
pub const API_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Current server time in UTC, truncated to microseconds.
pub fn now() -> NaiveDateTime {
    let now = Utc::now().naive_utc();
    // Round-trip through the storage format so in-memory and stored values agree.
    parse_db_timestamp(&to_db_timestamp(&now)).unwrap_or(now)
}

/// Format a timestamp for storage.
pub fn to_db_timestamp(dt: &NaiveDateTime) -> String {
    dt.format(DB_TIMESTAMP_FORMAT).to_string()
}

/// Parse a timestamp read from storage.
pub fn parse_db_timestamp(s: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DB_TIMESTAMP_FORMAT)
        .map_err(|e| DocstoreError::Database(format!("invalid stored timestamp {s:?}: {e}")))
}

/// Years the storage format can represent with four digits.
const STORABLE_YEARS: std::ops::RangeInclusive<i32> = 0..=9999;

/// The half-open one-day window `[start, start + 1 day)`.
///
/// The end is `None` when it falls past the last storable year, leaving
/// the window open-ended. Starts outside the storable years are rejected
/// since stored text would no longer sort against them.
pub fn day_window(start: NaiveDateTime) -> Result<(NaiveDateTime, Option<NaiveDateTime>)> {
    if !STORABLE_YEARS.contains(&start.year()) {
        return Err(DocstoreError::Validation(format!(
            "date out of range: {start}"
        )));
    }
    let end = start
        .checked_add_signed(Duration::days(1))
        .filter(|end| STORABLE_YEARS.contains(&end.year()));
    Ok((start, end))
}

/// Parse a search date from an API payload.
///
/// Accepts a full `yyyy-MM-ddTHH:mm:ss` timestamp or a bare `yyyy-MM-dd`
/// date (taken as midnight).
pub fn parse_api_datetime(s: &str) -> Result<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, API_TIMESTAMP_FORMAT) {
        return Ok(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(dt);
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return Ok(dt);
        }
    }
    Err(DocstoreError::Validation(format!("invalid date: {s:?}")))
}

/// Serde adapter writing timestamps as `yyyy-MM-ddTHH:mm:ss`.
pub mod api_format {
    use chrono::NaiveDateTime;
    use serde::Serializer;

    use super::API_TIMESTAMP_FORMAT;

    pub fn serialize<S>(dt: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&dt.format(API_TIMESTAMP_FORMAT).to_string())
    }
}

/// Serde adapter for optional timestamps in request payloads.
pub mod api_format_opt {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(s) if !s.trim().is_empty() => super::parse_api_datetime(&s)
                .map(Some)
                .map_err(serde::de::Error::custom),
            _ => Ok(None),
        }
    }
}
