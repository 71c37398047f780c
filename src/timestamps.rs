//! Timestamp conversion helpers between wall-clock time, epoch integers and
//! human-readable calendar strings

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::error::{Error, Result};

/// Milliseconds since the Unix epoch
pub type TimestampMs = i64;

/// Seconds since the Unix epoch
pub type TimestampS = i64;

/// Return the current wall-clock time in milliseconds since the epoch.
pub fn get_current_timestamp() -> TimestampMs {
    Utc::now().timestamp_millis()
}

/// A value that can be normalized into a millisecond epoch timestamp.
///
/// Closed set of accepted inputs: calendar datetimes, epoch-second counts
/// (integer or fractional) and ISO-like calendar strings.
#[derive(Debug, Clone, PartialEq)]
pub enum TimestampLike {
    DateTime(DateTime<Utc>),
    Naive(NaiveDateTime),
    Seconds(i64),
    SecondsF64(f64),
    Text(String),
}

impl From<DateTime<Utc>> for TimestampLike {
    fn from(value: DateTime<Utc>) -> Self {
        TimestampLike::DateTime(value)
    }
}

impl From<NaiveDateTime> for TimestampLike {
    fn from(value: NaiveDateTime) -> Self {
        TimestampLike::Naive(value)
    }
}

impl From<i64> for TimestampLike {
    fn from(value: i64) -> Self {
        TimestampLike::Seconds(value)
    }
}

impl From<f64> for TimestampLike {
    fn from(value: f64) -> Self {
        TimestampLike::SecondsF64(value)
    }
}

impl From<&str> for TimestampLike {
    fn from(value: &str) -> Self {
        TimestampLike::Text(value.to_string())
    }
}

impl From<String> for TimestampLike {
    fn from(value: String) -> Self {
        TimestampLike::Text(value)
    }
}

/// Normalize any accepted timestamp-like input into milliseconds since the
/// epoch, truncating sub-millisecond precision toward zero.
pub fn to_timestamp_ms(input: impl Into<TimestampLike>) -> Result<TimestampMs> {
    match input.into() {
        TimestampLike::DateTime(dt) => Ok(dt.timestamp_millis()),
        TimestampLike::Naive(naive) => Ok(naive.and_utc().timestamp_millis()),
        TimestampLike::Seconds(s) => s
            .checked_mul(1000)
            .ok_or_else(|| Error::InvalidTimestamp(format!("epoch seconds out of range: {s}"))),
        TimestampLike::SecondsF64(s) => {
            if !s.is_finite() {
                return Err(Error::InvalidTimestamp(format!(
                    "epoch seconds must be finite, got {s}"
                )));
            }
            Ok((s * 1000.0).trunc() as TimestampMs)
        }
        TimestampLike::Text(text) => Ok(parse_calendar_text(&text)?.timestamp_millis()),
    }
}

/// Render a millisecond epoch timestamp as a UTC calendar string.
pub fn timestamp_ms_to_str(ts: TimestampMs) -> Result<String> {
    let dt = DateTime::<Utc>::from_timestamp_millis(ts)
        .ok_or_else(|| Error::InvalidTimestamp(format!("millisecond timestamp out of range: {ts}")))?;
    Ok(dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
}

/// Render a second epoch timestamp as a UTC calendar string.
pub fn timestamp_s_to_str(ts: TimestampS) -> Result<String> {
    let dt = DateTime::<Utc>::from_timestamp(ts, 0)
        .ok_or_else(|| Error::InvalidTimestamp(format!("second timestamp out of range: {ts}")))?;
    Ok(dt.format("%Y-%m-%d %H:%M:%S").to_string())
}

/// Parse an ISO-like calendar string, assuming UTC when no offset is given.
fn parse_calendar_text(text: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        // Date-only input means midnight UTC
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }
    Err(Error::InvalidTimestamp(format!(
        "unrecognized calendar string: {text:?}"
    )))
}
