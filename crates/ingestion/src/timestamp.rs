//! Timestamp derivation
//!
//! `timestamp` (then `ts`) may be epoch milliseconds or a date string.
//! Anything unparseable falls back to the normalization instant, which means
//! the result does not always reflect production time.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::extract::{first_defined, TIMESTAMP_CHAIN};

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Derived timestamp and whether it came from the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivedTimestamp {
    pub ms: i64,
    pub from_source: bool,
}

/// Parse a date string to epoch ms. Strings without an offset are UTC.
pub fn parse_time_str(s: &str) -> Option<i64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.timestamp_millis());
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc().timestamp_millis());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc().timestamp_millis());
    }

    // Epoch milliseconds sent as a string
    s.parse::<i64>().ok()
}

fn parse_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Value::String(s) => parse_time_str(s),
        _ => None,
    }
}

/// Derive the record timestamp from `payload`, substituting `now_ms`
pub fn derive_timestamp(payload: &Value, now_ms: i64) -> DerivedTimestamp {
    match first_defined(payload, TIMESTAMP_CHAIN).and_then(|(_, v)| parse_value(v)) {
        Some(ms) => DerivedTimestamp {
            ms,
            from_source: true,
        },
        None => DerivedTimestamp {
            ms: now_ms,
            from_source: false,
        },
    }
}
