//! Common types used throughout hubspot-sync
//!
//! This module contains shared type definitions, type aliases,
//! and the timestamp helpers used to derive replication values.

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

// ============================================================================
// Type Aliases
// ============================================================================

/// Query parameters, kept ordered so requests are reproducible
pub type QueryParams = std::collections::BTreeMap<String, String>;

// ============================================================================
// Replication Method
// ============================================================================

/// How a stream's table is materialized downstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplicationMethod {
    /// Append changed records, resume from a bookmark
    #[default]
    Incremental,
    /// Replace the whole table every run
    FullTable,
}

impl fmt::Display for ReplicationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incremental => write!(f, "INCREMENTAL"),
            Self::FullTable => write!(f, "FULL_TABLE"),
        }
    }
}

// ============================================================================
// Failure Policy
// ============================================================================

/// What to do when a stream fails with an unclassified error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the run at the first failing stream
    #[default]
    Abort,
    /// Log the failure and continue with the next stream
    Skip,
}

// ============================================================================
// Backoff Type
// ============================================================================

/// Type of backoff for retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffType {
    /// Constant delay between retries
    Constant,
    /// Linear increase in delay
    Linear,
    /// Exponential increase in delay
    #[default]
    Exponential,
}

// ============================================================================
// Extraction Window
// ============================================================================

/// Half-open time interval `[start, end)` extracted in one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionWindow {
    /// Inclusive lower bound
    pub start: DateTime<Utc>,
    /// Exclusive upper bound
    pub end: DateTime<Utc>,
}

impl ExtractionWindow {
    /// Create a new window
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Lower bound in epoch milliseconds
    pub fn start_ms(&self) -> i64 {
        self.start.timestamp_millis()
    }

    /// Upper bound in epoch milliseconds
    pub fn end_ms(&self) -> i64 {
        self.end.timestamp_millis()
    }

    /// Whether `ts` falls in `[start, end)`
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }

    /// Whether `ts` falls in `(start, end]`.
    ///
    /// Activity timestamps are compared against the window this way: an
    /// entity touched exactly at the previous run's high-water mark was
    /// already picked up by that run.
    pub fn contains_activity(&self, ts: DateTime<Utc>) -> bool {
        ts > self.start && ts <= self.end
    }
}

// ============================================================================
// Replication Values
// ============================================================================

/// Walk a field path through nested objects.
///
/// Missing fields, `null` and empty strings are all treated as absent.
pub fn value_at_path<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    let mut current = value;
    for part in path {
        current = current.as_object()?.get(*part)?;
    }
    match current {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        other => Some(other),
    }
}

/// String form of the value at `path`, if it is a string or number
pub fn string_at_path(value: &Value, path: &[&str]) -> Option<String> {
    match value_at_path(value, path)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Interpret a JSON value as a timestamp.
///
/// Upstream uses two encodings for the same kind of field: epoch
/// milliseconds (as a number or a digit string) and ISO-8601 strings.
pub fn parse_replication_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_i64().and_then(from_millis),
        Value::String(s) => parse_timestamp(s).ok(),
        _ => None,
    }
}

/// Extract and decode the replication value at `path`
pub fn replication_value_at(record: &Value, path: &[&str]) -> Option<DateTime<Utc>> {
    value_at_path(record, path).and_then(parse_replication_value)
}

/// Parse a timestamp string in either epoch-millisecond or ISO-8601 form
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    let invalid = || Error::InvalidTimestamp {
        value: raw.to_string(),
    };

    if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
        let ms: i64 = raw.parse().map_err(|_| invalid())?;
        return from_millis(ms).ok_or_else(invalid);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Naive datetimes are taken to be UTC
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    Err(invalid())
}

/// Convert epoch milliseconds to a UTC datetime
pub fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

/// Format a timestamp the way bookmarks are stored
pub fn format_bookmark(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Micros, false)
}
