//! Timestamp reconciliation.
//!
//! Agents report instants as epoch seconds, epoch milliseconds, RFC 3339
//! strings, or bare `YYYY-MM-DD HH:MM:SS` text depending on platform and
//! version. Everything funnels through here and comes out as a UTC
//! instant or `None`, so downstream code never sees a format.

use chrono::{DateTime, Datelike, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

/// Instants before this year are treated as sensor noise (uninitialized
/// clocks report the epoch or close to it) and normalized to `None`.
const MIN_VALID_YEAR: i32 = 2000;

/// Numeric values at or above this magnitude are epoch milliseconds;
/// below it they are epoch seconds. The cutoff is far past any second
/// count a live fleet can report.
const MILLIS_CUTOFF: f64 = 1e11;

/// Fallback string formats tried after RFC 3339, interpreted as UTC.
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

/// Normalizes a raw JSON value into a UTC instant.
///
/// Numbers go through the epoch heuristics, strings through
/// [`parse_instant`]. Any other shape is no instant at all.
pub fn normalize_instant(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_f64().and_then(instant_from_epoch),
        Value::String(s) => parse_instant(s),
        _ => None,
    }
}

/// Parses timestamp text into a UTC instant.
///
/// Purely numeric text (an epoch rendered as a string) is routed through
/// the same seconds/milliseconds heuristic as JSON numbers. Everything
/// else is tried as RFC 3339, then as the known naive formats.
pub fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Some(epoch) = numeric_text(trimmed) {
        return instant_from_epoch(epoch);
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return validate(parsed.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return validate(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

/// Renders a duration in seconds the way the dashboard shows uptime:
/// `"3d 4h"`, `"1h 12m"`, or `"42m"` depending on magnitude.
pub fn format_duration(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;
    if days > 0 {
        format!("{}d {}h", days, hours)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}

fn instant_from_epoch(value: f64) -> Option<DateTime<Utc>> {
    let millis = if value.abs() < MILLIS_CUTOFF {
        value * 1000.0
    } else {
        value
    };
    let instant = Utc.timestamp_millis_opt(millis as i64).single()?;
    validate(instant)
}

/// Accepts only text that is an epoch number: optional sign, digits,
/// at most one decimal point. Date strings like `2024-01-15` fall
/// through to the format parsers.
fn numeric_text(s: &str) -> Option<f64> {
    let body = s.strip_prefix('-').unwrap_or(s);
    if body.is_empty() {
        return None;
    }
    let mut dots = 0;
    for b in body.bytes() {
        match b {
            b'0'..=b'9' => {}
            b'.' => dots += 1,
            _ => return None,
        }
    }
    if dots > 1 {
        return None;
    }
    s.parse::<f64>().ok()
}

fn validate(instant: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if instant.year() >= MIN_VALID_YEAR {
        Some(instant)
    } else {
        None
    }
}
