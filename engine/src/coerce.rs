//! Per-type cell coercions.
//!
//! Every function here returns `None` for a missing cell (null or NaN) and for
//! any value that cannot be converted. None of them fail loudly: an
//! unconvertible value just means the field is left out of the document.

use crate::snapshot::Cell;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Stringify any present value.
pub fn to_string(cell: &Cell) -> Option<String> {
    if cell.is_missing() {
        return None;
    }
    match cell {
        Cell::Null => None,
        Cell::Bool(b) => Some(if *b { "True" } else { "False" }.to_string()),
        Cell::Int(i) => Some(i.to_string()),
        Cell::Float(f) => Some(format_float(*f)),
        Cell::Text(s) => Some(s.clone()),
        Cell::Timestamp(ts) => Some(ts.to_rfc3339()),
        Cell::Object(map) => serde_json::to_string(map).ok(),
        Cell::List(items) => serde_json::to_string(items).ok(),
    }
}

/// Like [`to_string`], but blank strings count as missing.
pub fn to_text(cell: &Cell) -> Option<String> {
    to_string(cell).filter(|s| !s.trim().is_empty())
}

/// Integral values keep their value, floats truncate toward zero, booleans
/// become 1/0 and numeric strings are parsed.
pub fn to_int(cell: &Cell) -> Option<i64> {
    match cell {
        Cell::Int(i) => Some(*i),
        Cell::Bool(b) => Some(i64::from(*b)),
        Cell::Float(f) => float_to_int(*f),
        Cell::Text(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Numbers and numeric strings become finite floats.
pub fn to_float(cell: &Cell) -> Option<f64> {
    let value = match cell {
        Cell::Float(f) => *f,
        Cell::Int(i) => *i as f64,
        Cell::Bool(b) => f64::from(u8::from(*b)),
        Cell::Text(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    value.is_finite().then_some(value)
}

/// Truthiness of any present value.
///
/// Strings are true when non-empty, whatever they say: `"false"` is `true`.
pub fn to_bool(cell: &Cell) -> Option<bool> {
    if cell.is_missing() {
        return None;
    }
    match cell {
        Cell::Null => None,
        Cell::Bool(b) => Some(*b),
        Cell::Int(i) => Some(*i != 0),
        Cell::Float(f) => Some(*f != 0.0),
        Cell::Text(s) => Some(!s.is_empty()),
        Cell::Timestamp(_) => Some(true),
        Cell::Object(map) => Some(!map.is_empty()),
        Cell::List(items) => Some(!items.is_empty()),
    }
}

/// Native timestamps pass through; strings are parsed with
/// [`parse_timestamp`]; everything else is dropped.
pub fn to_timestamp(cell: &Cell) -> Option<DateTime<Utc>> {
    match cell {
        Cell::Timestamp(ts) => Some(*ts),
        Cell::Text(s) => parse_timestamp(s),
        _ => None,
    }
}

/// Parse the date/time notations found in exports.
///
/// Accepts RFC 3339, `YYYY-MM-DD[ T]HH:MM[:SS[.f]]` with or without a UTC
/// offset, and bare dates. Values without an offset are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    for fmt in OFFSET_FORMATS {
        if let Ok(ts) = DateTime::parse_from_str(raw, fmt) {
            return Some(ts.with_timezone(&Utc));
        }
    }

    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return date
                .and_hms_opt(0, 0, 0)
                .map(|naive| Utc.from_utc_datetime(&naive));
        }
    }

    None
}

/// Non-empty mapping, either native or JSON-encoded text.
pub fn to_object(cell: &Cell) -> Option<Map<String, Value>> {
    match cell {
        Cell::Object(map) if !map.is_empty() => Some(map.clone()),
        Cell::Text(s) => match decode_json(s)? {
            Value::Object(map) if !map.is_empty() => Some(map),
            _ => None,
        },
        _ => None,
    }
}

/// Non-empty sequence, either native or JSON-encoded text.
pub fn to_list(cell: &Cell) -> Option<Vec<Value>> {
    match cell {
        Cell::List(items) if !items.is_empty() => Some(items.clone()),
        Cell::Text(s) => match decode_json(s)? {
            Value::Array(items) if !items.is_empty() => Some(items),
            _ => None,
        },
        _ => None,
    }
}

fn decode_json(raw: &str) -> Option<Value> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    serde_json::from_str(raw).ok()
}

fn float_to_int(f: f64) -> Option<i64> {
    if !f.is_finite() {
        return None;
    }
    let truncated = f.trunc();
    // i64::MAX is not representable as f64; the first float past it is 2^63.
    if truncated >= -(2f64.powi(63)) && truncated < 2f64.powi(63) {
        Some(truncated as i64)
    } else {
        None
    }
}

/// Integral floats keep one decimal place (`3.0`), others use the shortest
/// round-trip form.
fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}
