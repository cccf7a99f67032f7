//! Typed coercion of raw dataset values
//!
//! [`coerce`] is total: whatever comes out of a data file, the result is a
//! value of the requested type or [`Value::Null`]. [`coerce_checked`] exposes
//! the reason when a present value could not be converted.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use thiserror::Error;

use super::schema::ColumnType;

/// A cell as read from the dataset, before coercion
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Missing,
    Float(f64),
    Int(i64),
    Text(String),
    Bytes(Vec<u8>),
}

/// A coerced cell
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Float(f64),
    Integer(i64),
    Text(String),
    Timestamp(NaiveDateTime),
    Null,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            Value::Float(_) => Some(ColumnType::Float),
            Value::Integer(_) => Some(ColumnType::Integer),
            Value::Text(_) => Some(ColumnType::Text),
            Value::Timestamp(_) => Some(ColumnType::Timestamp),
            Value::Null => None,
        }
    }
}

/// CSV rendering; null is the empty string
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Float(v) => write!(f, "{}", format_float(*v)),
            Value::Integer(v) => write!(f, "{v}"),
            Value::Text(v) => f.write_str(v),
            Value::Timestamp(ts) => write!(f, "{}", format_timestamp(ts)),
            Value::Null => Ok(()),
        }
    }
}

/// Why a present value could not be coerced
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoercionError {
    #[error("'{input}' is not a valid {target:?}")]
    Unparseable { input: String, target: ColumnType },

    #[error("{input} is out of range for {target:?}")]
    OutOfRange { input: String, target: ColumnType },
}

/// Coerce, mapping every failure to [`Value::Null`]
pub fn coerce(raw: &RawValue, ty: ColumnType) -> Value {
    coerce_checked(raw, ty).unwrap_or(Value::Null)
}

/// Coerce, reporting present-but-invalid input as an error
///
/// Missing, empty and NaN inputs are not errors: they coerce to null.
pub fn coerce_checked(raw: &RawValue, ty: ColumnType) -> Result<Value, CoercionError> {
    let raw = match normalize(raw) {
        Some(raw) => raw,
        None => return Ok(Value::Null),
    };

    match ty {
        ColumnType::Text => Ok(Value::Text(match raw {
            Normalized::Float(v) => format_float(v),
            Normalized::Int(v) => v.to_string(),
            Normalized::Text(s) => s,
        })),
        ColumnType::Float => match raw {
            Normalized::Float(v) => Ok(Value::Float(v)),
            Normalized::Int(v) => Ok(Value::Float(v as f64)),
            Normalized::Text(s) => match s.parse::<f64>() {
                Ok(v) if v.is_nan() => Ok(Value::Null),
                Ok(v) => Ok(Value::Float(v)),
                Err(_) => Err(unparseable(s, ty)),
            },
        },
        ColumnType::Integer => {
            let v = match raw {
                Normalized::Int(v) => return Ok(Value::Integer(v)),
                Normalized::Float(v) => v,
                Normalized::Text(s) => match s.parse::<f64>() {
                    Ok(v) if v.is_nan() => return Ok(Value::Null),
                    Ok(v) => v,
                    Err(_) => return Err(unparseable(s, ty)),
                },
            };
            float_to_i64(v).map(Value::Integer).ok_or(CoercionError::OutOfRange {
                input: v.to_string(),
                target: ty,
            })
        },
        ColumnType::Timestamp => match raw {
            Normalized::Text(s) => parse_timestamp(&s)
                .map(Value::Timestamp)
                .ok_or_else(|| unparseable(s, ty)),
            Normalized::Float(v) => Err(unparseable(format_float(v), ty)),
            Normalized::Int(v) => Err(unparseable(v.to_string(), ty)),
        },
    }
}

fn unparseable(input: String, target: ColumnType) -> CoercionError {
    CoercionError::Unparseable { input, target }
}

enum Normalized {
    Float(f64),
    Int(i64),
    Text(String),
}

/// Decode bytes, strip `b'...'` wrappers and whitespace; `None` means null
fn normalize(raw: &RawValue) -> Option<Normalized> {
    match raw {
        RawValue::Missing => None,
        RawValue::Float(v) if v.is_nan() => None,
        RawValue::Float(v) => Some(Normalized::Float(*v)),
        RawValue::Int(v) => Some(Normalized::Int(*v)),
        RawValue::Text(s) => normalize_text(s),
        RawValue::Bytes(bytes) => normalize_text(&decode_lossy(bytes)),
    }
}

fn normalize_text(s: &str) -> Option<Normalized> {
    let mut text = s.trim();
    if text.len() >= 3 && text.starts_with("b'") && text.ends_with('\'') {
        text = text[2..text.len() - 1].trim();
    }
    let text = text.trim_matches('\0').trim();
    if text.is_empty() {
        None
    } else {
        Some(Normalized::Text(text.to_string()))
    }
}

/// UTF-8 decode that drops invalid sequences instead of replacing them
fn decode_lossy(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        out.push_str(chunk.valid());
    }
    out
}

/// Truncate toward zero; `None` if the result does not fit in an i64
fn float_to_i64(v: f64) -> Option<i64> {
    let t = v.trunc();
    // i64::MAX as f64 rounds up to 2^63, which is itself out of range
    if t.is_finite() && t >= i64::MIN as f64 && t < i64::MAX as f64 {
        Some(t as i64)
    } else {
        None
    }
}

fn format_float(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e16 {
        format!("{v:.1}")
    } else {
        v.to_string()
    }
}

/// Canonical timestamp form, microseconds only when present
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    if ts.and_utc().timestamp_subsec_nanos() == 0 {
        ts.format("%Y-%m-%dT%H:%M:%S").to_string()
    } else {
        ts.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
    }
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Permissive timestamp parsing; offsets are normalized to UTC
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.naive_utc());
    }
    if let Some(ts) = parse_compact(s) {
        return Some(ts);
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ts);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// ARGO `YYYYMMDDHHMISS` and `YYYYMMDD`
fn parse_compact(s: &str) -> Option<NaiveDateTime> {
    if !s.bytes().all(|b| b.is_ascii_digit()) || !(s.len() == 14 || s.len() == 8) {
        return None;
    }
    let num = |range: std::ops::Range<usize>| s.get(range)?.parse::<u32>().ok();
    let year = s.get(0..4)?.parse::<i32>().ok()?;
    let date = NaiveDate::from_ymd_opt(year, num(4..6)?, num(6..8)?)?;
    if s.len() == 8 {
        date.and_hms_opt(0, 0, 0)
    } else {
        date.and_hms_opt(num(8..10)?, num(10..12)?, num(12..14)?)
    }
}
