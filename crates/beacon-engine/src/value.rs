//! Comparison and coercion rules shared by the operations.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Number, Value};

use crate::types::Row;

/// Field value of `row`, treating a missing field as null.
pub fn field<'a>(row: &'a Row, name: &str) -> &'a Value {
    row.get(name).unwrap_or(&Value::Null)
}

/// Numeric value of a JSON number. Strings and other types are not numbers.
pub fn as_number(value: &Value) -> Option<f64> {
    value.as_f64().filter(|n| n.is_finite())
}

/// JSON value for `n`, as an integer when it has no fractional part.
///
/// Non-finite results become null.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn number_value(n: f64) -> Value {
    if !n.is_finite() {
        return Value::Null;
    }
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return Value::Number(Number::from(n as i64));
    }
    Number::from_f64(n).map_or(Value::Null, Value::Number)
}

/// Text form used for grouping, searching, and string comparison.
///
/// Strings are used as-is; integral numbers drop their fraction so `1` and
/// `1.0` read the same.
pub fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(_) => match as_number(value).map(number_value) {
            Some(Value::Number(n)) => n.to_string(),
            _ => value.to_string(),
        },
        other => other.to_string(),
    }
}

/// Equality used by `equals`, `in`, and grouping.
///
/// Numbers compare numerically; a string and a scalar compare by text.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => as_number(a) == as_number(b),
        (Value::String(s), Value::Number(_) | Value::Bool(_))
        | (Value::Number(_) | Value::Bool(_), Value::String(s)) => {
            let other = if a.is_string() { b } else { a };
            *s == display(other)
        }
        _ => a == b,
    }
}

/// Instant for strings that look like an RFC 3339 timestamp or a date.
pub fn as_instant(value: &Value) -> Option<DateTime<Utc>> {
    let text = value.as_str()?.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Sort key of a defined value. Variants are declared in ascending order.
#[derive(Debug, PartialEq)]
enum Key {
    Number(f64),
    Instant(DateTime<Utc>),
    Text(String),
}

impl Key {
    fn of(value: &Value) -> Self {
        if let Some(n) = as_number(value) {
            Self::Number(n)
        } else if let Some(at) = as_instant(value) {
            Self::Instant(at)
        } else {
            Self::Text(display(value).to_lowercase())
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Number(_) => 0,
            Self::Instant(_) => 1,
            Self::Text(_) => 2,
        }
    }
}

/// Order of two defined values: numbers numerically, dates by instant,
/// everything else as case-insensitive text.
///
/// Values of different kinds order as number, then date, then text, so a
/// mixed column still sorts the same way whatever its input order.
pub fn compare(a: &Value, b: &Value) -> Ordering {
    match (Key::of(a), Key::of(b)) {
        (Key::Number(x), Key::Number(y)) => x.total_cmp(&y),
        (Key::Instant(x), Key::Instant(y)) => x.cmp(&y),
        (Key::Text(x), Key::Text(y)) => x.cmp(&y),
        (x, y) => x.rank().cmp(&y.rank()),
    }
}

/// Whether `a` and `b` are the same kind of value under [`compare`].
pub fn same_kind(a: &Value, b: &Value) -> bool {
    Key::of(a).rank() == Key::of(b).rank()
}

/// Order with null first.
pub fn compare_nullable(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => compare(a, b),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
