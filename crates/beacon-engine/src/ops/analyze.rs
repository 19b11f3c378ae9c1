//! `analyze`: per-field profile.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::errors::ProcessingError;
use crate::types::Row;
use crate::value::{as_number, field, number_value};

/// How many most-frequent values are reported per field.
pub const TOP_VALUES: usize = 10;

/// Options for `analyze`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AnalyzeOptions {
    /// Fields to profile, in output order.
    #[serde(default)]
    pub fields: Vec<String>,
}

/// Object keyed by field name.
///
/// Each profile has `total`, `nullCount`, `uniqueCount`, and `topValues`;
/// `numeric` appears when the field holds numbers and `text` when it holds
/// strings.
pub fn run(rows: &[Row], options: &AnalyzeOptions) -> Result<Value, ProcessingError> {
    if options.fields.is_empty() {
        return Err(ProcessingError::options("fields must name at least one field"));
    }
    let profiles = options
        .fields
        .iter()
        .map(|name| (name.clone(), profile(rows, name)))
        .collect::<Map<_, _>>();
    Ok(Value::Object(profiles))
}

fn profile(rows: &[Row], name: &str) -> Value {
    let values: Vec<&Value> = rows.iter().map(|row| field(row, name)).collect();
    let present: Vec<&Value> = values.iter().copied().filter(|v| !v.is_null()).collect();

    // Distinct values in first-seen order with their counts.
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut distinct: Vec<(&Value, usize)> = Vec::new();
    for &value in &present {
        match seen.get(&value.to_string()) {
            Some(&slot) => distinct[slot].1 += 1,
            None => {
                let _ = seen.insert(value.to_string(), distinct.len());
                distinct.push((value, 1));
            }
        }
    }

    let mut out = Map::new();
    let _ = out.insert("total".into(), Value::from(values.len()));
    let _ = out.insert("nullCount".into(), Value::from(values.len() - present.len()));
    let _ = out.insert("uniqueCount".into(), Value::from(distinct.len()));

    let numbers: Vec<f64> = present.iter().filter_map(|v| as_number(v)).collect();
    if !numbers.is_empty() {
        let _ = out.insert("numeric".into(), numeric_stats(numbers));
    }
    let lengths: Vec<usize> = present
        .iter()
        .filter_map(|v| v.as_str())
        .map(|s| s.chars().count())
        .collect();
    if !lengths.is_empty() {
        let _ = out.insert("text".into(), text_stats(&lengths));
    }

    // Stable: equal counts keep first-seen order.
    distinct.sort_by(|a, b| b.1.cmp(&a.1));
    let top: Vec<Value> = distinct
        .into_iter()
        .take(TOP_VALUES)
        .map(|(value, count)| json!({"value": value, "count": count}))
        .collect();
    let _ = out.insert("topValues".into(), Value::Array(top));
    Value::Object(out)
}

#[allow(clippy::cast_precision_loss)]
fn numeric_stats(mut numbers: Vec<f64>) -> Value {
    numbers.sort_by(f64::total_cmp);
    let n = numbers.len();
    let sum: f64 = numbers.iter().sum();
    let median = if n % 2 == 0 {
        (numbers[n / 2 - 1] + numbers[n / 2]) / 2.0
    } else {
        numbers[n / 2]
    };
    json!({
        "min": number_value(numbers[0]),
        "max": number_value(numbers[n - 1]),
        "avg": number_value(sum / n as f64),
        "median": number_value(median),
    })
}

#[allow(clippy::cast_precision_loss)]
fn text_stats(lengths: &[usize]) -> Value {
    let total: usize = lengths.iter().sum();
    json!({
        "avgLength": number_value(total as f64 / lengths.len() as f64),
        "minLength": lengths.iter().min(),
        "maxLength": lengths.iter().max(),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
