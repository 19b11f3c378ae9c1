//! `aggregate`: one output row for the whole input, or one per group.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::errors::ProcessingError;
use crate::types::Row;
use crate::value::{as_number, display, field, number_value};

/// Aggregate function applied to one field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFn {
    /// Sum of numeric values; 0 when there are none.
    Sum,
    /// Mean of numeric values; null when there are none.
    Avg,
    /// Smallest numeric value; null when there are none.
    Min,
    /// Largest numeric value; null when there are none.
    Max,
    /// Number of non-null values.
    Count,
}

/// Options for `aggregate`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateOptions {
    /// Field to partition by.
    #[serde(default)]
    pub group_by: Option<String>,
    /// Output field to function.
    #[serde(default)]
    pub aggregations: Map<String, Value>,
}

/// Always returns an array: one row without `groupBy`, one per group with
/// it, groups in order of first appearance.
pub fn run(rows: &[Row], options: &AggregateOptions) -> Result<Value, ProcessingError> {
    let aggregations = options
        .aggregations
        .iter()
        .map(|(name, function)| {
            serde_json::from_value::<AggregateFn>(function.clone())
                .map(|f| (name.as_str(), f))
                .map_err(|_| ProcessingError::options(format!("unknown aggregation {function} for {name}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let Some(group_by) = options.group_by.as_deref() else {
        let all: Vec<&Row> = rows.iter().collect();
        return Ok(Value::Array(vec![Value::Object(summarize(&all, &aggregations))]));
    };

    let mut order: Vec<(Value, Vec<&Row>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for row in rows {
        let key = field(row, group_by);
        let slot = *index.entry(display(key)).or_insert_with(|| {
            order.push((key.clone(), Vec::new()));
            order.len() - 1
        });
        order[slot].1.push(row);
    }

    let output = order
        .into_iter()
        .map(|(key, members)| {
            let mut out = Map::new();
            let _ = out.insert(group_by.to_owned(), key);
            out.extend(summarize(&members, &aggregations));
            Value::Object(out)
        })
        .collect();
    Ok(Value::Array(output))
}

fn summarize(rows: &[&Row], aggregations: &[(&str, AggregateFn)]) -> Map<String, Value> {
    aggregations
        .iter()
        .map(|&(name, function)| (name.to_owned(), apply(rows, name, function)))
        .collect()
}

#[allow(clippy::cast_precision_loss)]
fn apply(rows: &[&Row], name: &str, function: AggregateFn) -> Value {
    if function == AggregateFn::Count {
        let count = rows.iter().filter(|row| !field(row, name).is_null()).count();
        return Value::from(count);
    }
    let numbers: Vec<f64> = rows.iter().filter_map(|row| as_number(field(row, name))).collect();
    let result = match function {
        AggregateFn::Sum => Some(numbers.iter().sum::<f64>()),
        AggregateFn::Avg if numbers.is_empty() => None,
        AggregateFn::Avg => Some(numbers.iter().sum::<f64>() / numbers.len() as f64),
        AggregateFn::Min => numbers.iter().copied().reduce(f64::min),
        AggregateFn::Max => numbers.iter().copied().reduce(f64::max),
        AggregateFn::Count => None,
    };
    result.map_or(Value::Null, number_value)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn rows(value: Value) -> Vec<Row> {
        serde_json::from_value(value).unwrap()
    }

    fn options(value: Value) -> AggregateOptions {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn grouped_sum() {
        let data = rows(json!([
            {"category": "a", "amount": 10},
            {"category": "a", "amount": 5},
            {"category": "b", "amount": 3}
        ]));
        let result = run(&data, &options(json!({"groupBy": "category", "aggregations": {"amount": "sum"}})));
        assert_eq!(
            result.unwrap(),
            json!([{"category": "a", "amount": 15}, {"category": "b", "amount": 3}])
        );
    }

    #[test]
    fn whole_input_functions() {
        let data = rows(json!([
            {"v": 4, "w": "x"},
            {"v": 1.5, "w": null},
            {"v": "n/a"},
            {"v": null, "w": "y"}
        ]));
        let result = run(
            &data,
            &options(json!({"aggregations": {"v": "avg", "w": "count"}})),
        )
        .unwrap();
        assert_eq!(result, json!([{"v": 2.75, "w": 2}]));

        for (function, expected) in [("sum", json!(5.5)), ("min", json!(1.5)), ("max", json!(4)), ("count", json!(3))] {
            let result = run(&data, &options(json!({"aggregations": {"v": function}}))).unwrap();
            assert_eq!(result[0]["v"], expected, "{function}");
        }
    }

    #[test]
    fn no_numbers() {
        let data = rows(json!([{"v": "x"}]));
        let result = run(
            &data,
            &options(json!({"aggregations": {"v": "avg"}})),
        )
        .unwrap();
        assert_eq!(result, json!([{"v": null}]));
        let sum = run(&data, &options(json!({"aggregations": {"v": "sum"}}))).unwrap();
        assert_eq!(sum, json!([{"v": 0}]));
    }

    #[test]
    fn groups_by_text_form_and_keeps_first_key() {
        let data = rows(json!([
            {"k": 1, "n": 1},
            {"k": "1", "n": 2},
            {"n": 4},
            {"k": null, "n": 8}
        ]));
        let result = run(&data, &options(json!({"groupBy": "k", "aggregations": {"n": "sum"}}))).unwrap();
        assert_eq!(result, json!([{"k": 1, "n": 3}, {"k": null, "n": 12}]));
    }

    #[test]
    fn empty_input() {
        let grouped = run(&[], &options(json!({"groupBy": "k", "aggregations": {"n": "count"}}))).unwrap();
        assert_eq!(grouped, json!([]));
        let whole = run(&[], &options(json!({"aggregations": {"n": "count"}}))).unwrap();
        assert_eq!(whole, json!([{"n": 0}]));
    }

    #[test]
    fn unknown_function() {
        let result = run(&[], &options(json!({"aggregations": {"n": "median"}})));
        assert_matches!(result, Err(ProcessingError::InvalidOptions(_)));
    }
}
