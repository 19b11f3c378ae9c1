//! `filter`: ordered predicates joined with AND, plus an optional search term.

use std::cmp::Ordering;

use serde::Deserialize;
use serde_json::Value;

use super::rows_value;
use crate::errors::ProcessingError;
use crate::types::Row;
use crate::value::{compare, display, field, loose_eq, same_kind};

/// Comparison applied by one predicate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Loose equality.
    Equals,
    /// Negated loose equality.
    NotEquals,
    /// Field orders after the value.
    GreaterThan,
    /// Field orders before the value.
    LessThan,
    /// Field orders after or with the value.
    GreaterEqual,
    /// Field orders before or with the value.
    LessEqual,
    /// Case-insensitive substring.
    Contains,
    /// Case-insensitive prefix.
    StartsWith,
    /// Case-insensitive suffix.
    EndsWith,
    /// Field equals one of the listed values.
    In,
    /// Field equals none of the listed values.
    NotIn,
}

/// One `{field, operator, value}` predicate.
#[derive(Clone, Debug, Deserialize)]
pub struct Predicate {
    /// Field to test.
    pub field: String,
    /// Comparison.
    pub operator: Operator,
    /// Operand; a list for `in` and `not_in`.
    #[serde(default)]
    pub value: Value,
}

/// Options for `filter`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOptions {
    /// Predicates, all of which must hold.
    #[serde(default)]
    pub filters: Vec<Predicate>,
    /// Text that must occur in one of the search fields.
    #[serde(default)]
    pub search_term: Option<String>,
    /// Fields searched for the term; every field when empty.
    #[serde(default)]
    pub search_fields: Vec<String>,
}

/// Keep the rows that pass every predicate and the search term, in order.
pub fn run(rows: Vec<Row>, options: &FilterOptions) -> Result<Value, ProcessingError> {
    for predicate in &options.filters {
        if matches!(predicate.operator, Operator::In | Operator::NotIn) && !predicate.value.is_array() {
            return Err(ProcessingError::options(format!(
                "{:?} on {} needs a list value",
                predicate.operator, predicate.field
            )));
        }
    }
    let term = options
        .search_term
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase);

    let kept = rows
        .into_iter()
        .filter(|row| options.filters.iter().all(|p| holds(p, row)))
        .filter(|row| term.as_deref().is_none_or(|t| matches_term(row, t, &options.search_fields)))
        .collect();
    Ok(rows_value(kept))
}

fn holds(predicate: &Predicate, row: &Row) -> bool {
    let actual = field(row, &predicate.field);
    let expected = &predicate.value;
    let ordered = |accept: fn(Ordering) -> bool| {
        !actual.is_null()
            && !expected.is_null()
            && same_kind(actual, expected)
            && accept(compare(actual, expected))
    };
    let text = |test: fn(&str, &str) -> bool| {
        !actual.is_null() && test(&display(actual).to_lowercase(), &display(expected).to_lowercase())
    };
    let listed = || {
        expected
            .as_array()
            .is_some_and(|values| values.iter().any(|v| loose_eq(actual, v)))
    };

    match predicate.operator {
        Operator::Equals => loose_eq(actual, expected),
        Operator::NotEquals => !loose_eq(actual, expected),
        Operator::GreaterThan => ordered(Ordering::is_gt),
        Operator::LessThan => ordered(Ordering::is_lt),
        Operator::GreaterEqual => ordered(Ordering::is_ge),
        Operator::LessEqual => ordered(Ordering::is_le),
        Operator::Contains => text(|a, b| a.contains(b)),
        Operator::StartsWith => text(|a, b| a.starts_with(b)),
        Operator::EndsWith => text(|a, b| a.ends_with(b)),
        Operator::In => listed(),
        Operator::NotIn => !listed(),
    }
}

fn matches_term(row: &Row, term: &str, fields: &[String]) -> bool {
    let hit = |value: &Value| !value.is_null() && display(value).to_lowercase().contains(term);
    if fields.is_empty() {
        row.values().any(hit)
    } else {
        fields.iter().any(|name| hit(field(row, name)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
