//! `sort`: stable single-key ordering.

use serde::Deserialize;
use serde_json::Value;

use super::rows_value;
use crate::errors::ProcessingError;
use crate::types::Row;
use crate::value::{compare_nullable, field};

/// Direction of a sort.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Smallest first, nulls first.
    #[default]
    Asc,
    /// Largest first, nulls last.
    Desc,
}

/// Options for `sort`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortOptions {
    /// Field to sort by.
    #[serde(default)]
    pub sort_by: Option<String>,
    /// Direction, ascending by default.
    #[serde(default)]
    pub sort_order: SortOrder,
}

/// Rows ordered by `sortBy`; rows with equal keys keep their input order.
pub fn run(mut rows: Vec<Row>, options: &SortOptions) -> Result<Value, ProcessingError> {
    let Some(key) = options.sort_by.as_deref() else {
        return Err(ProcessingError::options("sortBy is required"));
    };
    rows.sort_by(|a, b| {
        let order = compare_nullable(field(a, key), field(b, key));
        match options.sort_order {
            SortOrder::Asc => order,
            SortOrder::Desc => order.reverse(),
        }
    });
    Ok(rows_value(rows))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
