//! `transform`: field edits applied in order.
//!
//! Each step sees the rows as left by the previous one. Computed values come
//! from an [`Expr`]; a step without one uses its literal `value`.

use serde::Deserialize;
use serde_json::Value;

use super::rows_value;
use crate::errors::ProcessingError;
use crate::expr::Expr;
use crate::types::Row;

/// Kind of edit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    /// Set `field` on every row.
    AddField,
    /// Replace `field` on rows that have it.
    ModifyField,
    /// Delete `field`.
    RemoveField,
    /// Move `field` to `newField`.
    RenameField,
}

/// One edit.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transformation {
    /// Kind of edit.
    #[serde(rename = "type")]
    pub kind: TransformKind,
    /// Field the edit targets.
    pub field: String,
    /// Destination for `rename_field`.
    #[serde(default)]
    pub new_field: Option<String>,
    /// Per-row expression for `add_field` and `modify_field`.
    #[serde(default)]
    pub operation: Option<Expr>,
    /// Constant for `add_field` and `modify_field` when there is no expression.
    #[serde(default)]
    pub value: Value,
}

/// Options for `transform`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct TransformOptions {
    /// Edits in application order.
    #[serde(default)]
    pub transformations: Vec<Transformation>,
}

/// Apply every transformation to every row.
pub fn run(mut rows: Vec<Row>, options: &TransformOptions) -> Result<Value, ProcessingError> {
    for step in &options.transformations {
        if let Some(expr) = &step.operation {
            expr.validate()?;
        }
        apply(step, &mut rows)?;
    }
    Ok(rows_value(rows))
}

fn apply(step: &Transformation, rows: &mut [Row]) -> Result<(), ProcessingError> {
    match step.kind {
        TransformKind::AddField => {
            for row in rows {
                let value = computed(step, row)?;
                let _ = row.insert(step.field.clone(), value);
            }
        }
        TransformKind::ModifyField => {
            for row in rows.iter_mut().filter(|row| row.contains_key(&step.field)) {
                let value = computed(step, row)?;
                let _ = row.insert(step.field.clone(), value);
            }
        }
        TransformKind::RemoveField => {
            for row in rows {
                let _ = row.remove(&step.field);
            }
        }
        TransformKind::RenameField => {
            let Some(new_field) = step.new_field.as_deref().filter(|f| !f.is_empty()) else {
                return Err(ProcessingError::options(format!(
                    "rename_field on {} needs newField",
                    step.field
                )));
            };
            for row in rows {
                if let Some(value) = row.remove(&step.field) {
                    let _ = row.insert(new_field.to_owned(), value);
                }
            }
        }
    }
    Ok(())
}

fn computed(step: &Transformation, row: &Row) -> Result<Value, ProcessingError> {
    match &step.operation {
        Some(expr) => expr.eval(row),
        None => Ok(step.value.clone()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
