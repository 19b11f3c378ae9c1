//! Restricted expressions for computed transform fields.
//!
//! An expression is data, not code: a tree of field references, literals,
//! and binary operators, evaluated against one row at a time.
//!
//! ```json
//! {"op": "multiply", "left": {"field": "price"}, "right": {"literal": 1.2}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ProcessingError;
use crate::types::Row;
use crate::value::{as_number, display, field, number_value};

/// Maximum nesting accepted by [`Expr::validate`].
pub const MAX_DEPTH: usize = 32;

/// Binary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    /// `left + right`
    Add,
    /// `left - right`
    Subtract,
    /// `left * right`
    Multiply,
    /// `left / right`
    Divide,
    /// `left % right`
    Modulo,
    /// Text of `left` followed by text of `right`.
    Concat,
}

/// Expression node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expr {
    /// Value of a field in the current row; null when absent.
    Field {
        /// Field name.
        field: String,
    },
    /// Constant.
    Literal {
        /// The value.
        literal: Value,
    },
    /// Operator applied to two sub-expressions.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
}

impl Expr {
    /// Field reference.
    pub fn field(name: impl Into<String>) -> Self {
        Self::Field { field: name.into() }
    }

    /// Constant.
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal {
            literal: value.into(),
        }
    }

    /// `left <op> right`.
    pub fn binary(op: BinaryOp, left: Self, right: Self) -> Self {
        Self::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Reject trees nested deeper than [`MAX_DEPTH`].
    pub fn validate(&self) -> Result<(), ProcessingError> {
        if self.depth() > MAX_DEPTH {
            return Err(ProcessingError::options(format!(
                "expression nested deeper than {MAX_DEPTH} levels"
            )));
        }
        Ok(())
    }

    fn depth(&self) -> usize {
        match self {
            Self::Field { .. } | Self::Literal { .. } => 1,
            Self::Binary { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }

    /// Evaluate against `row`.
    ///
    /// Arithmetic with a null operand yields null. Arithmetic on any other
    /// non-number, or division by zero, is an error.
    pub fn eval(&self, row: &Row) -> Result<Value, ProcessingError> {
        match self {
            Self::Field { field: name } => Ok(field(row, name).clone()),
            Self::Literal { literal } => Ok(literal.clone()),
            Self::Binary { op, left, right } => {
                let left = left.eval(row)?;
                let right = right.eval(row)?;
                apply(*op, &left, &right)
            }
        }
    }
}

fn apply(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, ProcessingError> {
    let text = |v: &Value| if v.is_null() { String::new() } else { display(v) };
    match op {
        BinaryOp::Concat => Ok(Value::String(text(left) + &text(right))),
        _ if left.is_null() || right.is_null() => Ok(Value::Null),
        BinaryOp::Add => numeric(op, left, right, |a, b| Ok(a + b)),
        BinaryOp::Subtract => numeric(op, left, right, |a, b| Ok(a - b)),
        BinaryOp::Multiply => numeric(op, left, right, |a, b| Ok(a * b)),
        BinaryOp::Divide => numeric(op, left, right, |a, b| nonzero(b).map(|b| a / b)),
        BinaryOp::Modulo => numeric(op, left, right, |a, b| nonzero(b).map(|b| a % b)),
    }
}

fn numeric(
    op: BinaryOp,
    left: &Value,
    right: &Value,
    f: impl FnOnce(f64, f64) -> Result<f64, ProcessingError>,
) -> Result<Value, ProcessingError> {
    let (Some(a), Some(b)) = (as_number(left), as_number(right)) else {
        return Err(ProcessingError::Expression(format!(
            "{op:?} needs numbers, got {left} and {right}"
        )));
    };
    f(a, b).map(number_value)
}

fn nonzero(divisor: f64) -> Result<f64, ProcessingError> {
    if divisor == 0.0 {
        return Err(ProcessingError::Expression("division by zero".into()));
    }
    Ok(divisor)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
