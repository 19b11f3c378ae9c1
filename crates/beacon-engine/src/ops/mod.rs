//! The five row operations.
//!
//! Each takes the request's rows by value and its options as JSON, and
//! returns the result value. Options are deserialized per operation; a null
//! `options` reads as an empty object.

pub mod aggregate;
pub mod analyze;
pub mod filter;
pub mod sort;
pub mod transform;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::errors::ProcessingError;
use crate::types::{Operation, Row};

/// Run `operation` over `rows`.
pub fn run(operation: Operation, rows: Vec<Row>, options: &Value) -> Result<Value, ProcessingError> {
    match operation {
        Operation::Aggregate => aggregate::run(&rows, &parse_options(options)?),
        Operation::Filter => filter::run(rows, &parse_options(options)?),
        Operation::Sort => sort::run(rows, &parse_options(options)?),
        Operation::Transform => transform::run(rows, &parse_options(options)?),
        Operation::Analyze => analyze::run(&rows, &parse_options(options)?),
    }
}

fn parse_options<T: DeserializeOwned>(options: &Value) -> Result<T, ProcessingError> {
    let value = match options {
        Value::Null => Value::Object(Map::new()),
        other => other.clone(),
    };
    Ok(serde_json::from_value(value)?)
}

fn rows_value(rows: Vec<Row>) -> Value {
    Value::Array(rows.into_iter().map(Value::Object).collect())
}
