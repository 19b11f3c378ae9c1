//! Work request and response messages.
//!
//! Both are owned, serializable values: a request is moved onto a worker
//! thread and its response is moved back. Nothing is shared with the caller
//! while an operation runs.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::ProcessingError;

/// One input record: field name to value.
pub type Row = Map<String, Value>;

/// Operation a request asks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Grouped or whole-input aggregates.
    Aggregate,
    /// Predicate and search-term filtering.
    Filter,
    /// Stable single-key sort.
    Sort,
    /// Sequential field edits.
    Transform,
    /// Per-field statistics.
    Analyze,
}

impl Operation {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Aggregate => "aggregate",
            Self::Filter => "filter",
            Self::Sort => "sort",
            Self::Transform => "transform",
            Self::Analyze => "analyze",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work, answered by exactly one [`WorkResponse`] with the same id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkRequest {
    /// Caller-chosen id echoed in the response.
    pub id: String,
    /// Operation to run.
    #[serde(rename = "type")]
    pub operation: Operation,
    /// Input rows, in order.
    #[serde(default)]
    pub data: Vec<Row>,
    /// Operation-specific options.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub options: Value,
}

impl WorkRequest {
    /// Build a request.
    pub fn new(id: impl Into<String>, operation: Operation, data: Vec<Row>, options: Value) -> Self {
        Self {
            id: id.into(),
            operation,
            data,
            options,
        }
    }
}

/// Outcome of one [`WorkRequest`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkResponse {
    /// Id of the request this answers.
    pub id: String,
    /// Whether the operation produced a result.
    pub success: bool,
    /// Result value on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error text on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Time spent processing, in milliseconds.
    pub processing_time: f64,
}

impl WorkResponse {
    /// Successful response.
    pub fn success(id: impl Into<String>, result: Value, elapsed: Duration) -> Self {
        Self {
            id: id.into(),
            success: true,
            result: Some(result),
            error: None,
            processing_time: millis(elapsed),
        }
    }

    /// Failed response carrying `error`'s message.
    pub fn failure(id: impl Into<String>, error: &ProcessingError, elapsed: Duration) -> Self {
        Self {
            id: id.into(),
            success: false,
            result: None,
            error: Some(error.to_string()),
            processing_time: millis(elapsed),
        }
    }

    /// The result, or the error text.
    pub fn into_result(self) -> Result<Value, String> {
        match (self.success, self.result, self.error) {
            (true, result, _) => Ok(result.unwrap_or(Value::Null)),
            (false, _, error) => Err(error.unwrap_or_default()),
        }
    }
}

fn millis(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1_000.0
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_from_wire() {
        let request: WorkRequest = serde_json::from_value(json!({
            "id": "r-1",
            "type": "sort",
            "data": [{"v": 2}, {"v": 1}],
            "options": {"sortBy": "v"}
        }))
        .unwrap();
        assert_eq!(request.operation, Operation::Sort);
        assert_eq!(request.data.len(), 2);
        assert_eq!(request.options["sortBy"], "v");
    }

    #[test]
    fn request_options_default_to_null() {
        let request: WorkRequest =
            serde_json::from_value(json!({"id": "r", "type": "analyze"})).unwrap();
        assert!(request.options.is_null());
        assert!(request.data.is_empty());
    }

    #[test]
    fn unknown_operation_is_rejected() {
        let parsed = serde_json::from_value::<WorkRequest>(json!({"id": "r", "type": "pivot"}));
        assert!(parsed.is_err());
    }

    #[test]
    fn response_wire_shape() {
        let ok = WorkResponse::success("r-1", json!([1]), Duration::from_millis(3));
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({"id": "r-1", "success": true, "result": [1], "processingTime": 3.0})
        );

        let failed = WorkResponse::failure(
            "r-2",
            &ProcessingError::options("sortBy is required"),
            Duration::ZERO,
        );
        let wire = serde_json::to_value(&failed).unwrap();
        assert_eq!(wire["success"], false);
        assert_eq!(wire["error"], "invalid options: sortBy is required");
        assert!(wire.get("result").is_none());
    }

    #[test]
    fn into_result() {
        let ok = WorkResponse::success("r", json!(1), Duration::ZERO);
        assert_eq!(ok.into_result(), Ok(json!(1)));
        let failed = WorkResponse::failure("r", &ProcessingError::Expression("x".into()), Duration::ZERO);
        assert_eq!(failed.into_result(), Err("expression error: x".into()));
    }
}
