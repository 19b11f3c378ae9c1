//! Event names and the connection lifecycle payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Connection lifecycle event published by the hub connection.
pub const CONNECTION: &str = "connection";

/// Events pushed by the hub as server-side invocations.
pub mod hub {
    /// Full dashboard snapshot.
    pub const DASHBOARD_UPDATE: &str = "DashboardUpdate";
    /// `(templateKey, data)` performance metrics for one template.
    pub const PERFORMANCE_UPDATE: &str = "PerformanceUpdate";
    /// `(testId, data)` A/B test progress.
    pub const AB_TEST_UPDATE: &str = "ABTestUpdate";
    /// `(alert)` newly raised alert.
    pub const NEW_ALERT: &str = "NewAlert";
    /// `(data)` real-time analytics tick.
    pub const REAL_TIME_UPDATE: &str = "RealTimeUpdate";
    /// `(message)` server-reported error.
    pub const ERROR: &str = "Error";
}

/// Events pushed as plain typed channel messages.
pub mod channel {
    /// Long-running query progress.
    pub const QUERY_PROGRESS: &str = "query_progress";
    /// Host metrics sample.
    pub const SYSTEM_METRICS: &str = "system_metrics";
    /// Cost threshold alert.
    pub const COST_ALERT: &str = "cost_alert";
    /// User activity notification.
    pub const USER_ACTIVITY: &str = "user_activity";
    /// Dashboard data change.
    pub const DASHBOARD_UPDATE: &str = "dashboard_update";
}

/// Status carried by a [`CONNECTION`] event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// First successful connection after an explicit connect.
    Connected,
    /// Transport closed, explicitly or unexpectedly.
    Disconnected,
    /// A connection attempt failed.
    Error,
    /// Automatic reconnect succeeded.
    Reconnected,
    /// Reconnect budget exhausted or authentication refused; terminal.
    Failed,
}

/// Payload of a [`CONNECTION`] event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionEvent {
    /// New lifecycle status.
    pub status: ConnectionStatus,
    /// Reconnect attempt number, when relevant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    /// Scheduled delay before the next attempt, in ms.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_in_ms: Option<u64>,
    /// Human-readable error, when relevant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectionEvent {
    /// Event with only a status.
    pub fn new(status: ConnectionStatus) -> Self {
        Self {
            status,
            attempt: None,
            retry_in_ms: None,
            error: None,
        }
    }

    /// Attach an attempt number.
    #[must_use]
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    /// Attach the delay before the next attempt.
    #[must_use]
    pub fn with_retry_in_ms(mut self, delay_ms: u64) -> Self {
        self.retry_in_ms = Some(delay_ms);
        self
    }

    /// Attach an error message.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Serialize into a bus payload.
    pub fn to_payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Parse a bus payload back into an event.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        Self::deserialize(payload).ok()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_wire_names() {
        let payload = ConnectionEvent::new(ConnectionStatus::Reconnected).to_payload();
        assert_eq!(payload, json!({"status": "reconnected"}));
    }

    #[test]
    fn optional_fields_serialize_when_set() {
        let payload = ConnectionEvent::new(ConnectionStatus::Disconnected)
            .with_attempt(2)
            .with_retry_in_ms(4000)
            .with_error("connection reset")
            .to_payload();
        assert_eq!(payload["attempt"], 2);
        assert_eq!(payload["retryInMs"], 4000);
        assert_eq!(payload["error"], "connection reset");
    }

    #[test]
    fn from_payload_roundtrip() {
        let event = ConnectionEvent::new(ConnectionStatus::Failed).with_attempt(5);
        let back = ConnectionEvent::from_payload(&event.to_payload()).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn from_payload_rejects_unknown_status() {
        assert!(ConnectionEvent::from_payload(&json!({"status": "sleeping"})).is_none());
    }
}
