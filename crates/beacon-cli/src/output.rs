//! JSON line formatting for stdout.

use serde_json::{Value, json};

/// `{"event": <name>, "payload": <payload>}` on one line.
pub fn event_line(event: &str, payload: &Value) -> String {
    json!({ "event": event, "payload": payload }).to_string()
}

/// Serialize `value` compactly, or indented when `pretty`.
pub fn value_text(value: &impl serde::Serialize, pretty: bool) -> serde_json::Result<String> {
    if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
