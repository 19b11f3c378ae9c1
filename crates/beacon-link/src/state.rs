//! Connection lifecycle states.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of one logical hub connection.
///
/// Only the connection task changes the state; everything else observes it
/// through [`HubConnection::state`](crate::HubConnection::state) or
/// [`HubConnection::watch_state`](crate::HubConnection::watch_state).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No transport and no reconnect scheduled.
    #[default]
    Disconnected,
    /// Opening the transport after an explicit `connect()`.
    Connecting,
    /// Transport open.
    Connected,
    /// Transport lost; a reconnect attempt is scheduled or in progress.
    Reconnecting,
    /// Reconnect budget exhausted or credential refused during reconnect.
    Failed,
}

impl ConnectionState {
    /// Whether invocations and sends are accepted.
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }

    /// Whether `connect()` would be a no-op.
    pub fn is_establishing_or_open(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }

    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_serde() {
        for state in [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Reconnecting,
            ConnectionState::Failed,
        ] {
            let json = serde_json::to_value(state).unwrap();
            assert_eq!(json, serde_json::Value::String(state.to_string()));
        }
    }

    #[test]
    fn only_connected_accepts_calls() {
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Reconnecting.is_connected());
        assert!(ConnectionState::Connecting.is_establishing_or_open());
        assert!(!ConnectionState::Failed.is_establishing_or_open());
    }
}
