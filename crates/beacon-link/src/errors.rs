//! Error taxonomy for the hub connection.

use chrono::{DateTime, Utc};

// ── Error code constants ────────────────────────────────────────────

/// No credential could be resolved.
pub const AUTH_MISSING: &str = "AUTH_MISSING";
/// The credential's expiry has passed.
pub const AUTH_EXPIRED: &str = "AUTH_EXPIRED";
/// The token could not be decoded.
pub const AUTH_MALFORMED: &str = "AUTH_MALFORMED";
/// The credential provider itself failed.
pub const AUTH_PROVIDER_FAILED: &str = "AUTH_PROVIDER_FAILED";
/// Opening the transport failed.
pub const CONNECT_FAILED: &str = "CONNECT_FAILED";
/// The transport closed.
pub const CONNECTION_CLOSED: &str = "CONNECTION_CLOSED";
/// Writing to or reading from the transport failed.
pub const TRANSPORT_IO: &str = "TRANSPORT_IO";
/// The peer sent something that is not a valid frame.
pub const PROTOCOL_ERROR: &str = "PROTOCOL_ERROR";
/// The call requires a connected hub.
pub const NOT_CONNECTED: &str = "NOT_CONNECTED";
/// The server answered the invocation with an error.
pub const INVOCATION_REJECTED: &str = "INVOCATION_REJECTED";
/// No completion arrived in time.
pub const INVOCATION_TIMEOUT: &str = "INVOCATION_TIMEOUT";
/// The request was dropped by `disconnect()`.
pub const CANCELLED: &str = "CANCELLED";
/// Every reconnect attempt failed.
pub const RECONNECT_EXHAUSTED: &str = "RECONNECT_EXHAUSTED";
/// The connection task is gone.
pub const TASK_CLOSED: &str = "TASK_CLOSED";

/// Credential resolution or validation failure. Aborts the attempt.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The provider returned no credential.
    #[error("no credential available")]
    Missing,

    /// The credential's expiry has passed.
    #[error("credential expired at {expired_at}")]
    Expired {
        /// Expiry read from the credential.
        expired_at: DateTime<Utc>,
    },

    /// The token looks like a JWT but cannot be decoded.
    #[error("malformed token: {0}")]
    Malformed(String),

    /// The provider failed to produce a credential.
    #[error("credential provider failed: {0}")]
    Provider(String),
}

impl AuthError {
    /// Machine-readable error code for this variant.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Missing => AUTH_MISSING,
            Self::Expired { .. } => AUTH_EXPIRED,
            Self::Malformed(_) => AUTH_MALFORMED,
            Self::Provider(_) => AUTH_PROVIDER_FAILED,
        }
    }
}

/// Transport-level failure. Inside the reconnect budget these are recovered
/// by the connection task.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Opening the transport failed.
    #[error("connect to {url} failed: {reason}")]
    Connect {
        /// Endpoint that was dialed.
        url: String,
        /// Underlying failure.
        reason: String,
    },

    /// The transport closed, cleanly or not.
    #[error("connection closed{}", close_suffix(.reason.as_deref()))]
    Closed {
        /// Close reason, when the peer supplied one.
        reason: Option<String>,
    },

    /// Writing or reading a frame failed.
    #[error("transport I/O failed: {0}")]
    Io(String),

    /// The peer sent an invalid frame.
    #[error("protocol violation: {0}")]
    Protocol(String),
}

impl TransportError {
    /// Machine-readable error code for this variant.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Connect { .. } => CONNECT_FAILED,
            Self::Closed { .. } => CONNECTION_CLOSED,
            Self::Io(_) => TRANSPORT_IO,
            Self::Protocol(_) => PROTOCOL_ERROR,
        }
    }

    /// Shorthand for a close without a reason.
    pub fn closed() -> Self {
        Self::Closed { reason: None }
    }
}

fn close_suffix(reason: Option<&str>) -> String {
    reason.map(|r| format!(": {r}")).unwrap_or_default()
}

/// Error surfaced by [`HubConnection`](crate::HubConnection) calls.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    /// The call requires the `Connected` state.
    #[error("not connected")]
    NotConnected,

    /// The server completed the invocation with an error.
    #[error("invocation rejected: {message}")]
    Rejected {
        /// Error text from the completion frame.
        message: String,
    },

    /// No completion within the invocation timeout.
    #[error("invocation timed out after {timeout_ms}ms")]
    Timeout {
        /// Configured timeout.
        timeout_ms: u64,
    },

    /// Dropped by an explicit disconnect.
    #[error("request cancelled by disconnect")]
    Cancelled,

    /// The reconnect budget is spent; only `connect()` leaves this state.
    #[error("reconnect failed after {attempts} attempts")]
    ReconnectExhausted {
        /// Attempts made before giving up.
        attempts: u32,
    },

    /// Credential failure.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Transport failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The connection task has stopped.
    #[error("connection task is not running")]
    TaskClosed,
}

impl LinkError {
    /// Machine-readable error code for this variant.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotConnected => NOT_CONNECTED,
            Self::Rejected { .. } => INVOCATION_REJECTED,
            Self::Timeout { .. } => INVOCATION_TIMEOUT,
            Self::Cancelled => CANCELLED,
            Self::ReconnectExhausted { .. } => RECONNECT_EXHAUSTED,
            Self::Auth(e) => e.code(),
            Self::Transport(e) => e.code(),
            Self::TaskClosed => TASK_CLOSED,
        }
    }

    /// Whether this is a credential failure.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

/// Result alias for connection calls.
pub type Result<T> = std::result::Result<T, LinkError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_display_with_and_without_reason() {
        assert_eq!(TransportError::closed().to_string(), "connection closed");
        let err = TransportError::Closed {
            reason: Some("server restart".into()),
        };
        assert_eq!(err.to_string(), "connection closed: server restart");
    }

    #[test]
    fn link_error_delegates_codes() {
        assert_eq!(LinkError::from(AuthError::Missing).code(), AUTH_MISSING);
        assert_eq!(
            LinkError::from(TransportError::Io("broken pipe".into())).code(),
            TRANSPORT_IO
        );
        assert_eq!(LinkError::Cancelled.code(), CANCELLED);
        assert_eq!(LinkError::Timeout { timeout_ms: 10 }.code(), INVOCATION_TIMEOUT);
    }

    #[test]
    fn transparent_display() {
        let err = LinkError::from(AuthError::Malformed("bad base64".into()));
        assert_eq!(err.to_string(), "malformed token: bad base64");
        assert!(err.is_auth());
        assert!(!LinkError::NotConnected.is_auth());
    }
}
