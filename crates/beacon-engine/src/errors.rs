//! Error taxonomy for the processing engine.
//!
//! [`ProcessingError`] describes why one request failed and is reported in
//! its response. [`EngineError`] is returned when the pool itself cannot
//! take or answer a request.

// ── Error code constants ────────────────────────────────────────────

/// The request's options could not be interpreted.
pub const INVALID_OPTIONS: &str = "INVALID_OPTIONS";
/// A transform expression could not be evaluated.
pub const EXPRESSION_ERROR: &str = "EXPRESSION_ERROR";
/// The operation panicked.
pub const OPERATION_PANICKED: &str = "OPERATION_PANICKED";
/// The engine is shut down.
pub const ENGINE_CLOSED: &str = "ENGINE_CLOSED";
/// A request with the same id is already in flight.
pub const DUPLICATE_REQUEST: &str = "DUPLICATE_REQUEST";

/// Failure of a single work request.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ProcessingError {
    /// Options are missing, mistyped, or inconsistent.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// An expression failed on some row.
    #[error("expression error: {0}")]
    Expression(String),

    /// The operation panicked; the message is the panic payload when it is text.
    #[error("operation panicked: {0}")]
    Panicked(String),
}

impl ProcessingError {
    /// Machine-readable error code for this variant.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidOptions(_) => INVALID_OPTIONS,
            Self::Expression(_) => EXPRESSION_ERROR,
            Self::Panicked(_) => OPERATION_PANICKED,
        }
    }

    /// Shorthand for an [`InvalidOptions`](Self::InvalidOptions) from any message.
    pub fn options(message: impl Into<String>) -> Self {
        Self::InvalidOptions(message.into())
    }
}

impl From<serde_json::Error> for ProcessingError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidOptions(err.to_string())
    }
}

/// Failure of the pool to accept or answer a request.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// The engine no longer accepts work.
    #[error("processing engine is shut down")]
    Closed,

    /// Another request with this id has not been answered yet.
    #[error("request {id} is already in flight")]
    DuplicateRequest {
        /// The conflicting id.
        id: String,
    },
}

impl EngineError {
    /// Machine-readable error code for this variant.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Closed => ENGINE_CLOSED,
            Self::DuplicateRequest { .. } => DUPLICATE_REQUEST,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
