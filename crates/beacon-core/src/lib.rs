//! # beacon-core
//!
//! Shared vocabulary for the Beacon crates:
//!
//! - **Branded IDs**: [`CorrelationId`] and [`ConnectionId`] newtypes
//! - **Reconnect policy**: [`ReconnectPolicy`] and the pure backoff math
//! - **Correlation**: [`Correlator`], the pending-request table used by both the
//!   hub connection and the processing engine
//! - **Logging**: [`logging::init_subscriber`] for binaries and tests

#![deny(unsafe_code)]

pub mod correlator;
pub mod ids;
pub mod logging;
pub mod retry;

pub use correlator::{Correlator, DuplicateCorrelation, PendingRequest};
pub use ids::{ConnectionId, CorrelationId};
pub use retry::ReconnectPolicy;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
