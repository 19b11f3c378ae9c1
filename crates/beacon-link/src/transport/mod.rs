//! Transport abstraction under the connection task.
//!
//! A [`Connector`] opens one [`TransportChannel`] per connection attempt,
//! presenting the credential resolved for that attempt. The connection task
//! owns the channel exclusively, so the trait needs no interior locking. It
//! must still be `Sync`: the spawned task holds `&self` across awaits.

pub mod memory;
pub mod websocket;

use async_trait::async_trait;

use crate::auth::AuthCredential;
use crate::errors::TransportError;

pub use memory::{MemoryConnector, MemoryPeer, MemoryServer};
pub use websocket::WebSocketConnector;

/// Where and as whom to connect.
#[derive(Clone, Debug)]
pub struct ConnectTarget {
    /// Endpoint URL.
    pub url: String,
    /// Credential for this attempt.
    pub credential: AuthCredential,
}

/// Opens transport channels.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a channel to `target`.
    async fn connect(&self, target: &ConnectTarget) -> Result<Box<dyn TransportChannel>, TransportError>;
}

/// One open, bidirectional text-frame channel.
#[async_trait]
pub trait TransportChannel: Send + Sync {
    /// Send one text frame.
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Receive the next text frame.
    ///
    /// Returns `None` once the channel is closed. Must be cancel-safe: the
    /// connection task polls it inside `select!`.
    async fn recv_text(&mut self) -> Option<Result<String, TransportError>>;

    /// Close the channel. Further calls are no-ops.
    async fn close(&mut self);
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
