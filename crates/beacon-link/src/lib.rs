//! # beacon-link
//!
//! Resilient connection to the analytics hub.
//!
//! - [`HubConnection`]: handle to a task that owns one logical connection,
//!   its reconnect state machine, and its pending invocations
//! - [`HubClient`]: hub methods, durable subscriptions, typed [`HubEvent`]s
//! - [`auth`]: bearer credentials resolved on every attempt
//! - [`transport`]: WebSocket and in-memory channels behind [`Connector`]
//! - [`protocol`]: JSON text frames

#![deny(unsafe_code)]

pub mod auth;
pub mod connection;
pub mod errors;
pub mod hub;
pub mod protocol;
pub mod state;
pub mod transport;

pub use auth::{AuthCredential, CredentialProvider, SharedCredential, StaticCredential};
pub use connection::{ConnectionConfig, HubConnection, WeakHubConnection};
pub use errors::{AuthError, LinkError, Result, TransportError};
pub use hub::{HubClient, HubEvent, SubscriptionGroup};
pub use protocol::{ClientFrame, ServerFrame};
pub use state::ConnectionState;
pub use transport::{
    ConnectTarget, Connector, MemoryConnector, MemoryPeer, MemoryServer, TransportChannel,
    WebSocketConnector,
};
