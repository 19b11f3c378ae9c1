//! # beacon-events
//!
//! In-process publish/subscribe for server-pushed events.
//!
//! - [`EventBus`]: registry of listeners per event name plus synchronous,
//!   panic-isolated dispatch in registration order
//! - [`Subscription`]: RAII handle removing exactly one registration
//! - [`names`]: well-known event names and the [`ConnectionEvent`] payload

#![deny(unsafe_code)]

pub mod bus;
pub mod names;

pub use bus::{EventBus, PublishReport, Subscription};
pub use names::{CONNECTION, ConnectionEvent, ConnectionStatus};
