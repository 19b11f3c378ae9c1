//! Event fan-out to registered listeners.
//!
//! [`EventBus`] is the subscription registry and the dispatcher in one
//! object. Registrations are returned as [`Subscription`] handles that remove
//! exactly their own entry when unsubscribed or dropped.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

type Callback = Arc<dyn Fn(&Value) + Send + Sync>;
type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

struct Listener {
    id: u64,
    callback: Callback,
    predicate: Option<Predicate>,
}

#[derive(Default)]
struct Registry {
    /// Listeners per event name, in registration order. Never holds an empty `Vec`.
    listeners: HashMap<String, Vec<Listener>>,
    next_id: u64,
}

impl Registry {
    fn insert(&mut self, event: &str, callback: Callback, predicate: Option<Predicate>) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        self.listeners
            .entry(event.to_owned())
            .or_default()
            .push(Listener {
                id,
                callback,
                predicate,
            });
        id
    }

    fn remove(&mut self, event: &str, id: u64) -> bool {
        let Some(list) = self.listeners.get_mut(event) else {
            return false;
        };
        let before = list.len();
        list.retain(|l| l.id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            let _ = self.listeners.remove(event);
        }
        removed
    }
}

/// Outcome of a single [`EventBus::publish`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Listeners whose callback completed.
    pub delivered: usize,
    /// Listeners that panicked (in the predicate or the callback).
    pub failed: usize,
    /// Listeners skipped by their predicate.
    pub filtered: usize,
}

/// Subscription registry and dispatcher.
///
/// Cloning is cheap and yields a handle to the same registry.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `event`.
    ///
    /// Registering the same callback twice creates two independent entries.
    pub fn subscribe<F>(&self, event: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.register(event.into(), Arc::new(callback), None)
    }

    /// Register `callback` for `event`, invoked only when `predicate` accepts the payload.
    pub fn subscribe_filtered<P, F>(
        &self,
        event: impl Into<String>,
        predicate: P,
        callback: F,
    ) -> Subscription
    where
        P: Fn(&Value) -> bool + Send + Sync + 'static,
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.register(event.into(), Arc::new(callback), Some(Arc::new(predicate)))
    }

    fn register(&self, event: String, callback: Callback, predicate: Option<Predicate>) -> Subscription {
        let id = self.registry.lock().insert(&event, callback, predicate);
        debug!(event = %event, listener_id = id, "listener registered");
        Subscription {
            event,
            id,
            registry: Arc::downgrade(&self.registry),
            active: true,
        }
    }

    /// Deliver `payload` to every listener registered for `event`.
    ///
    /// Listeners run synchronously in registration order. The set of
    /// listeners is captured when the call starts; registrations made by a
    /// listener take effect from the next publish. A panicking listener is
    /// logged and skipped without affecting the others or the caller.
    pub fn publish(&self, event: &str, payload: &Value) -> PublishReport {
        let snapshot: Vec<(u64, Callback, Option<Predicate>)> = {
            let registry = self.registry.lock();
            match registry.listeners.get(event) {
                Some(list) => list
                    .iter()
                    .map(|l| (l.id, Arc::clone(&l.callback), l.predicate.clone()))
                    .collect(),
                None => return PublishReport::default(),
            }
        };

        let mut report = PublishReport::default();
        for (id, callback, predicate) in snapshot {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                if predicate.as_ref().is_some_and(|accept| !accept(payload)) {
                    return false;
                }
                callback(payload);
                true
            }));
            match outcome {
                Ok(true) => report.delivered += 1,
                Ok(false) => report.filtered += 1,
                Err(panic) => {
                    report.failed += 1;
                    warn!(
                        event,
                        listener_id = id,
                        error = %panic_message(panic.as_ref()),
                        "event listener panicked"
                    );
                }
            }
        }
        report
    }

    /// Number of listeners registered for `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.registry.lock().listeners.get(event).map_or(0, Vec::len)
    }

    /// Event names that currently have at least one listener.
    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registry.lock().listeners.keys().cloned().collect();
        names.sort();
        names
    }

    /// Remove every registration.
    ///
    /// Outstanding [`Subscription`] handles become inert.
    pub fn clear(&self) {
        self.registry.lock().listeners.clear();
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Handle for one registration on an [`EventBus`].
///
/// Dropping the handle unsubscribes. Use [`Subscription::detach`] to keep the
/// listener registered until [`EventBus::clear`].
#[must_use = "dropping a Subscription unsubscribes its listener"]
pub struct Subscription {
    event: String,
    id: u64,
    registry: Weak<Mutex<Registry>>,
    active: bool,
}

impl Subscription {
    /// Event name this handle is registered for.
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Remove this registration.
    ///
    /// Returns `false` if the entry was already gone (bus cleared or dropped).
    pub fn unsubscribe(mut self) -> bool {
        self.release()
    }

    /// Keep the listener registered for the lifetime of the bus.
    pub fn detach(mut self) {
        self.active = false;
    }

    fn release(&mut self) -> bool {
        if !std::mem::take(&mut self.active) {
            return false;
        }
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let removed = registry.lock().remove(&self.event, self.id);
        if removed {
            debug!(event = %self.event, listener_id = self.id, "listener removed");
        }
        removed
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.event)
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
