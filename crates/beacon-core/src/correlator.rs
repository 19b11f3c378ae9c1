//! Pending-request table keyed by correlation id.
//!
//! A [`Correlator`] is owned by exactly one task (the hub connection task or
//! the engine dispatcher), so it needs no interior locking. Callers hold the
//! receiving half of a `oneshot` channel; the owner completes it when the
//! correlated response arrives, when the request times out, or when the
//! whole table is torn down.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::ids::CorrelationId;

/// Completion side of one in-flight request.
pub struct PendingRequest<T, E> {
    /// When the request was registered.
    pub created_at: Instant,
    reply: oneshot::Sender<Result<T, E>>,
}

impl<T, E> PendingRequest<T, E> {
    fn complete(self, result: Result<T, E>) {
        // The caller may have stopped waiting; that is not an error here.
        let _ = self.reply.send(result);
    }
}

/// Returned by [`Correlator::track`] when the id is already in flight.
///
/// Hands the reply channel back so the caller can answer it directly.
pub struct DuplicateCorrelation<T, E> {
    /// The id that was already pending.
    pub id: CorrelationId,
    /// The rejected reply channel.
    pub reply: oneshot::Sender<Result<T, E>>,
}

/// Tracks requests awaiting a correlated response.
pub struct Correlator<T, E> {
    pending: HashMap<CorrelationId, PendingRequest<T, E>>,
}

impl<T, E> Correlator<T, E> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }

    /// Register a request under a freshly generated id.
    pub fn register(&mut self) -> (CorrelationId, oneshot::Receiver<Result<T, E>>) {
        let (tx, rx) = oneshot::channel();
        let mut id = CorrelationId::new();
        while self.pending.contains_key(&id) {
            id = CorrelationId::new();
        }
        let _ = self.pending.insert(
            id.clone(),
            PendingRequest {
                created_at: Instant::now(),
                reply: tx,
            },
        );
        (id, rx)
    }

    /// Register a request under a caller-supplied id.
    ///
    /// Fails if the id is already pending; the existing entry is untouched.
    pub fn track(
        &mut self,
        id: CorrelationId,
        reply: oneshot::Sender<Result<T, E>>,
    ) -> Result<(), DuplicateCorrelation<T, E>> {
        if self.pending.contains_key(&id) {
            return Err(DuplicateCorrelation { id, reply });
        }
        let _ = self.pending.insert(
            id,
            PendingRequest {
                created_at: Instant::now(),
                reply,
            },
        );
        Ok(())
    }

    /// Complete the request with `id`. Returns `false` for unknown ids.
    pub fn complete(&mut self, id: &str, result: Result<T, E>) -> bool {
        match self.pending.remove(id) {
            Some(entry) => {
                entry.complete(result);
                true
            }
            None => false,
        }
    }

    /// Resolve the request with `id` successfully.
    pub fn resolve(&mut self, id: &str, value: T) -> bool {
        self.complete(id, Ok(value))
    }

    /// Reject the request with `id`.
    pub fn reject(&mut self, id: &str, error: E) -> bool {
        self.complete(id, Err(error))
    }

    /// Reject every pending request, leaving the table empty.
    ///
    /// Returns how many requests were rejected.
    pub fn reject_all(&mut self, mut make_error: impl FnMut(&CorrelationId) -> E) -> usize {
        let drained: Vec<_> = self.pending.drain().collect();
        let count = drained.len();
        for (id, entry) in drained {
            let error = make_error(&id);
            entry.complete(Err(error));
        }
        count
    }

    /// Reject requests registered more than `timeout` before `now`.
    ///
    /// Returns how many requests expired.
    pub fn expire(
        &mut self,
        now: Instant,
        timeout: Duration,
        mut make_error: impl FnMut(&CorrelationId) -> E,
    ) -> usize {
        let expired: Vec<CorrelationId> = self
            .pending
            .iter()
            .filter(|(_, entry)| now.saturating_duration_since(entry.created_at) >= timeout)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            if let Some(entry) = self.pending.remove(id) {
                entry.complete(Err(make_error(id)));
            }
        }
        expired.len()
    }

    /// Whether `id` is pending.
    pub fn contains(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    /// Number of pending requests.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no requests are pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl<T, E> Default for Correlator<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
