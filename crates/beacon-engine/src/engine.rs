//! Worker pool with id correlation.
//!
//! A dispatcher task owns the pending-request table. Each accepted request
//! waits for one of `workers` semaphore permits and then runs on a blocking
//! thread; its response travels back to the dispatcher, which completes the
//! caller's reply by id. Responses therefore arrive in completion order, not
//! submission order.

use std::sync::Arc;
use std::time::Duration;

use beacon_core::{CorrelationId, Correlator};
use beacon_settings::EngineSettings;
use futures::future::join_all;
use tokio::sync::{Semaphore, mpsc, oneshot, watch};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::errors::{EngineError, ProcessingError};
use crate::types::{WorkRequest, WorkResponse};
use crate::worker::execute;

/// Pool sizing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Requests processed in parallel; at least 1.
    pub workers: usize,
    /// Submissions buffered before `submit` waits; at least 1.
    pub queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from(&EngineSettings::default())
    }
}

impl From<&EngineSettings> for EngineConfig {
    fn from(settings: &EngineSettings) -> Self {
        Self {
            workers: settings.workers,
            queue_capacity: settings.queue_capacity,
        }
    }
}

type Reply = oneshot::Sender<Result<WorkResponse, EngineError>>;

enum Command {
    Submit { request: WorkRequest, reply: Reply },
    Shutdown,
}

/// Handle to the processing pool. Cheap to clone.
///
/// The pool stops after [`shutdown`](Self::shutdown) or when every handle is
/// dropped; in both cases work already accepted is finished first.
#[derive(Clone)]
pub struct ProcessingEngine {
    commands: mpsc::Sender<Command>,
    stopped: watch::Receiver<bool>,
    workers: usize,
}

impl ProcessingEngine {
    /// Spawn the dispatcher on the current Tokio runtime.
    pub fn spawn(config: EngineConfig) -> Self {
        let workers = config.workers.max(1);
        let (commands, command_rx) = mpsc::channel(config.queue_capacity.max(1));
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let (stopped_tx, stopped) = watch::channel(false);

        let dispatcher = Dispatcher {
            commands: command_rx,
            accepting: true,
            done_tx,
            done_rx,
            permits: Arc::new(Semaphore::new(workers)),
            pending: Correlator::new(),
            stopped: stopped_tx,
        };
        let span = info_span!("processing_engine", workers);
        let _ = tokio::spawn(dispatcher.run().instrument(span));

        Self {
            commands,
            stopped,
            workers,
        }
    }

    /// Number of requests processed in parallel.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Queue `request` and wait for its response.
    ///
    /// Processing failures come back as a response with `success: false`;
    /// the error side is only for requests the pool could not take.
    pub async fn submit(&self, request: WorkRequest) -> Result<WorkResponse, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Submit { request, reply })
            .await
            .map_err(|_| EngineError::Closed)?;
        rx.await.map_err(|_| EngineError::Closed)?
    }

    /// Submit every request concurrently. Results are in request order.
    pub async fn run(&self, requests: Vec<WorkRequest>) -> Vec<Result<WorkResponse, EngineError>> {
        join_all(requests.into_iter().map(|request| self.submit(request))).await
    }

    /// Stop accepting work and wait until accepted work has been answered.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
        let mut stopped = self.stopped.clone();
        let _ = stopped.wait_for(|done| *done).await;
    }

    /// Whether the dispatcher has stopped.
    pub fn is_stopped(&self) -> bool {
        *self.stopped.borrow()
    }
}

impl std::fmt::Debug for ProcessingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingEngine")
            .field("workers", &self.workers)
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dispatcher
// ─────────────────────────────────────────────────────────────────────────────

enum Step {
    Command(Option<Command>),
    Done(Option<WorkResponse>),
}

struct Dispatcher {
    commands: mpsc::Receiver<Command>,
    accepting: bool,
    done_tx: mpsc::UnboundedSender<WorkResponse>,
    done_rx: mpsc::UnboundedReceiver<WorkResponse>,
    permits: Arc<Semaphore>,
    pending: Correlator<WorkResponse, EngineError>,
    stopped: watch::Sender<bool>,
}

impl Dispatcher {
    async fn run(mut self) {
        debug!("dispatcher started");
        while self.accepting || !self.pending.is_empty() {
            let step = tokio::select! {
                command = self.commands.recv(), if self.accepting => Step::Command(command),
                done = self.done_rx.recv() => Step::Done(done),
            };

            match step {
                Step::Command(Some(Command::Submit { request, reply })) => self.accept(request, reply),
                Step::Command(Some(Command::Shutdown)) => {
                    info!(in_flight = self.pending.len(), "engine shutting down");
                    // Already-queued submissions are still drained by recv().
                    self.commands.close();
                }
                Step::Command(None) => self.accepting = false,
                Step::Done(Some(response)) => {
                    let id = response.id.clone();
                    if !self.pending.resolve(&id, response) {
                        warn!(request_id = %id, "response for unknown request dropped");
                    }
                }
                // Unreachable while the dispatcher holds `done_tx`.
                Step::Done(None) => break,
            }
        }
        let _ = self.stopped.send_replace(true);
        debug!("dispatcher stopped");
    }

    fn accept(&mut self, request: WorkRequest, reply: Reply) {
        let id = CorrelationId::from(request.id.clone());
        if let Err(duplicate) = self.pending.track(id, reply) {
            warn!(request_id = %duplicate.id, "duplicate request id rejected");
            let _ = duplicate.reply.send(Err(EngineError::DuplicateRequest {
                id: duplicate.id.into_inner(),
            }));
            return;
        }
        debug!(request_id = %request.id, operation = %request.operation, in_flight = self.pending.len(), "work accepted");

        let permits = Arc::clone(&self.permits);
        let done = self.done_tx.clone();
        let _ = tokio::spawn(async move {
            let id = request.id.clone();
            let response = match permits.acquire_owned().await {
                Ok(permit) => {
                    let joined = tokio::task::spawn_blocking(move || {
                        let _permit = permit;
                        execute(request)
                    })
                    .await;
                    joined.unwrap_or_else(|err| {
                        WorkResponse::failure(
                            id,
                            &ProcessingError::Panicked(err.to_string()),
                            Duration::ZERO,
                        )
                    })
                }
                Err(_) => WorkResponse::failure(
                    id,
                    &ProcessingError::Panicked("worker pool closed".into()),
                    Duration::ZERO,
                ),
            };
            let _ = done.send(response);
        });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
