//! Hub connection: a cloneable handle and the task that owns the connection.
//!
//! The task owns the state, the transport channel, the pending-invocation
//! table, and the reconnect timer. Handles talk to it over an `mpsc` command
//! queue with `oneshot` replies, so transitions are applied one at a time and
//! no lock guards connection state. Inbound push frames and lifecycle
//! changes are published on the [`EventBus`] from inside the task, which
//! means listeners run on the connection task and must not block.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use beacon_core::{ConnectionId, CorrelationId, Correlator, ReconnectPolicy};
use beacon_events::{CONNECTION, ConnectionEvent, ConnectionStatus, EventBus, Subscription};
use beacon_settings::ConnectionSettings;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{Instrument, debug, info, info_span, trace, warn};

use crate::auth::{AuthCredential, CredentialProvider, resolve_credential};
use crate::errors::{LinkError, Result, TransportError};
use crate::protocol::{ClientFrame, ServerFrame};
use crate::state::ConnectionState;
use crate::transport::{ConnectTarget, Connector, TransportChannel, WebSocketConnector};

const COMMAND_BUFFER: usize = 64;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Runtime parameters for one connection.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Hub endpoint.
    pub url: String,
    /// Bound on a pending invocation and on the transport handshake.
    pub invocation_timeout: Duration,
    /// Interval between client pings; `None` disables keepalive.
    pub keepalive_interval: Option<Duration>,
    /// Credentials expiring within this window are treated as expired.
    pub token_leeway: Duration,
    /// Automatic reconnect policy.
    pub reconnect: ReconnectPolicy,
}

impl ConnectionConfig {
    /// Config for `url` with default timings.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::from(&ConnectionSettings::default())
    }
}

impl From<&ConnectionSettings> for ConnectionConfig {
    fn from(settings: &ConnectionSettings) -> Self {
        Self {
            url: settings.url.clone(),
            invocation_timeout: settings.invocation_timeout(),
            keepalive_interval: settings.keepalive_interval(),
            token_leeway: settings.token_leeway(),
            reconnect: settings.reconnect.clone(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handle
// ─────────────────────────────────────────────────────────────────────────────

enum Command {
    Connect(oneshot::Sender<Result<()>>),
    Disconnect(oneshot::Sender<()>),
    Invoke {
        target: String,
        arguments: Vec<Value>,
        reply: oneshot::Sender<Result<Value>>,
    },
    Send {
        event: String,
        data: Value,
        reply: oneshot::Sender<Result<()>>,
    },
    Shutdown(oneshot::Sender<()>),
}

/// Handle to one logical hub connection.
///
/// Cloning is cheap; all clones drive the same connection task. The task
/// stops after [`HubConnection::shutdown`] or when every handle is dropped.
#[derive(Clone)]
pub struct HubConnection {
    id: ConnectionId,
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<ConnectionState>,
    bus: EventBus,
}

impl HubConnection {
    /// Spawn the connection task on the current Tokio runtime.
    ///
    /// The connection starts `Disconnected`; call [`connect`](Self::connect).
    pub fn spawn(
        config: ConnectionConfig,
        connector: Arc<dyn Connector>,
        credentials: Arc<dyn CredentialProvider>,
        bus: EventBus,
    ) -> Self {
        let id = ConnectionId::new();
        let (commands, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);

        let sweep_period = (config.invocation_timeout / 4)
            .clamp(Duration::from_millis(10), Duration::from_secs(1));
        let mut sweep = tokio::time::interval(sweep_period);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let task = ConnectionTask {
            config,
            connector,
            credentials,
            bus: bus.clone(),
            commands: command_rx,
            state_tx,
            state: ConnectionState::Disconnected,
            channel: None,
            pending: Correlator::new(),
            attempt: 0,
            reconnect_at: None,
            keepalive: None,
            sweep,
        };
        let span = info_span!("hub_connection", connection_id = %id);
        let _ = tokio::spawn(task.run().instrument(span));

        Self {
            id,
            commands,
            state,
            bus,
        }
    }

    /// Spawn a connection over WebSocket.
    pub fn websocket(
        config: ConnectionConfig,
        credentials: Arc<dyn CredentialProvider>,
        bus: EventBus,
    ) -> Self {
        Self::spawn(config, Arc::new(WebSocketConnector::new()), credentials, bus)
    }

    /// Identifier used in log spans.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Bus that receives push events and lifecycle events.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Register a listener on the connection's bus.
    pub fn on<F>(&self, event: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.bus.subscribe(event, callback)
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Open the connection.
    ///
    /// No-op while connecting or connected. Cancels a scheduled reconnect and
    /// resets the attempt counter. Fails without touching the transport when
    /// no usable credential is available.
    pub async fn connect(&self) -> Result<()> {
        self.request(Command::Connect).await?
    }

    /// Close the connection, cancel the reconnect timer, and reject pending
    /// invocations with [`LinkError::Cancelled`]. Idempotent.
    pub async fn disconnect(&self) -> Result<()> {
        self.request(Command::Disconnect).await
    }

    /// Call a hub method and wait for its correlated completion.
    pub async fn invoke(&self, target: &str, arguments: Vec<Value>) -> Result<Value> {
        let target = target.to_owned();
        self.request(|reply| Command::Invoke {
            target,
            arguments,
            reply,
        })
        .await?
    }

    /// Send a fire-and-forget message.
    pub async fn send(&self, event: &str, data: Value) -> Result<()> {
        let event = event.to_owned();
        self.request(|reply| Command::Send { event, data, reply })
            .await?
    }

    /// Disconnect, clear every subscription on the bus, and stop the task.
    pub async fn shutdown(&self) {
        if self.request(Command::Shutdown).await.is_err() {
            debug!(connection_id = %self.id, "shutdown: task already stopped");
        }
    }

    /// Handle that does not keep the task alive.
    pub fn downgrade(&self) -> WeakHubConnection {
        WeakHubConnection {
            id: self.id.clone(),
            commands: self.commands.downgrade(),
            state: self.state.clone(),
            bus: self.bus.clone(),
        }
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| LinkError::TaskClosed)?;
        rx.await.map_err(|_| LinkError::TaskClosed)
    }
}

impl std::fmt::Debug for HubConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubConnection")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Non-owning [`HubConnection`] handle, for listeners registered on the
/// connection's own bus.
#[derive(Clone)]
pub struct WeakHubConnection {
    id: ConnectionId,
    commands: mpsc::WeakSender<Command>,
    state: watch::Receiver<ConnectionState>,
    bus: EventBus,
}

impl WeakHubConnection {
    /// Strong handle, if the task is still reachable.
    pub fn upgrade(&self) -> Option<HubConnection> {
        Some(HubConnection {
            id: self.id.clone(),
            commands: self.commands.upgrade()?,
            state: self.state.clone(),
            bus: self.bus.clone(),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Task
// ─────────────────────────────────────────────────────────────────────────────

enum Step {
    Command(Option<Command>),
    Inbound(Option<std::result::Result<String, TransportError>>),
    ReconnectDue,
    Keepalive,
    Sweep,
}

struct ConnectionTask {
    config: ConnectionConfig,
    connector: Arc<dyn Connector>,
    credentials: Arc<dyn CredentialProvider>,
    bus: EventBus,
    commands: mpsc::Receiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
    state: ConnectionState,
    channel: Option<Box<dyn TransportChannel>>,
    pending: Correlator<Value, LinkError>,
    /// Automatic attempts made since the last successful (re)connection.
    attempt: u32,
    reconnect_at: Option<Instant>,
    keepalive: Option<Interval>,
    sweep: Interval,
}

impl ConnectionTask {
    async fn run(mut self) {
        debug!(url = %self.config.url, "connection task started");
        loop {
            let step = tokio::select! {
                command = self.commands.recv() => Step::Command(command),
                inbound = next_inbound(&mut self.channel) => Step::Inbound(inbound),
                () = reconnect_timer(self.reconnect_at) => Step::ReconnectDue,
                () = keepalive_tick(&mut self.keepalive) => Step::Keepalive,
                _ = self.sweep.tick() => Step::Sweep,
            };

            match step {
                Step::Command(None) => {
                    self.teardown().await;
                    break;
                }
                Step::Command(Some(command)) => {
                    if self.handle_command(command).await.is_break() {
                        break;
                    }
                }
                Step::Inbound(Some(Ok(text))) => self.handle_frame(&text).await,
                Step::Inbound(Some(Err(err))) => self.transport_lost(err).await,
                Step::Inbound(None) => self.transport_lost(TransportError::closed()).await,
                Step::ReconnectDue => self.reconnect().await,
                Step::Keepalive => self.send_keepalive().await,
                Step::Sweep => self.expire_invocations(),
            }
        }
        debug!("connection task stopped");
    }

    async fn handle_command(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Connect(reply) => {
                let result = self.connect().await;
                let _ = reply.send(result);
            }
            Command::Disconnect(reply) => {
                self.disconnect().await;
                let _ = reply.send(());
            }
            Command::Invoke {
                target,
                arguments,
                reply,
            } => self.invoke(target, arguments, reply).await,
            Command::Send { event, data, reply } => {
                let result = self.send_event(event, data).await;
                let _ = reply.send(result);
            }
            Command::Shutdown(reply) => {
                self.teardown().await;
                let _ = reply.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    async fn connect(&mut self) -> Result<()> {
        if self.state.is_establishing_or_open() {
            return Ok(());
        }
        self.reconnect_at = None;
        self.attempt = 0;

        let credential = match self.resolve().await {
            Ok(credential) => credential,
            Err(err) => {
                warn!(error = %err, "connect aborted: no usable credential");
                let _ = self.set_state(ConnectionState::Disconnected);
                self.emit(ConnectionEvent::new(ConnectionStatus::Error).with_error(err.to_string()));
                return Err(err);
            }
        };

        let _ = self.set_state(ConnectionState::Connecting);
        match self.open(credential).await {
            Ok(channel) => {
                self.on_open(channel);
                info!(url = %self.config.url, "connected");
                self.emit(ConnectionEvent::new(ConnectionStatus::Connected));
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "connect failed");
                self.schedule_reconnect(
                    ConnectionEvent::new(ConnectionStatus::Error).with_error(err.to_string()),
                );
                Err(err.into())
            }
        }
    }

    async fn reconnect(&mut self) {
        self.reconnect_at = None;
        let attempt = self.attempt;
        debug!(attempt, "reconnect attempt");

        let credential = match self.resolve().await {
            Ok(credential) => credential,
            Err(err) => {
                warn!(attempt, error = %err, "reconnect aborted: no usable credential");
                let _ = self.set_state(ConnectionState::Failed);
                self.emit(
                    ConnectionEvent::new(ConnectionStatus::Failed)
                        .with_attempt(attempt)
                        .with_error(err.to_string()),
                );
                return;
            }
        };

        match self.open(credential).await {
            Ok(channel) => {
                self.on_open(channel);
                info!(attempt, "reconnected");
                self.emit(ConnectionEvent::new(ConnectionStatus::Reconnected).with_attempt(attempt));
            }
            Err(err) => {
                warn!(attempt, error = %err, "reconnect attempt failed");
                self.schedule_reconnect(
                    ConnectionEvent::new(ConnectionStatus::Error).with_error(err.to_string()),
                );
            }
        }
    }

    async fn disconnect(&mut self) {
        self.reconnect_at = None;
        self.keepalive = None;
        self.attempt = 0;
        if let Some(mut channel) = self.channel.take() {
            channel.close().await;
        }
        let cancelled = self.pending.reject_all(|_| LinkError::Cancelled);
        if self.set_state(ConnectionState::Disconnected) {
            info!(cancelled, "disconnected");
            self.emit(ConnectionEvent::new(ConnectionStatus::Disconnected));
        }
    }

    async fn teardown(&mut self) {
        self.disconnect().await;
        self.bus.clear();
    }

    async fn transport_lost(&mut self, cause: TransportError) {
        if let Some(mut channel) = self.channel.take() {
            channel.close().await;
        }
        self.keepalive = None;
        let rejected = self
            .pending
            .reject_all(|_| LinkError::Transport(cause.clone()));
        warn!(error = %cause, rejected, "transport lost");
        self.schedule_reconnect(
            ConnectionEvent::new(ConnectionStatus::Disconnected).with_error(cause.to_string()),
        );
    }

    /// Arm the reconnect timer, or give up when the budget is spent.
    ///
    /// `event` describes the failure that triggered this and is published
    /// either way.
    fn schedule_reconnect(&mut self, event: ConnectionEvent) {
        if self.config.reconnect.allows_attempt(self.attempt) {
            self.attempt += 1;
            let delay = self.config.reconnect.delay(self.attempt);
            let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
            self.reconnect_at = Some(Instant::now() + delay);
            let _ = self.set_state(ConnectionState::Reconnecting);
            info!(attempt = self.attempt, delay_ms, "reconnect scheduled");
            self.emit(event.with_attempt(self.attempt).with_retry_in_ms(delay_ms));
            return;
        }

        self.reconnect_at = None;
        let attempts = self.attempt;
        let _ = self.set_state(ConnectionState::Failed);
        self.emit(event);
        let exhausted = LinkError::ReconnectExhausted { attempts };
        warn!(attempts, "giving up on reconnect");
        self.emit(
            ConnectionEvent::new(ConnectionStatus::Failed)
                .with_attempt(attempts)
                .with_error(exhausted.to_string()),
        );
    }

    async fn resolve(&self) -> Result<AuthCredential> {
        Ok(resolve_credential(self.credentials.as_ref(), self.config.token_leeway).await?)
    }

    async fn open(
        &self,
        credential: AuthCredential,
    ) -> std::result::Result<Box<dyn TransportChannel>, TransportError> {
        let target = ConnectTarget {
            url: self.config.url.clone(),
            credential,
        };
        let timeout = self.config.invocation_timeout;
        match tokio::time::timeout(timeout, self.connector.connect(&target)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Connect {
                url: target.url,
                reason: format!("handshake timed out after {}ms", timeout.as_millis()),
            }),
        }
    }

    fn on_open(&mut self, channel: Box<dyn TransportChannel>) {
        self.channel = Some(channel);
        self.attempt = 0;
        self.reconnect_at = None;
        self.keepalive = self.config.keepalive_interval.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        let _ = self.set_state(ConnectionState::Connected);
    }

    /// Returns whether the state changed.
    fn set_state(&mut self, next: ConnectionState) -> bool {
        if self.state == next {
            return false;
        }
        debug!(from = %self.state, to = %next, "state transition");
        self.state = next;
        let _ = self.state_tx.send_replace(next);
        true
    }

    fn emit(&self, event: ConnectionEvent) {
        let report = self.bus.publish(CONNECTION, &event.to_payload());
        trace!(status = ?event.status, delivered = report.delivered, "connection event");
    }

    // ── Calls ───────────────────────────────────────────────────────

    async fn invoke(
        &mut self,
        target: String,
        arguments: Vec<Value>,
        reply: oneshot::Sender<Result<Value>>,
    ) {
        if !self.state.is_connected() {
            let _ = reply.send(Err(LinkError::NotConnected));
            return;
        }
        let id = CorrelationId::new();
        if let Err(duplicate) = self.pending.track(id.clone(), reply) {
            let _ = duplicate.reply.send(Err(LinkError::Transport(TransportError::Protocol(
                format!("invocation id {} already pending", duplicate.id),
            ))));
            return;
        }

        debug!(invocation_id = %id, target = %target, "invoking");
        let frame = ClientFrame::Invocation {
            invocation_id: id.to_string(),
            target,
            arguments,
        };
        if let Err(err) = self.write(&frame).await {
            let _ = self.pending.reject(&id, LinkError::Transport(err.clone()));
            if !matches!(err, TransportError::Protocol(_)) {
                self.transport_lost(err).await;
            }
        }
    }

    async fn send_event(&mut self, event: String, data: Value) -> Result<()> {
        if !self.state.is_connected() {
            return Err(LinkError::NotConnected);
        }
        debug!(event = %event, "sending");
        match self.write(&ClientFrame::Send { event, data }).await {
            Ok(()) => Ok(()),
            Err(err) => {
                if !matches!(err, TransportError::Protocol(_)) {
                    self.transport_lost(err.clone()).await;
                }
                Err(err.into())
            }
        }
    }

    async fn send_keepalive(&mut self) {
        trace!("keepalive ping");
        if let Err(err) = self.write(&ClientFrame::Ping).await {
            self.transport_lost(err).await;
        }
    }

    async fn write(&mut self, frame: &ClientFrame) -> std::result::Result<(), TransportError> {
        let text = frame.to_text()?;
        let channel = self.channel.as_mut().ok_or_else(TransportError::closed)?;
        channel.send_text(text).await
    }

    fn expire_invocations(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let timeout = self.config.invocation_timeout;
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        let expired = self.pending.expire(Instant::now(), timeout, |id| {
            warn!(invocation_id = %id, timeout_ms, "invocation timed out");
            LinkError::Timeout { timeout_ms }
        });
        if expired > 0 {
            debug!(expired, remaining = self.pending.len(), "expired invocations");
        }
    }

    // ── Inbound ─────────────────────────────────────────────────────

    async fn handle_frame(&mut self, text: &str) {
        let frame = match ServerFrame::parse(text) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(error = %err, "ignoring malformed frame");
                return;
            }
        };

        match frame {
            ServerFrame::Completion {
                invocation_id,
                result,
                error,
            } => {
                let outcome = match error {
                    Some(message) => Err(LinkError::Rejected { message }),
                    None => Ok(result.unwrap_or(Value::Null)),
                };
                if !self.pending.complete(&invocation_id, outcome) {
                    debug!(invocation_id = %invocation_id, "completion for unknown invocation");
                }
            }
            ServerFrame::Invocation { target, arguments } => {
                let report = self.bus.publish(&target, &Value::Array(arguments));
                trace!(event = %target, delivered = report.delivered, "hub event");
            }
            ServerFrame::Event { event, payload } => {
                let report = self.bus.publish(&event, &payload);
                trace!(event = %event, delivered = report.delivered, "channel event");
            }
            ServerFrame::Ping | ServerFrame::Pong => trace!("keepalive received"),
            ServerFrame::Close { error } => {
                self.transport_lost(TransportError::Closed { reason: error }).await;
            }
        }
    }
}

async fn next_inbound(
    channel: &mut Option<Box<dyn TransportChannel>>,
) -> Option<std::result::Result<String, TransportError>> {
    match channel {
        Some(channel) => channel.recv_text().await,
        None => std::future::pending().await,
    }
}

async fn reconnect_timer(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn keepalive_tick(keepalive: &mut Option<Interval>) {
    match keepalive {
        Some(interval) => {
            let _ = interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
