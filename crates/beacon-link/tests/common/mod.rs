//! Shared fixtures for the connection and hub tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use beacon_core::ReconnectPolicy;
use beacon_events::{CONNECTION, ConnectionEvent, ConnectionStatus, EventBus, Subscription};
use beacon_link::{
    AuthCredential, ConnectionConfig, ConnectionState, CredentialProvider, HubConnection,
    MemoryPeer, MemoryServer, StaticCredential,
};
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

pub const URL: &str = "memory://hub";
pub const TOKEN: &str = "test-token";

pub fn policy(max_attempts: u32) -> ReconnectPolicy {
    ReconnectPolicy {
        max_attempts,
        base_delay_ms: 100,
        cap_delay_ms: 1_000,
        jitter_max_ms: 0,
    }
}

pub fn config(max_attempts: u32) -> ConnectionConfig {
    ConnectionConfig {
        url: URL.into(),
        invocation_timeout: Duration::from_secs(5),
        keepalive_interval: None,
        token_leeway: Duration::ZERO,
        reconnect: policy(max_attempts),
    }
}

pub fn static_token() -> Arc<dyn CredentialProvider> {
    Arc::new(StaticCredential::new(AuthCredential::new(TOKEN, None)))
}

/// Records every `connection` event published on a bus.
pub struct EventLog {
    events: Arc<Mutex<Vec<ConnectionEvent>>>,
    _sub: Subscription,
}

impl EventLog {
    pub fn attach(bus: &EventBus) -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let sub = bus.subscribe(CONNECTION, move |payload: &Value| {
            if let Some(event) = ConnectionEvent::from_payload(payload) {
                sink.lock().unwrap().push(event);
            }
        });
        Self { events, _sub: sub }
    }

    pub fn all(&self) -> Vec<ConnectionEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<ConnectionStatus> {
        self.all().into_iter().map(|e| e.status).collect()
    }

    pub fn last(&self) -> Option<ConnectionEvent> {
        self.all().pop()
    }
}

pub struct Harness {
    pub server: MemoryServer,
    pub conn: HubConnection,
    pub log: EventLog,
}

pub fn harness_with(config: ConnectionConfig, credentials: Arc<dyn CredentialProvider>) -> Harness {
    let server = MemoryServer::new();
    let bus = EventBus::new();
    let log = EventLog::attach(&bus);
    let conn = HubConnection::spawn(config, Arc::new(server.connector()), credentials, bus);
    Harness { server, conn, log }
}

pub fn harness(max_attempts: u32) -> Harness {
    harness_with(config(max_attempts), static_token())
}

impl Harness {
    /// Connect and return the accepted server end.
    pub async fn connected(&mut self) -> MemoryPeer {
        self.conn.connect().await.unwrap();
        self.server.accept().await.unwrap()
    }

    pub async fn wait_for_state(&self, wanted: ConnectionState) {
        let mut state = self.conn.watch_state();
        let _ = state.wait_for(|s| *s == wanted).await.unwrap();
    }
}

/// Forward every event published under `name` into a channel.
pub fn forward(bus: &EventBus, name: &str) -> (mpsc::UnboundedReceiver<Value>, Subscription) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sub = bus.subscribe(name, move |payload: &Value| {
        let _ = tx.send(payload.clone());
    });
    (rx, sub)
}

/// Server end that answers every invocation with `{"target": <target>}`.
pub struct Responder {
    pub calls: mpsc::UnboundedReceiver<(String, Vec<Value>)>,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<MemoryPeer>,
}

impl Responder {
    pub fn spawn(mut peer: MemoryPeer) -> Self {
        let (calls_tx, calls) = mpsc::unbounded_channel();
        let (stop, mut stop_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    call = peer.next_invocation() => {
                        let Some((id, target, arguments)) = call else { break };
                        let _ = calls_tx.send((target.clone(), arguments));
                        let _ = peer.complete(&id, json!({"target": target}));
                    }
                }
            }
            peer
        });
        Self {
            calls,
            stop: Some(stop),
            handle,
        }
    }

    /// Stop answering and drop the server end, closing the channel.
    pub async fn hang_up(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        drop(self.handle.await.unwrap());
    }

    pub async fn next_call(&mut self) -> (String, Vec<Value>) {
        self.calls.recv().await.unwrap()
    }
}
