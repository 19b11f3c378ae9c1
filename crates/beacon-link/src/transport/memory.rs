//! In-process transport.
//!
//! [`MemoryServer`] accepts channels opened by its [`MemoryConnector`] and
//! hands each one out as a [`MemoryPeer`], the server end of the pair. Used
//! to embed a hub in the same process and to drive the connection task in
//! tests without sockets.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use super::{ConnectTarget, Connector, TransportChannel};
use crate::errors::TransportError;
use crate::protocol::{ClientFrame, ServerFrame};

#[derive(Default)]
struct Control {
    refuse_next: usize,
    attempts: usize,
    tokens: Vec<String>,
}

struct Shared {
    incoming: mpsc::UnboundedSender<MemoryPeer>,
    control: Mutex<Control>,
}

/// Accepting side of the in-memory transport.
pub struct MemoryServer {
    shared: Arc<Shared>,
    incoming: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryServer {
    /// Create a server with no pending connections.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared {
                incoming: tx,
                control: Mutex::new(Control::default()),
            }),
            incoming: rx,
        }
    }

    /// Connector that dials this server.
    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Wait for the next accepted channel.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.incoming.recv().await
    }

    /// Next accepted channel, if one is already waiting.
    pub fn try_accept(&mut self) -> Option<MemoryPeer> {
        self.incoming.try_recv().ok()
    }

    /// Fail the next `count` connection attempts.
    pub fn refuse_next(&self, count: usize) {
        self.shared.control.lock().refuse_next = count;
    }

    /// Connection attempts seen so far, refused ones included.
    pub fn attempts(&self) -> usize {
        self.shared.control.lock().attempts
    }

    /// Bearer tokens presented by every attempt, in order.
    pub fn presented_tokens(&self) -> Vec<String> {
        self.shared.control.lock().tokens.clone()
    }
}

impl Default for MemoryServer {
    fn default() -> Self {
        Self::new()
    }
}

/// Dials a [`MemoryServer`].
#[derive(Clone)]
pub struct MemoryConnector {
    shared: Arc<Shared>,
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, target: &ConnectTarget) -> Result<Box<dyn TransportChannel>, TransportError> {
        {
            let mut control = self.shared.control.lock();
            control.attempts += 1;
            control.tokens.push(target.credential.token().to_owned());
            if control.refuse_next > 0 {
                control.refuse_next -= 1;
                return Err(TransportError::Connect {
                    url: target.url.clone(),
                    reason: "connection refused".into(),
                });
            }
        }

        let (to_client, client_rx) = mpsc::unbounded_channel();
        let (client_tx, from_client) = mpsc::unbounded_channel();
        let peer = MemoryPeer {
            target: target.clone(),
            to_client: Some(to_client),
            from_client,
        };
        self.shared
            .incoming
            .send(peer)
            .map_err(|_| TransportError::Connect {
                url: target.url.clone(),
                reason: "server is not listening".into(),
            })?;

        Ok(Box::new(MemoryChannel {
            tx: Some(client_tx),
            rx: client_rx,
        }))
    }
}

struct MemoryChannel {
    tx: Option<mpsc::UnboundedSender<String>>,
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl TransportChannel for MemoryChannel {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or_else(TransportError::closed)?;
        tx.send(text).map_err(|_| TransportError::Closed {
            reason: Some("peer dropped".into()),
        })
    }

    async fn recv_text(&mut self) -> Option<Result<String, TransportError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.tx = None;
        self.rx.close();
    }
}

/// Server end of one in-memory channel.
///
/// Dropping the peer closes the channel from the server side.
pub struct MemoryPeer {
    target: ConnectTarget,
    to_client: Option<mpsc::UnboundedSender<String>>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl MemoryPeer {
    /// What the client dialed with.
    pub fn target(&self) -> &ConnectTarget {
        &self.target
    }

    /// Next raw text frame from the client; `None` once it closed.
    pub async fn recv_text(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Next client frame, skipping anything that does not parse.
    pub async fn recv_frame(&mut self) -> Option<ClientFrame> {
        loop {
            let text = self.recv_text().await?;
            if let Ok(frame) = ClientFrame::parse(&text) {
                return Some(frame);
            }
        }
    }

    /// Next invocation as `(invocation_id, target, arguments)`, skipping
    /// keepalives and sends.
    pub async fn next_invocation(&mut self) -> Option<(String, String, Vec<Value>)> {
        loop {
            if let ClientFrame::Invocation {
                invocation_id,
                target,
                arguments,
            } = self.recv_frame().await?
            {
                return Some((invocation_id, target, arguments));
            }
        }
    }

    /// Send a raw text frame. Returns `false` if the client is gone.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.to_client
            .as_ref()
            .is_some_and(|tx| tx.send(text.into()).is_ok())
    }

    /// Send a server frame.
    pub fn send_frame(&self, frame: &ServerFrame) -> bool {
        self.send_text(frame.to_text())
    }

    /// Push a hub event.
    pub fn push(&self, target: &str, arguments: Vec<Value>) -> bool {
        self.send_frame(&ServerFrame::Invocation {
            target: target.to_owned(),
            arguments,
        })
    }

    /// Complete an invocation successfully.
    pub fn complete(&self, invocation_id: &str, result: Value) -> bool {
        self.send_frame(&ServerFrame::Completion {
            invocation_id: invocation_id.to_owned(),
            result: Some(result),
            error: None,
        })
    }

    /// Complete an invocation with an error.
    pub fn reject(&self, invocation_id: &str, message: &str) -> bool {
        self.send_frame(&ServerFrame::Completion {
            invocation_id: invocation_id.to_owned(),
            result: None,
            error: Some(message.to_owned()),
        })
    }

    /// Close the server end.
    pub fn close(&mut self) {
        self.to_client = None;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
