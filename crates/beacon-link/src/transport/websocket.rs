//! WebSocket transport over `tokio-tungstenite`.
//!
//! The bearer token is presented twice on every handshake: as an
//! `Authorization` header and as an `access_token` query parameter, for
//! servers that cannot read headers on upgrade requests.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{AUTHORIZATION, HeaderValue};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;
use url::Url;

use super::{ConnectTarget, Connector, TransportChannel};
use crate::errors::TransportError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens WebSocket channels.
#[derive(Clone, Copy, Debug, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    /// Create a connector.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, target: &ConnectTarget) -> Result<Box<dyn TransportChannel>, TransportError> {
        let connect_error = |reason: String| TransportError::Connect {
            url: target.url.clone(),
            reason,
        };

        let token = target.credential.token();
        let url = url_with_access_token(&target.url, token)
            .map_err(|e| connect_error(format!("invalid URL: {e}")))?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| connect_error(format!("invalid URL: {e}")))?;
        let header = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| connect_error("token is not a valid header value".into()))?;
        let _ = request.headers_mut().insert(AUTHORIZATION, header);

        let (ws, response) = connect_async(request)
            .await
            .map_err(|e| connect_error(e.to_string()))?;
        debug!(url = %target.url, status = %response.status(), "websocket handshake complete");

        Ok(Box::new(WebSocketChannel { ws, closed: false }))
    }
}

struct WebSocketChannel {
    ws: WsStream,
    closed: bool,
}

#[async_trait]
impl TransportChannel for WebSocketChannel {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::closed());
        }
        self.ws
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn recv_text(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.ws.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(bytes)) => {
                    return Some(String::from_utf8(bytes.to_vec()).map_err(|_| {
                        TransportError::Protocol("binary frame is not UTF-8".into())
                    }));
                }
                Ok(Message::Close(frame)) => {
                    let reason = frame
                        .map(|f| f.reason.as_str().to_owned())
                        .filter(|r| !r.is_empty());
                    return Some(Err(TransportError::Closed { reason }));
                }
                // Control frames are answered by tungstenite itself.
                Ok(_) => {}
                Err(e) => return Some(Err(TransportError::Io(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        if std::mem::replace(&mut self.closed, true) {
            return;
        }
        let _ = self.ws.close(None).await;
    }
}

/// Append `access_token=<token>` to `url`'s query string.
///
/// Any fragment stays after the query.
pub fn url_with_access_token(url: &str, token: &str) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(url)?;
    let _ = url.query_pairs_mut().append_pair("access_token", token);
    Ok(url)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
