//! Hub connection over a real WebSocket on loopback.

mod common;

use std::sync::{Arc, Mutex};

use beacon_events::{ConnectionStatus, EventBus};
use beacon_link::{AuthCredential, ConnectionConfig, ConnectionState, HubConnection, StaticCredential};
use common::{EventLog, forward, policy};
use futures::{SinkExt, StreamExt};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{WebSocketStream, accept_hdr_async};

/// What the server saw on the upgrade request.
#[derive(Debug, Default)]
struct Upgrade {
    authorization: Option<String>,
    uri: String,
}

async fn accept(listener: &TcpListener) -> (WebSocketStream<TcpStream>, Upgrade) {
    let (stream, _) = listener.accept().await.unwrap();
    let seen = Arc::new(Mutex::new(Upgrade::default()));
    let slot = Arc::clone(&seen);
    let ws = accept_hdr_async(
        stream,
        move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            let mut upgrade = slot.lock().unwrap();
            upgrade.authorization = req
                .headers()
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            upgrade.uri = req.uri().to_string();
            Ok(resp)
        },
    )
    .await
    .unwrap();
    let upgrade = std::mem::take(&mut *seen.lock().unwrap());
    (ws, upgrade)
}

async fn next_json(ws: &mut WebSocketStream<TcpStream>) -> Value {
    loop {
        match ws.next().await.unwrap().unwrap() {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Close(_) => panic!("client closed"),
            _ => {}
        }
    }
}

async fn send_json(ws: &mut WebSocketStream<TcpStream>, frame: Value) {
    ws.send(Message::Text(frame.to_string().into())).await.unwrap();
}

fn mint_token() -> String {
    let exp = chrono::Utc::now().timestamp() + 3_600;
    encode(
        &Header::default(),
        &json!({"sub": "analyst", "exp": exp}),
        &EncodingKey::from_secret(b"loopback"),
    )
    .unwrap()
}

fn connection(url: String, token: &str, bus: EventBus) -> HubConnection {
    let mut config = ConnectionConfig::new(url);
    config.reconnect = policy(3);
    let credential = AuthCredential::from_token(token).unwrap();
    HubConnection::websocket(config, Arc::new(StaticCredential::new(credential)), bus)
}

#[tokio::test]
async fn invoke_and_push_over_websocket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/hubs/analytics", listener.local_addr().unwrap());
    let token = mint_token();

    let conn = connection(url, &token, EventBus::new());
    let (mut alerts, _sub) = forward(conn.bus(), "NewAlert");

    let server = tokio::spawn(async move {
        let (mut ws, upgrade) = accept(&listener).await;
        let call = next_json(&mut ws).await;
        send_json(
            &mut ws,
            json!({
                "type": "completion",
                "invocationId": call["invocationId"],
                "result": {"activeUsers": 3},
            }),
        )
        .await;
        send_json(
            &mut ws,
            json!({"type": "invocation", "target": "NewAlert", "arguments": [{"level": "high"}]}),
        )
        .await;
        (call, upgrade, ws)
    });

    conn.connect().await.unwrap();
    let result = conn.invoke("GetRealTimeDashboard", vec![]).await.unwrap();
    assert_eq!(result, json!({"activeUsers": 3}));
    assert_eq!(alerts.recv().await.unwrap(), json!([{"level": "high"}]));

    let (call, upgrade, _ws) = server.await.unwrap();
    assert_eq!(call["type"], "invocation");
    assert_eq!(call["target"], "GetRealTimeDashboard");
    assert_eq!(call["arguments"], json!([]));
    assert_eq!(upgrade.authorization, Some(format!("Bearer {token}")));
    assert_eq!(upgrade.uri, format!("/hubs/analytics?access_token={token}"));

    conn.disconnect().await.unwrap();
    assert_eq!(conn.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn server_close_triggers_reconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/hubs/analytics", listener.local_addr().unwrap());
    let bus = EventBus::new();
    let log = EventLog::attach(&bus);
    let conn = connection(url, &mint_token(), bus);

    let (connected, (mut first, _)) = tokio::join!(conn.connect(), accept(&listener));
    connected.unwrap();
    first
        .close(Some(CloseFrame {
            code: CloseCode::Away,
            reason: "maintenance".into(),
        }))
        .await
        .unwrap();

    let (_second, upgrade) = accept(&listener).await;
    assert!(upgrade.authorization.is_some());

    let mut state = conn.watch_state();
    let _ = state.wait_for(|s| *s == ConnectionState::Connected).await.unwrap();
    let statuses = log.statuses();
    assert_eq!(
        statuses,
        vec![
            ConnectionStatus::Connected,
            ConnectionStatus::Disconnected,
            ConnectionStatus::Reconnected,
        ]
    );
    let disconnected = &log.all()[1];
    assert_eq!(disconnected.attempt, Some(1));
    assert_eq!(
        disconnected.error.as_deref(),
        Some("connection closed: maintenance")
    );
}
