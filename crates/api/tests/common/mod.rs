//! Shared helpers for integration tests.
//!
//! Tests spin up the real router on an ephemeral port and talk to it
//! over actual WebSocket connections, so upgrade handling, frame
//! serialization, and broadcast routing are all exercised end to end.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use kaartwerk_api::auth::jwt::{generate_access_token, JwtConfig};
use kaartwerk_api::config::ServerConfig;
use kaartwerk_api::routes;
use kaartwerk_api::state::AppState;
use kaartwerk_realtime::SweepConfig;

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Build a test `ServerConfig` with short sweep delays so disconnect
/// cleanup can be observed without slowing the suite down.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        sweep: SweepConfig {
            lock_delay: Duration::from_millis(50),
            presence_delay: Duration::from_millis(100),
        },
        jwt: JwtConfig {
            secret: "integration-test-secret".to_string(),
            access_token_expiry_mins: 60,
        },
    }
}

/// Start the application on an ephemeral port.
///
/// Returns the bound address and the shared state, so tests can both
/// connect clients and drive the issue store directly.
pub async fn spawn_server() -> (SocketAddr, AppState) {
    let state = AppState::new(test_config());
    let app = routes::app(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server error");
    });

    (addr, state)
}

/// Mint a valid access token for the given user.
pub fn token_for(user_id: i64, username: &str, name: Option<&str>) -> String {
    generate_access_token(user_id, username, name, &test_config().jwt).expect("sign token")
}

/// Open an authenticated connection on the coordination channel.
pub async fn connect_auth(addr: SocketAddr, token: &str) -> WsClient {
    let url = format!("ws://{addr}/api/v1/ws/auth?token={token}");
    let (ws, _) = connect_async(url).await.expect("ws connect");
    ws
}

/// Open an anonymous connection on the coordination channel.
pub async fn connect_auth_anonymous(addr: SocketAddr) -> WsClient {
    let url = format!("ws://{addr}/api/v1/ws/auth");
    let (ws, _) = connect_async(url).await.expect("ws connect");
    ws
}

/// Open a connection on the notify channel.
pub async fn connect_notify(addr: SocketAddr) -> WsClient {
    let url = format!("ws://{addr}/api/v1/ws/notify");
    let (ws, _) = connect_async(url).await.expect("ws connect");
    ws
}

/// Send one JSON value as a text frame.
pub async fn send_json(ws: &mut WsClient, value: serde_json::Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("ws send");
}

/// Receive the next text frame as JSON, skipping pings, within 2 seconds.
pub async fn recv_json(ws: &mut WsClient) -> serde_json::Value {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let msg = tokio::time::timeout_at(deadline, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("ws receive error");
        match msg {
            Message::Text(text) => return serde_json::from_str(&text).expect("frame is JSON"),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

/// Receive frames until one with the given `type` arrives.
pub async fn recv_until_type(ws: &mut WsClient, frame_type: &str) -> serde_json::Value {
    for _ in 0..16 {
        let value = recv_json(ws).await;
        if value["type"] == frame_type {
            return value;
        }
    }
    panic!("no '{frame_type}' frame within 16 messages");
}

/// Assert that no frame arrives within the given window.
pub async fn assert_silent(ws: &mut WsClient, window: Duration) {
    let result = tokio::time::timeout(window, ws.next()).await;
    if let Ok(Some(Ok(msg))) = result {
        match msg {
            Message::Ping(_) | Message::Pong(_) => {}
            other => panic!("expected silence, got: {other:?}"),
        }
    }
}

/// Drain the two-frame greeting (`peer-connected`, then `editing-status`)
/// and return the assigned peer id.
pub async fn drain_greeting(ws: &mut WsClient) -> String {
    let hello = recv_json(ws).await;
    assert_eq!(hello["type"], "peer-connected");
    let peer = hello["payload"].as_str().expect("peer id").to_string();

    let status = recv_json(ws).await;
    assert_eq!(status["type"], "editing-status");

    peer
}
