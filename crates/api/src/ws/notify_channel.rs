//! Public notify channel: relays issue change events to every viewer.
//!
//! No token required; the frames only carry data any map viewer can
//! already fetch over HTTP. Each connection holds its own subscription
//! on the change bus, so a disconnect cleans up after itself instead of
//! leaking a listener on a shared emitter.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;

use kaartwerk_core::protocol::NotifyFrame;
use kaartwerk_core::types::PeerId;

use crate::state::AppState;

/// HTTP handler that upgrades to the notify WebSocket channel.
pub async fn notify_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Manage a single notify-channel connection after upgrade.
///
/// The connection subscribes to the change bus before the relay starts,
/// so no event published after the upgrade is missed. Events published
/// before the subscription are gone; late joiners see no replay.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let peer: PeerId = uuid::Uuid::new_v4().to_string();
    tracing::info!(peer = %peer, "Notify channel connected");

    let mut events = state.change_bus.subscribe();
    let mut rx = state.notify_channel.add(peer.clone(), None).await;

    let (mut sink, mut stream) = socket.split();

    // Sender task: forward channel messages to the WebSocket sink.
    let sender_peer = peer.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(peer = %sender_peer, "WebSocket sink closed");
                break;
            }
        }
    });

    // Relay task: turn bus events into wire frames for this connection.
    let relay_state = state.clone();
    let relay_peer = peer.clone();
    let relay_task = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let frame = NotifyFrame::from(event);
                    match serde_json::to_string(&frame) {
                        Ok(json) => {
                            relay_state
                                .notify_channel
                                .send_to(&relay_peer, Message::Text(json.into()))
                                .await;
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to serialize notify frame");
                        }
                    }
                }
                // Fell behind the bus buffer; the skipped events are
                // gone, but newer ones still flow.
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(peer = %relay_peer, skipped, "Notify subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // Receiver loop: viewers send nothing meaningful; watch for close.
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(peer = %peer, "Pong received");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(peer = %peer, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    // Clean up: dropping the subscription happens with the relay task.
    state.notify_channel.remove(&peer).await;
    relay_task.abort();
    send_task.abort();
    tracing::info!(peer = %peer, "Notify channel disconnected");
}
