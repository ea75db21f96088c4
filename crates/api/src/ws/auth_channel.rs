//! Authenticated coordination channel: edit locks and online presence.
//!
//! Every connection gets a fresh peer id and an immediate greeting
//! (`peer-connected` + the current `editing-status` snapshot). Lock and
//! presence intents are only honored on connections that presented a
//! valid access token; anonymous connections may still observe the
//! broadcasts.
//!
//! When a connection closes, its locks and presence entry are *not*
//! removed immediately: delayed sweeps give a quickly-reconnecting
//! client (page refresh, flaky network) a window to re-assert its state
//! before the rest of the room sees it vanish.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;

use kaartwerk_core::protocol::{ClientAuthFrame, ServerAuthFrame};
use kaartwerk_core::types::PeerId;

use crate::auth::jwt::validate_token;
use crate::auth::Identity;
use crate::state::AppState;

/// Query parameters accepted on the upgrade request.
#[derive(Debug, Deserialize)]
pub struct AuthQuery {
    /// Optional access token. The browser WebSocket API cannot set an
    /// `Authorization` header, so the token travels as a query param.
    pub token: Option<String>,
}

/// HTTP handler that upgrades to the auth WebSocket channel.
pub async fn auth_ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<AuthQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let identity = query.token.as_deref().and_then(|token| {
        match validate_token(token, &state.config.jwt) {
            Ok(claims) => Some(Identity::from(claims)),
            Err(e) => {
                tracing::debug!(error = %e, "Rejecting auth-channel token");
                None
            }
        }
    });
    ws.on_upgrade(move |socket| handle_socket(socket, state, identity))
}

/// Manage a single auth-channel connection after upgrade.
///
/// Splits the socket into a sink (outbound) and stream (inbound), then:
///   1. Registers the connection and greets it with its peer id plus the
///      current lock-table snapshot.
///   2. Spawns a sender task that forwards messages from the manager
///      channel.
///   3. Dispatches inbound frames on the current task.
///   4. On disconnect, removes the connection and schedules the delayed
///      lock and presence sweeps.
async fn handle_socket(socket: WebSocket, state: AppState, identity: Option<Identity>) {
    let peer: PeerId = uuid::Uuid::new_v4().to_string();
    tracing::info!(
        peer = %peer,
        authenticated = identity.is_some(),
        "Auth channel connected",
    );

    // Register and get the receiver for outbound messages.
    let mut rx = state.auth_channel.add(peer.clone(), identity.clone()).await;

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

    // Greeting: the connection's own identity first, then the current
    // lock table so a client opening an edit form never starts blind.
    send_frame(&state, &peer, &ServerAuthFrame::PeerConnected(peer.clone())).await;
    let snapshot = state.locks.snapshot().await;
    send_frame(&state, &peer, &ServerAuthFrame::EditingStatus(snapshot)).await;

    // Receiver loop: dispatch inbound frames.
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(peer = %peer, "Pong received");
            }
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientAuthFrame>(&text) {
                Ok(frame) => dispatch(&state, &peer, identity.as_ref(), frame).await,
                Err(e) => {
                    tracing::warn!(peer = %peer, error = %e, "Malformed auth-channel frame");
                }
            },
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(peer = %peer, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    // Clean up: remove the connection, abort the sender, and schedule
    // the delayed sweeps.
    state.auth_channel.remove(&peer).await;
    send_task.abort();
    tracing::info!(peer = %peer, "Auth channel disconnected");

    spawn_disconnect_sweeps(state, peer);
}

/// Route one client frame to the matching registry operation.
///
/// Lock and presence mutations require a verified identity; frames from
/// anonymous connections are logged and dropped, never answered.
async fn dispatch(state: &AppState, peer: &PeerId, identity: Option<&Identity>, frame: ClientAuthFrame) {
    let Some(identity) = identity else {
        tracing::warn!(peer = %peer, "Dropping mutation frame from anonymous connection");
        return;
    };

    match frame {
        ClientAuthFrame::LockIssue {
            issue_id,
            username,
            display_name,
        } => {
            let outcome = state
                .locks
                .acquire(issue_id, peer, &username, &display_name)
                .await;
            let frame = ServerAuthFrame::EditingStatus(outcome.table);
            if outcome.granted {
                tracing::debug!(peer = %peer, issue_id, "Lock acquired");
                broadcast_frame(state, peer, &frame).await;
            }
            // On rejection only the caller learns the current table; the
            // rest of the room already has it.
            send_frame(state, peer, &frame).await;
        }

        ClientAuthFrame::UnlockIssue { issue_id, .. } => {
            match state.locks.release(issue_id, peer).await {
                Some(table) => {
                    tracing::debug!(peer = %peer, issue_id, "Lock released");
                    let frame = ServerAuthFrame::EditingStatus(table);
                    broadcast_frame(state, peer, &frame).await;
                    send_frame(state, peer, &frame).await;
                }
                // Not the holder: silent no-op.
                None => {
                    tracing::debug!(peer = %peer, issue_id, "Unlock ignored, not the holder");
                }
            }
        }

        ClientAuthFrame::ClearMyLocks { .. } => {
            let (removed, table) = state.locks.release_all(peer).await;
            let frame = ServerAuthFrame::EditingStatus(table);
            if removed > 0 {
                tracing::debug!(peer = %peer, removed, "Cleared held locks");
                broadcast_frame(state, peer, &frame).await;
            }
            // Always answer the caller so a reconnecting client can
            // settle its UI even when it held nothing.
            send_frame(state, peer, &frame).await;
        }

        ClientAuthFrame::UserOnline { username, name, .. } => {
            // The user id comes from the verified token, never from the
            // frame; the display fields are the client's to choose.
            let users = state
                .presence
                .mark_online(peer, identity.user_id, &username, name.as_deref())
                .await;
            let frame = ServerAuthFrame::OnlineUsers(users);
            broadcast_frame(state, peer, &frame).await;
            send_frame(state, peer, &frame).await;
        }

        ClientAuthFrame::UserOffline {} => {
            if let Some(users) = state.presence.mark_offline(peer).await {
                let frame = ServerAuthFrame::OnlineUsers(users);
                broadcast_frame(state, peer, &frame).await;
                send_frame(state, peer, &frame).await;
            }
        }
    }
}

/// Schedule the delayed lock and presence sweeps for a closed connection.
///
/// The delays are deliberate: a page refresh produces a close followed
/// by a new connection within a few hundred milliseconds, and the old
/// connection's locks should not flicker away in between. When the sweep
/// does remove something, everyone still connected gets the updated
/// table.
fn spawn_disconnect_sweeps(state: AppState, peer: PeerId) {
    let lock_state = state.clone();
    let lock_peer = peer.clone();
    tokio::spawn(async move {
        tokio::time::sleep(lock_state.config.sweep.lock_delay).await;
        let (removed, table) = lock_state.locks.release_all(&lock_peer).await;
        if removed > 0 {
            tracing::debug!(peer = %lock_peer, removed, "Swept locks after disconnect");
            broadcast_frame(&lock_state, &lock_peer, &ServerAuthFrame::EditingStatus(table)).await;
        }
    });

    tokio::spawn(async move {
        tokio::time::sleep(state.config.sweep.presence_delay).await;
        if let Some(users) = state.presence.mark_offline(&peer).await {
            tracing::debug!(peer = %peer, "Swept presence after disconnect");
            broadcast_frame(&state, &peer, &ServerAuthFrame::OnlineUsers(users)).await;
        }
    });
}

/// Serialize a server frame and queue it for one connection.
async fn send_frame(state: &AppState, peer: &PeerId, frame: &ServerAuthFrame) {
    match serde_json::to_string(frame) {
        Ok(json) => {
            state
                .auth_channel
                .send_to(peer, Message::Text(json.into()))
                .await;
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize auth frame");
        }
    }
}

/// Serialize a server frame and queue it for every connection except the
/// originator (which receives its own dedicated echo).
async fn broadcast_frame(state: &AppState, origin: &PeerId, frame: &ServerAuthFrame) {
    match serde_json::to_string(frame) {
        Ok(json) => {
            state
                .auth_channel
                .broadcast_except(origin, Message::Text(json.into()))
                .await;
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize auth frame");
        }
    }
}
