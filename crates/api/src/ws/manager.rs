use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::ws::Message;
use tokio::sync::{mpsc, RwLock};

use kaartwerk_core::types::{PeerId, Timestamp};

use crate::auth::Identity;

/// Outbound queue depth per connection. A peer that falls this far
/// behind is dropped rather than allowed to stall the channel.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::Sender<Message>;

/// Metadata for a single WebSocket connection.
pub struct WsConnection {
    /// Verified identity, when the connection presented a valid token.
    pub identity: Option<Identity>,
    /// Bounded channel sender for outbound messages to this connection.
    pub sender: WsSender,
    /// When this connection was established.
    pub connected_at: Timestamp,
}

/// Manages all active connections on one WebSocket channel.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// shared across the application. The auth channel and the notify channel
/// each get their own manager.
pub struct WsManager {
    connections: RwLock<HashMap<PeerId, WsConnection>>,
}

impl WsManager {
    /// Create a new, empty connection manager.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new connection.
    ///
    /// Returns the receiver half of the outbound channel so the caller
    /// can forward messages to the WebSocket sink.
    pub async fn add(&self, peer: PeerId, identity: Option<Identity>) -> mpsc::Receiver<Message> {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let conn = WsConnection {
            identity,
            sender: tx,
            connected_at: chrono::Utc::now(),
        };
        self.connections.write().await.insert(peer, conn);
        rx
    }

    /// Remove a connection by its peer id.
    pub async fn remove(&self, peer: &str) {
        self.connections.write().await.remove(peer);
    }

    /// Send a message to one specific connection.
    ///
    /// Returns `false` if the peer is unknown or its queue was full; a
    /// full queue evicts the connection (see [`Self::broadcast`]).
    pub async fn send_to(&self, peer: &str, message: Message) -> bool {
        let stalled = {
            let conns = self.connections.read().await;
            let Some(conn) = conns.get(peer) else {
                return false;
            };
            match conn.sender.try_send(message) {
                Ok(()) => return true,
                Err(mpsc::error::TrySendError::Full(_)) => true,
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        };
        if stalled {
            tracing::warn!(peer = %peer, "Outbound queue full, dropping connection");
            self.connections.write().await.remove(peer);
        }
        false
    }

    /// Broadcast a message to all connected clients.
    ///
    /// Connections whose send channels are closed are silently skipped
    /// (they will be cleaned up on their next receive loop iteration).
    /// Connections whose bounded queue is full are evicted: one stalled
    /// consumer must not delay delivery to everyone else.
    pub async fn broadcast(&self, message: Message) {
        self.broadcast_inner(message, None).await;
    }

    /// Broadcast a message to every connection except `skip`.
    ///
    /// Used when the originating connection receives its own dedicated
    /// echo and must not see the frame twice.
    pub async fn broadcast_except(&self, skip: &str, message: Message) {
        self.broadcast_inner(message, Some(skip)).await;
    }

    async fn broadcast_inner(&self, message: Message, skip: Option<&str>) {
        let mut stalled: Vec<PeerId> = Vec::new();
        {
            let conns = self.connections.read().await;
            for (peer, conn) in conns.iter() {
                if skip.is_some_and(|s| s == peer.as_str()) {
                    continue;
                }
                if let Err(mpsc::error::TrySendError::Full(_)) =
                    conn.sender.try_send(message.clone())
                {
                    stalled.push(peer.clone());
                }
            }
        }
        if !stalled.is_empty() {
            let mut conns = self.connections.write().await;
            for peer in stalled {
                tracing::warn!(peer = %peer, "Outbound queue full, dropping connection");
                conns.remove(&peer);
            }
        }
    }

    /// Return the current number of active connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Send a Close frame to every connection, then clear the map.
    ///
    /// Used during graceful shutdown to notify all clients before the
    /// server stops accepting new connections.
    pub async fn shutdown_all(&self) {
        let mut conns = self.connections.write().await;
        let count = conns.len();
        for conn in conns.values() {
            let _ = conn.sender.try_send(Message::Close(None));
        }
        conns.clear();
        tracing::info!(count, "Closed all WebSocket connections");
    }

    /// Send a Ping frame to every connected client.
    ///
    /// Used by the heartbeat task to keep connections alive and detect
    /// stale ones.
    pub async fn ping_all(&self) {
        let conns = self.connections.read().await;
        for conn in conns.values() {
            let _ = conn.sender.try_send(Message::Ping(Bytes::new()));
        }
    }
}

impl Default for WsManager {
    fn default() -> Self {
        Self::new()
    }
}
