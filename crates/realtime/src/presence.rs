//! Presence registry: which authenticated connections are online.
//!
//! One entry per connection, not per user — a user with two open tabs
//! has two entries, distinguishable by peer id. Collapsing duplicates
//! for display is the client's job; the raw per-connection map stays the
//! source of truth so lock-ownership comparisons can tell a user's own
//! other tab apart from a different user.

use std::collections::HashMap;

use tokio::sync::Mutex;

use kaartwerk_core::protocol::OnlineUser;
use kaartwerk_core::types::{DbId, PeerId, Timestamp};

/// One authenticated live connection.
#[derive(Debug, Clone)]
struct PresenceEntry {
    username: String,
    name: Option<String>,
    user_id: DbId,
    connected_at: Timestamp,
}

/// Registry of online connections, keyed by connection identity.
#[derive(Default)]
pub struct PresenceTable {
    entries: Mutex<HashMap<PeerId, PresenceEntry>>,
}

impl PresenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert the presence entry for `peer` and return the updated list.
    ///
    /// Upsert rather than insert: a duplicate `user-online` from the
    /// same connection (e.g. re-asserted after a reconnect the server
    /// never noticed) must not create a second entry.
    pub async fn mark_online(
        &self,
        peer: &PeerId,
        user_id: DbId,
        username: &str,
        name: Option<&str>,
    ) -> Vec<OnlineUser> {
        let mut entries = self.entries.lock().await;
        let connected_at = entries
            .get(peer)
            .map(|existing| existing.connected_at)
            .unwrap_or_else(chrono::Utc::now);

        entries.insert(
            peer.clone(),
            PresenceEntry {
                username: username.to_string(),
                name: name.map(str::to_string),
                user_id,
                connected_at,
            },
        );
        tracing::info!(peer = %peer, user_id, "{username} is now online");

        Self::list_of(&entries)
    }

    /// Remove the entry for exactly this connection.
    ///
    /// Never touches other connections of the same user. Returns the
    /// updated list when an entry was removed, `None` when the peer was
    /// not marked online (nothing to broadcast).
    pub async fn mark_offline(&self, peer: &PeerId) -> Option<Vec<OnlineUser>> {
        let mut entries = self.entries.lock().await;
        let removed = entries.remove(peer)?;
        tracing::info!(peer = %peer, user_id = removed.user_id, "{} is now offline", removed.username);
        Some(Self::list_of(&entries))
    }

    /// Current presence list.
    pub async fn snapshot(&self) -> Vec<OnlineUser> {
        Self::list_of(&*self.entries.lock().await)
    }

    fn list_of(entries: &HashMap<PeerId, PresenceEntry>) -> Vec<OnlineUser> {
        let mut list: Vec<OnlineUser> = entries
            .iter()
            .map(|(peer, entry)| OnlineUser {
                peer_id: peer.clone(),
                username: entry.username.clone(),
                name: entry.name.clone(),
                user_id: entry.user_id,
                connected_at: entry.connected_at.timestamp_millis(),
            })
            .collect();
        // Deterministic order for broadcasts and tests.
        list.sort_by(|a, b| (a.connected_at, &a.peer_id).cmp(&(b.connected_at, &b.peer_id)));
        list
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
