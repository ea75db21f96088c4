//! Online-presence consumer.
//!
//! Mirrors the server's `online-users` list (one entry per connection)
//! and prepares the collapsed view the UI shows: other users appear
//! once each regardless of tab count, and the caller appears only when
//! more than one of their own connections is online.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use kaartwerk_core::issue::Actor;
use kaartwerk_core::protocol::{ClientAuthFrame, OnlineUser, ServerAuthFrame};
use kaartwerk_core::types::DbId;

use crate::bus::Subscription;
use crate::error::TransportError;
use crate::transport::{TransportHandle, TransportStatus};

/// One row of the collapsed presence display.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayedUser {
    pub user_id: DbId,
    pub username: String,
    pub name: Option<String>,
    /// How many live connections this user has.
    pub sessions: usize,
    pub is_self: bool,
}

#[derive(Default)]
struct PresenceState {
    users: Vec<OnlineUser>,
    /// Whether we have announced ourselves and not retracted it; used
    /// to re-announce after a reconnect.
    announced: bool,
}

/// Client-side view of the presence registry.
pub struct PresenceClient {
    handle: TransportHandle<ServerAuthFrame>,
    actor: Actor,
    state: Arc<Mutex<PresenceState>>,
    subscription: Subscription<ServerAuthFrame>,
    cancel: CancellationToken,
}

impl PresenceClient {
    /// Attach to the auth-channel transport.
    pub async fn new(handle: TransportHandle<ServerAuthFrame>, actor: Actor) -> Self {
        let state = Arc::new(Mutex::new(PresenceState::default()));
        let cancel = CancellationToken::new();

        let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<ServerAuthFrame>();
        let subscription = handle
            .subscribe(move |frame| {
                let _ = frame_tx.send(frame.clone());
            })
            .await;

        let apply_state = Arc::clone(&state);
        let apply_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = apply_cancel.cancelled() => return,
                    frame = frame_rx.recv() => {
                        let Some(frame) = frame else { return };
                        if let ServerAuthFrame::OnlineUsers(users) = frame {
                            apply_state.lock().await.users = users;
                        }
                    }
                }
            }
        });

        let client = Self {
            handle,
            actor,
            state,
            subscription,
            cancel,
        };
        client.spawn_reannounce_task();
        client
    }

    /// Announce this connection's user as online.
    pub async fn set_online(&self) -> Result<(), TransportError> {
        self.state.lock().await.announced = true;
        self.send_online().await
    }

    /// Retract this connection's presence entry.
    pub async fn set_offline(&self) -> Result<(), TransportError> {
        self.state.lock().await.announced = false;
        self.handle.send(&ClientAuthFrame::UserOffline {}).await
    }

    /// Raw per-connection presence list as last broadcast.
    pub async fn online_users(&self) -> Vec<OnlineUser> {
        self.state.lock().await.users.clone()
    }

    /// The collapsed presence list for display.
    pub async fn displayed_users(&self) -> Vec<DisplayedUser> {
        collapse(&self.state.lock().await.users, self.actor.user_id)
    }

    /// Remove the frame subscription and stop the background tasks.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.subscription.unsubscribe().await;
    }

    /// Re-announce presence after every reconnect, if announced.
    fn spawn_reannounce_task(&self) {
        let mut status_rx = self.handle.status();
        let handle = self.handle.clone();
        let actor = self.actor.clone();
        let state = Arc::clone(&self.state);
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let mut last_generation = status_rx.borrow().generation;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    changed = status_rx.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                }

                let current = *status_rx.borrow();
                if current.status != TransportStatus::Open || current.generation == last_generation
                {
                    continue;
                }
                let is_reconnect = last_generation > 0;
                last_generation = current.generation;
                if !is_reconnect || !state.lock().await.announced {
                    continue;
                }

                tracing::info!("Re-announcing presence after reconnect");
                let frame = ClientAuthFrame::UserOnline {
                    username: actor.username.clone(),
                    name: Some(actor.display_name.clone()),
                    user_id: actor.user_id,
                };
                if let Err(e) = handle.send(&frame).await {
                    tracing::warn!(error = %e, "Failed to re-announce presence");
                }
            }
        });
    }

    async fn send_online(&self) -> Result<(), TransportError> {
        self.handle
            .send(&ClientAuthFrame::UserOnline {
                username: self.actor.username.clone(),
                name: Some(self.actor.display_name.clone()),
                user_id: self.actor.user_id,
            })
            .await
    }
}

/// Collapse the per-connection list to a display list.
///
/// Other users keep their first-seen order and appear once with a
/// session count. The caller's own entry is included only when they
/// have more than one live connection, so a user editing from two tabs
/// is told so without always seeing themselves listed.
fn collapse(users: &[OnlineUser], own_user_id: DbId) -> Vec<DisplayedUser> {
    let mut display: Vec<DisplayedUser> = Vec::new();

    for user in users {
        if let Some(existing) = display.iter_mut().find(|d| d.user_id == user.user_id) {
            existing.sessions += 1;
            continue;
        }
        display.push(DisplayedUser {
            user_id: user.user_id,
            username: user.username.clone(),
            name: user.name.clone(),
            sessions: 1,
            is_self: user.user_id == own_user_id,
        });
    }

    display.retain(|d| !d.is_self || d.sessions > 1);
    display
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn user(peer: &str, user_id: DbId, username: &str) -> OnlineUser {
        OnlineUser {
            peer_id: peer.to_string(),
            username: username.to_string(),
            name: Some(username.to_string()),
            user_id,
            connected_at: 0,
        }
    }

    #[test]
    fn other_users_collapse_to_one_entry_each() {
        let users = vec![
            user("p1", 7, "alice"),
            user("p2", 8, "bob"),
            user("p3", 8, "bob"),
        ];
        let display = collapse(&users, 99);

        assert_eq!(display.len(), 2);
        assert_eq!(display[0].username, "alice");
        assert_eq!(display[0].sessions, 1);
        assert_eq!(display[1].username, "bob");
        assert_eq!(display[1].sessions, 2);
        assert!(display.iter().all(|d| !d.is_self));
    }

    #[test]
    fn own_single_session_is_hidden() {
        let users = vec![user("p1", 7, "alice"), user("p2", 8, "bob")];
        let display = collapse(&users, 7);

        assert_eq!(display.len(), 1);
        assert_eq!(display[0].username, "bob");
    }

    #[test]
    fn own_multiple_sessions_are_surfaced_once() {
        let users = vec![
            user("p1", 7, "alice"),
            user("p2", 7, "alice"),
            user("p3", 8, "bob"),
        ];
        let display = collapse(&users, 7);

        assert_eq!(display.len(), 2);
        let own = display.iter().find(|d| d.is_self).expect("own entry");
        assert_eq!(own.sessions, 2);
    }

    #[test]
    fn empty_list_collapses_to_empty() {
        assert!(collapse(&[], 7).is_empty());
    }
}
