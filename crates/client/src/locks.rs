//! Edit-lock consumer.
//!
//! Tracks the server's `editing-status` table and this connection's own
//! peer id, and sends lock intents on behalf of the editing UI. Lock
//! ownership comparisons use peer identity, not user identity: the same
//! user editing from a second tab is "someone else" for locking
//! purposes.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use kaartwerk_core::issue::Actor;
use kaartwerk_core::protocol::{ClientAuthFrame, LockInfo, LockTableView, ServerAuthFrame};
use kaartwerk_core::types::{DbId, PeerId};

use crate::bus::Subscription;
use crate::error::TransportError;
use crate::transport::{TransportHandle, TransportStatus};

#[derive(Default)]
struct LockState {
    /// Our connection identity, learned from `peer-connected`.
    peer_id: Option<PeerId>,
    /// Latest full lock table from the server.
    table: LockTableView,
    /// The issue we last asked to lock and have not released since.
    /// Re-sent after a reconnect to recover the claim.
    last_intent: Option<DbId>,
}

/// Client-side view of the edit-lock registry.
pub struct LockClient {
    handle: TransportHandle<ServerAuthFrame>,
    actor: Actor,
    state: Arc<Mutex<LockState>>,
    subscription: Subscription<ServerAuthFrame>,
    cancel: CancellationToken,
}

impl LockClient {
    /// Attach to the auth-channel transport.
    ///
    /// Installs a frame subscription and a reconnect watcher; both are
    /// removed by [`shutdown`](Self::shutdown).
    pub async fn new(handle: TransportHandle<ServerAuthFrame>, actor: Actor) -> Self {
        let state = Arc::new(Mutex::new(LockState::default()));
        let cancel = CancellationToken::new();

        // Bus callbacks must not block: enqueue the frame, apply it on
        // our own task.
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
                        let mut state = apply_state.lock().await;
                        match frame {
                            ServerAuthFrame::EditingStatus(table) => state.table = table,
                            ServerAuthFrame::PeerConnected(peer) => {
                                tracing::debug!(peer = %peer, "Assigned peer id");
                                state.peer_id = Some(peer);
                            }
                            ServerAuthFrame::OnlineUsers(_) => {}
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
        client.spawn_reassert_task();
        client
    }

    /// Ask the server for the edit lock on `issue_id`.
    ///
    /// The answer arrives as an `editing-status` frame; check
    /// [`lock_holder`](Self::lock_holder) afterwards to see who won.
    pub async fn lock_issue(&self, issue_id: DbId) -> Result<(), TransportError> {
        self.state.lock().await.last_intent = Some(issue_id);
        self.handle
            .send(&ClientAuthFrame::LockIssue {
                issue_id,
                username: self.actor.username.clone(),
                display_name: self.actor.display_name.clone(),
            })
            .await
    }

    /// Release the edit lock on `issue_id`.
    pub async fn unlock_issue(&self, issue_id: DbId) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        if state.last_intent == Some(issue_id) {
            state.last_intent = None;
        }
        drop(state);

        self.handle
            .send(&ClientAuthFrame::UnlockIssue {
                issue_id,
                username: self.actor.username.clone(),
                display_name: self.actor.display_name.clone(),
            })
            .await
    }

    /// Release every lock this connection holds.
    pub async fn clear_my_locks(&self) -> Result<(), TransportError> {
        self.state.lock().await.last_intent = None;
        self.send_clear().await
    }

    /// Current lock table as last broadcast by the server.
    pub async fn lock_table(&self) -> LockTableView {
        self.state.lock().await.table.clone()
    }

    /// Who holds the lock on `issue_id`, if anyone.
    pub async fn lock_holder(&self, issue_id: DbId) -> Option<LockInfo> {
        self.state.lock().await.table.get(&issue_id).cloned()
    }

    /// Whether a connection other than this one holds `issue_id`.
    ///
    /// Until the server has told us our own peer id, any holder counts
    /// as "other".
    pub async fn is_locked_by_other(&self, issue_id: DbId) -> bool {
        let state = self.state.lock().await;
        match state.table.get(&issue_id) {
            Some(info) => state.peer_id.as_ref() != Some(&info.peer),
            None => false,
        }
    }

    /// This connection's identity, once `peer-connected` has arrived.
    pub async fn own_peer_id(&self) -> Option<PeerId> {
        self.state.lock().await.peer_id.clone()
    }

    /// Remove the frame subscription and stop the background tasks.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.subscription.unsubscribe().await;
    }

    /// Watch for reconnects and re-assert lock state on each one.
    ///
    /// After a reconnect the server has a fresh, empty view of this
    /// connection: re-claim the last intent, or send an explicit
    /// clear-all so no orphaned lock from the previous connection
    /// survives a sweep race.
    fn spawn_reassert_task(&self) {
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
                if !is_reconnect {
                    continue;
                }

                let intent = state.lock().await.last_intent;
                let result = match intent {
                    Some(issue_id) => {
                        tracing::info!(issue_id, "Re-asserting lock intent after reconnect");
                        handle
                            .send(&ClientAuthFrame::LockIssue {
                                issue_id,
                                username: actor.username.clone(),
                                display_name: actor.display_name.clone(),
                            })
                            .await
                    }
                    None => {
                        tracing::info!("No lock intent, clearing stale locks after reconnect");
                        handle
                            .send(&ClientAuthFrame::ClearMyLocks {
                                username: actor.username.clone(),
                                display_name: actor.display_name.clone(),
                            })
                            .await
                    }
                };
                if let Err(e) = result {
                    tracing::warn!(error = %e, "Failed to re-assert lock state");
                }
            }
        });
    }

    async fn send_clear(&self) -> Result<(), TransportError> {
        self.handle
            .send(&ClientAuthFrame::ClearMyLocks {
                username: self.actor.username.clone(),
                display_name: self.actor.display_name.clone(),
            })
            .await
    }
}
