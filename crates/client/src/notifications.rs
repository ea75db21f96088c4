//! Issue change-event consumer.
//!
//! Subscribes to the notify transport, classifies each relay frame as
//! the caller's own action or a peer's, suppresses duplicate notices,
//! and maintains a local mirror of the issue list so the map can update
//! without a re-fetch.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use kaartwerk_core::issue::IssueSnapshot;
use kaartwerk_core::protocol::NotifyFrame;
use kaartwerk_core::types::DbId;

use crate::bus::Subscription;
use crate::transport::TransportHandle;

/// A second notice with identical content inside this window is
/// swallowed rather than shown twice.
const NOTICE_DEDUP_WINDOW: Duration = Duration::from_secs(2);

/// Capacity of the notice broadcast channel.
const NOTICE_CHANNEL_CAPACITY: usize = 64;

/// What happened to an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeAction {
    Created,
    Modified,
    Deleted,
}

/// Whether the caller caused the change or someone else did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeOrigin {
    Own,
    Peer,
}

/// A user-facing notification derived from one relay frame.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueNotice {
    pub action: NoticeAction,
    pub origin: NoticeOrigin,
    pub issue_id: DbId,
    pub title: String,
    /// Display name of the user who made the change.
    pub actor: String,
}

struct NotifyState {
    issues: BTreeMap<DbId, IssueSnapshot>,
    last_notice: Option<(IssueNotice, Instant)>,
}

/// Client-side consumer of the notify channel.
pub struct NotificationClient {
    state: Arc<Mutex<NotifyState>>,
    notice_tx: broadcast::Sender<IssueNotice>,
    subscription: Subscription<NotifyFrame>,
    cancel: CancellationToken,
}

impl NotificationClient {
    /// Attach to the notify-channel transport.
    ///
    /// `own_user_id` is used to tell the caller's own actions apart
    /// from peers'.
    pub async fn new(handle: TransportHandle<NotifyFrame>, own_user_id: DbId) -> Self {
        let state = Arc::new(Mutex::new(NotifyState {
            issues: BTreeMap::new(),
            last_notice: None,
        }));
        let (notice_tx, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<NotifyFrame>();
        let subscription = handle
            .subscribe(move |frame| {
                let _ = frame_tx.send(frame.clone());
            })
            .await;

        let apply_state = Arc::clone(&state);
        let apply_tx = notice_tx.clone();
        let apply_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = apply_cancel.cancelled() => return,
                    frame = frame_rx.recv() => {
                        let Some(frame) = frame else { return };
                        apply(&apply_state, &apply_tx, own_user_id, frame).await;
                    }
                }
            }
        });

        Self {
            state,
            notice_tx,
            subscription,
            cancel,
        }
    }

    /// Seed the local issue mirror, typically from an HTTP list fetch
    /// done on (re)connect. Relay frames keep it current afterwards.
    pub async fn seed_issues(&self, issues: Vec<IssueSnapshot>) {
        let mut state = self.state.lock().await;
        state.issues = issues.into_iter().map(|i| (i.id, i)).collect();
    }

    /// Current issue list mirror.
    pub async fn issues(&self) -> Vec<IssueSnapshot> {
        self.state.lock().await.issues.values().cloned().collect()
    }

    /// Subscribe to user-facing notices.
    pub fn subscribe_notices(&self) -> broadcast::Receiver<IssueNotice> {
        self.notice_tx.subscribe()
    }

    /// Remove the frame subscription and stop the background task.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.subscription.unsubscribe().await;
    }
}

/// Apply one relay frame: update the mirror, then emit a notice unless
/// it duplicates the previous one within the dedup window.
async fn apply(
    state: &Mutex<NotifyState>,
    notice_tx: &broadcast::Sender<IssueNotice>,
    own_user_id: DbId,
    frame: NotifyFrame,
) {
    let notice = {
        let mut state = state.lock().await;
        let notice = match frame {
            NotifyFrame::IssueCreated {
                issue,
                created_by,
                created_by_user_id,
            } => {
                let notice = IssueNotice {
                    action: NoticeAction::Created,
                    origin: origin_of(created_by_user_id, own_user_id),
                    issue_id: issue.id,
                    title: issue.title.clone(),
                    actor: created_by,
                };
                state.issues.insert(issue.id, issue);
                notice
            }
            NotifyFrame::IssueModified {
                issue,
                modified_by,
                modified_by_user_id,
            } => {
                let notice = IssueNotice {
                    action: NoticeAction::Modified,
                    origin: origin_of(modified_by_user_id, own_user_id),
                    issue_id: issue.id,
                    title: issue.title.clone(),
                    actor: modified_by,
                };
                state.issues.insert(issue.id, issue);
                notice
            }
            NotifyFrame::IssueDeleted {
                id,
                title,
                deleted_by,
                deleted_by_user_id,
            } => {
                state.issues.remove(&id);
                IssueNotice {
                    action: NoticeAction::Deleted,
                    origin: origin_of(deleted_by_user_id, own_user_id),
                    issue_id: id,
                    title,
                    actor: deleted_by,
                }
            }
        };

        let now = Instant::now();
        let duplicate = matches!(
            &state.last_notice,
            Some((prev, at)) if *prev == notice && now.duration_since(*at) < NOTICE_DEDUP_WINDOW
        );
        if duplicate {
            tracing::debug!(issue_id = notice.issue_id, "Suppressing duplicate notice");
            None
        } else {
            state.last_notice = Some((notice.clone(), now));
            Some(notice)
        }
    };

    if let Some(notice) = notice {
        // A send error only means no one is listening for notices yet.
        let _ = notice_tx.send(notice);
    }
}

fn origin_of(actor_user_id: DbId, own_user_id: DbId) -> NoticeOrigin {
    if actor_user_id == own_user_id {
        NoticeOrigin::Own
    } else {
        NoticeOrigin::Peer
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
