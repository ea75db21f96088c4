//! Wire protocol for the two WebSocket channels.
//!
//! Every frame is a JSON object `{ "type": <string>, "payload": <object> }`,
//! modeled as adjacently-tagged serde enums so that clients can route
//! messages by the `type` string.
//!
//! The **auth channel** multiplexes edit-lock and presence traffic for
//! authenticated editors. The **notify channel** relays issue change
//! events to every connected viewer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::event::ChangeEvent;
use crate::issue::IssueSnapshot;
use crate::types::{DbId, PeerId};

// ---------------------------------------------------------------------------
// Shared payload types
// ---------------------------------------------------------------------------

/// One entry of the server's lock table, as broadcast in `editing-status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockInfo {
    /// Connection identity of the holder.
    pub peer: PeerId,
    pub username: String,
    pub display_name: String,
}

/// Full lock table keyed by issue id. Serialized as a JSON object with
/// stringified integer keys.
pub type LockTableView = BTreeMap<DbId, LockInfo>;

/// One entry of the presence list, as broadcast in `online-users`.
///
/// One entry per connection, not per user — a user with two tabs
/// appears twice, distinguished by `peer_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineUser {
    pub peer_id: PeerId,
    pub username: String,
    pub name: Option<String>,
    pub user_id: DbId,
    /// Unix epoch milliseconds when this connection came online.
    pub connected_at: i64,
}

// ---------------------------------------------------------------------------
// Auth channel — client to server
// ---------------------------------------------------------------------------

/// Intents an editor sends on the auth channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientAuthFrame {
    /// Claim the edit lock on an issue.
    #[serde(rename = "lockIssue", rename_all = "camelCase")]
    LockIssue {
        issue_id: DbId,
        username: String,
        display_name: String,
    },

    /// Release the edit lock on an issue.
    #[serde(rename = "unlockIssue", rename_all = "camelCase")]
    UnlockIssue {
        issue_id: DbId,
        username: String,
        display_name: String,
    },

    /// Release every lock held by this connection. Sent after a reconnect
    /// when the client no longer knows which issue it was editing.
    #[serde(rename = "clearMyLocks", rename_all = "camelCase")]
    ClearMyLocks {
        username: String,
        display_name: String,
    },

    /// The authenticated user behind this connection is now online.
    #[serde(rename = "user-online", rename_all = "camelCase")]
    UserOnline {
        username: String,
        name: Option<String>,
        user_id: DbId,
    },

    /// This connection's user is going offline (logout, tab close).
    #[serde(rename = "user-offline")]
    UserOffline {},
}

// ---------------------------------------------------------------------------
// Auth channel — server to client
// ---------------------------------------------------------------------------

/// Frames the server sends on the auth channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerAuthFrame {
    /// Full lock table, broadcast after every lock mutation and sent to
    /// every connection immediately on open.
    #[serde(rename = "editing-status")]
    EditingStatus(LockTableView),

    /// Full presence list, broadcast after every presence change.
    #[serde(rename = "online-users")]
    OnlineUsers(Vec<OnlineUser>),

    /// This connection's own identity, sent once immediately on open.
    #[serde(rename = "peer-connected")]
    PeerConnected(PeerId),
}

// ---------------------------------------------------------------------------
// Notify channel — server to client
// ---------------------------------------------------------------------------

/// Change-event frames relayed verbatim to every notify-channel viewer,
/// including the actor's own connection. Clients recognize their own
/// actions via the attached actor user id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum NotifyFrame {
    #[serde(rename = "issue-created", rename_all = "camelCase")]
    IssueCreated {
        #[serde(flatten)]
        issue: IssueSnapshot,
        created_by: String,
        created_by_user_id: DbId,
    },

    #[serde(rename = "issue-modified", rename_all = "camelCase")]
    IssueModified {
        #[serde(flatten)]
        issue: IssueSnapshot,
        modified_by: String,
        modified_by_user_id: DbId,
    },

    #[serde(rename = "issue-deleted", rename_all = "camelCase")]
    IssueDeleted {
        id: DbId,
        title: String,
        deleted_by: String,
        deleted_by_user_id: DbId,
    },
}

impl From<ChangeEvent> for NotifyFrame {
    fn from(event: ChangeEvent) -> Self {
        match event {
            ChangeEvent::Created {
                issue,
                created_by,
                created_by_user_id,
            } => NotifyFrame::IssueCreated {
                issue,
                created_by,
                created_by_user_id,
            },
            ChangeEvent::Modified {
                issue,
                modified_by,
                modified_by_user_id,
            } => NotifyFrame::IssueModified {
                issue,
                modified_by,
                modified_by_user_id,
            },
            ChangeEvent::Deleted {
                id,
                title,
                deleted_by,
                deleted_by_user_id,
            } => NotifyFrame::IssueDeleted {
                id,
                title,
                deleted_by,
                deleted_by_user_id,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
