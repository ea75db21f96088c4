//! Change events raised by the issue store after each committed mutation.
//!
//! Events are ephemeral: they are relayed to currently-connected viewers
//! and never stored or replayed. A viewer that was offline when an event
//! fired re-fetches the issue list on reconnect instead.

use serde::{Deserialize, Serialize};

use crate::issue::IssueSnapshot;
use crate::types::DbId;

/// A committed create/update/delete, carrying the full record and the
/// acting user's identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChangeEvent {
    Created {
        issue: IssueSnapshot,
        created_by: String,
        created_by_user_id: DbId,
    },
    Modified {
        issue: IssueSnapshot,
        modified_by: String,
        modified_by_user_id: DbId,
    },
    Deleted {
        id: DbId,
        title: String,
        deleted_by: String,
        deleted_by_user_id: DbId,
    },
}

impl ChangeEvent {
    /// Id of the issue this event concerns.
    pub fn issue_id(&self) -> DbId {
        match self {
            ChangeEvent::Created { issue, .. } | ChangeEvent::Modified { issue, .. } => issue.id,
            ChangeEvent::Deleted { id, .. } => *id,
        }
    }

    /// Id of the user that performed the mutation.
    pub fn actor_user_id(&self) -> DbId {
        match self {
            ChangeEvent::Created {
                created_by_user_id, ..
            } => *created_by_user_id,
            ChangeEvent::Modified {
                modified_by_user_id,
                ..
            } => *modified_by_user_id,
            ChangeEvent::Deleted {
                deleted_by_user_id, ..
            } => *deleted_by_user_id,
        }
    }
}

/// Sink the issue store publishes into after each commit.
///
/// Implemented by the change bus in `kaartwerk-events`. The store emits
/// synchronously after each mutation commits, so per-issue event order
/// matches commit order.
pub trait ChangeSink: Send + Sync {
    fn publish(&self, event: ChangeEvent);
}

/// Sink that discards every event. Useful in tests that only exercise
/// the store itself.
#[derive(Debug, Default)]
pub struct NullSink;

impl ChangeSink for NullSink {
    fn publish(&self, _event: ChangeEvent) {}
}
