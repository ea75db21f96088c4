//! Edit-lock registry: at most one connection may edit an issue at a time.
//!
//! All mutations run under a single async mutex so the check-then-set in
//! [`LockTable::acquire`] is atomic: of two racing acquire intents for
//! the same issue, exactly one is granted. Every operation hands back a
//! full-table snapshot so the caller can broadcast the complete
//! `editing-status` map rather than a diff.

use std::collections::BTreeMap;

use tokio::sync::Mutex;

use kaartwerk_core::protocol::{LockInfo, LockTableView};
use kaartwerk_core::types::{DbId, PeerId};

/// Result of an acquire intent.
#[derive(Debug, Clone)]
pub struct AcquireOutcome {
    /// Whether the caller now holds the lock.
    pub granted: bool,
    /// Snapshot of the full lock table after the attempt. On rejection
    /// this is the unchanged table, so the caller's UI can render
    /// "locked by X" without retrying.
    pub table: LockTableView,
}

/// Registry of currently held edit locks, keyed by issue id.
#[derive(Default)]
pub struct LockTable {
    entries: Mutex<BTreeMap<DbId, LockInfo>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to claim the lock on `issue_id` for `holder`.
    ///
    /// Granted when the issue is unlocked, or when `holder` already owns
    /// the entry (idempotent re-acquire, e.g. a reconnecting client
    /// recovering its prior state). Rejected when a different connection
    /// holds it; the entry is left untouched.
    pub async fn acquire(
        &self,
        issue_id: DbId,
        holder: &PeerId,
        username: &str,
        display_name: &str,
    ) -> AcquireOutcome {
        let mut entries = self.entries.lock().await;

        if let Some(existing) = entries.get(&issue_id) {
            if existing.peer != *holder {
                tracing::debug!(
                    issue_id,
                    holder = %holder,
                    held_by = %existing.peer,
                    "Lock acquire rejected",
                );
                return AcquireOutcome {
                    granted: false,
                    table: entries.clone(),
                };
            }
        }

        entries.insert(
            issue_id,
            LockInfo {
                peer: holder.clone(),
                username: username.to_string(),
                display_name: display_name.to_string(),
            },
        );
        tracing::info!(issue_id, holder = %holder, "{display_name} is editing issue {issue_id}");

        AcquireOutcome {
            granted: true,
            table: entries.clone(),
        }
    }

    /// Release the lock on `issue_id` if `holder` owns it.
    ///
    /// Returns the updated table when an entry was removed. A release
    /// from a non-holder, or of an issue that is not locked, is a silent
    /// no-op returning `None` — a stale or duplicate message must never
    /// clear someone else's lock.
    pub async fn release(&self, issue_id: DbId, holder: &PeerId) -> Option<LockTableView> {
        let mut entries = self.entries.lock().await;

        match entries.get(&issue_id) {
            Some(existing) if existing.peer == *holder => {
                entries.remove(&issue_id);
                tracing::info!(issue_id, holder = %holder, "Lock released");
                Some(entries.clone())
            }
            Some(existing) => {
                tracing::debug!(
                    issue_id,
                    holder = %holder,
                    held_by = %existing.peer,
                    "Ignoring release from non-holder",
                );
                None
            }
            None => None,
        }
    }

    /// Remove every lock held by `holder`.
    ///
    /// Used both for the explicit `clearMyLocks` intent after a
    /// reconnect and for the delayed disconnect sweep. Returns how many
    /// entries were removed together with the resulting table.
    pub async fn release_all(&self, holder: &PeerId) -> (usize, LockTableView) {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, info| info.peer != *holder);
        let removed = before - entries.len();

        if removed > 0 {
            tracing::info!(holder = %holder, removed, "Cleared all locks for connection");
        }
        (removed, entries.clone())
    }

    /// Current full table, e.g. for the greeting sent to a new connection.
    pub async fn snapshot(&self) -> LockTableView {
        self.entries.lock().await.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
