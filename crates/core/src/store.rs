//! In-memory issue repository with a change-event commit hook.
//!
//! The coordination core treats persistence as an external collaborator;
//! this store gives that collaborator a concrete in-process shape so the
//! notify pipeline can run end to end. Every committed mutation publishes
//! a [`ChangeEvent`] into the configured [`ChangeSink`] *after* the state
//! change, so per-issue event order matches commit order.
//!
//! Contents do not survive a process restart.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::CoreError;
use crate::event::{ChangeEvent, ChangeSink};
use crate::issue::{Actor, IssueSnapshot, IssueUpdate, NewIssue};
use crate::types::DbId;

pub struct IssueStore {
    issues: RwLock<BTreeMap<DbId, IssueSnapshot>>,
    next_id: AtomicI64,
    sink: Arc<dyn ChangeSink>,
}

impl IssueStore {
    pub fn new(sink: Arc<dyn ChangeSink>) -> Self {
        Self {
            issues: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
            sink,
        }
    }

    /// Create an issue and emit `Created`.
    pub async fn create(&self, new: NewIssue, actor: &Actor) -> IssueSnapshot {
        let now = chrono::Utc::now();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let issue = IssueSnapshot {
            id,
            title: new.title,
            description: new.description,
            geometry: new.geometry,
            category: new.category,
            owner: actor.display_name.clone(),
            created_at: now,
            updated_at: now,
        };
        self.issues.write().await.insert(id, issue.clone());

        tracing::info!(issue_id = id, user_id = actor.user_id, "Issue created");
        self.sink.publish(ChangeEvent::Created {
            issue: issue.clone(),
            created_by: actor.display_name.clone(),
            created_by_user_id: actor.user_id,
        });
        issue
    }

    pub async fn get(&self, id: DbId) -> Result<IssueSnapshot, CoreError> {
        self.issues
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(CoreError::NotFound { entity: "Issue", id })
    }

    pub async fn list(&self) -> Vec<IssueSnapshot> {
        self.issues.read().await.values().cloned().collect()
    }

    /// Apply a partial update and emit `Modified`.
    pub async fn update(
        &self,
        id: DbId,
        update: IssueUpdate,
        actor: &Actor,
    ) -> Result<IssueSnapshot, CoreError> {
        let mut issues = self.issues.write().await;
        let issue = issues
            .get_mut(&id)
            .ok_or(CoreError::NotFound { entity: "Issue", id })?;

        if let Some(title) = update.title {
            issue.title = title;
        }
        if let Some(description) = update.description {
            issue.description = description;
        }
        if let Some(geometry) = update.geometry {
            issue.geometry = geometry;
        }
        if let Some(category) = update.category {
            issue.category = category;
        }
        issue.updated_at = chrono::Utc::now();
        let snapshot = issue.clone();
        // Release the write guard before publishing so a slow subscriber
        // can never hold up another mutation.
        drop(issues);

        tracing::info!(issue_id = id, user_id = actor.user_id, "Issue updated");
        self.sink.publish(ChangeEvent::Modified {
            issue: snapshot.clone(),
            modified_by: actor.display_name.clone(),
            modified_by_user_id: actor.user_id,
        });
        Ok(snapshot)
    }

    /// Delete an issue and emit `Deleted` with a tombstone payload.
    pub async fn remove(&self, id: DbId, actor: &Actor) -> Result<(), CoreError> {
        let removed = self.issues.write().await.remove(&id);
        let issue = removed.ok_or(CoreError::NotFound { entity: "Issue", id })?;

        tracing::info!(issue_id = id, user_id = actor.user_id, "Issue deleted");
        self.sink.publish(ChangeEvent::Deleted {
            id,
            title: issue.title,
            deleted_by: actor.display_name.clone(),
            deleted_by_user_id: actor.user_id,
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
