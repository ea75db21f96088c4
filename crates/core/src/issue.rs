//! Issue record types.
//!
//! An issue is a map-based record: a title, a rich-text description, a
//! GeoJSON geometry, and a category. Geometry and description are kept
//! as opaque values here — sanitization and geometry validation happen
//! in the owning application, not in the coordination core.

use serde::{Deserialize, Serialize};

use crate::types::{DbId, Timestamp};

/// A full issue record as stored and as relayed in change events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueSnapshot {
    pub id: DbId,
    pub title: String,
    pub description: String,
    /// GeoJSON geometry, passed through untouched.
    pub geometry: serde_json::Value,
    pub category: String,
    /// Display name of the user that created the issue.
    pub owner: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Fields required to create a new issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewIssue {
    pub title: String,
    pub description: String,
    pub geometry: serde_json::Value,
    pub category: String,
}

/// Partial update applied to an existing issue. `None` fields are left
/// unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub geometry: Option<serde_json::Value>,
    pub category: Option<String>,
}

/// The verified identity of the user performing a mutation.
///
/// Produced by the authentication layer; the core treats it as given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: DbId,
    pub username: String,
    /// Human-facing name shown to other editors.
    pub display_name: String,
}
