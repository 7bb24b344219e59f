//! Remote service client abstraction and wire types.
//!
//! The scheduler core only ever sees [`ExternalSyncClient`]: hand it a
//! cursor (or none, for a full sync) and get back a [`SyncDelta`] plus the
//! next cursor, or an error already classified into the
//! [`SyncError`](crate::errors::SyncError) taxonomy. The concrete Todoist
//! implementation lives in [`todoist`].
//!
//! Delta items are carried as raw JSON values so that one malformed item can
//! be skipped during mapping without failing the whole delta.

pub mod todoist;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::SyncError;

/// Cursor value that requests the complete remote state.
pub const FULL_SYNC_TOKEN: &str = "*";

/// One batch of remote changes since a cursor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncDelta {
    pub projects: Vec<serde_json::Value>,
    pub labels: Vec<serde_json::Value>,
    pub sections: Vec<serde_json::Value>,
    pub tasks: Vec<serde_json::Value>,
    /// Cursor to store after this delta commits.
    pub sync_token: String,
    /// Whether the remote answered with complete state rather than a delta.
    pub full_sync: bool,
}

impl SyncDelta {
    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
            && self.labels.is_empty()
            && self.sections.is_empty()
            && self.tasks.is_empty()
    }
}

/// Client for the external task service's incremental sync endpoint.
#[async_trait]
pub trait ExternalSyncClient: Send + Sync {
    /// Fetch changes since `cursor`; `None` requests a full sync.
    async fn fetch_delta(
        &self,
        api_token: &str,
        cursor: Option<&str>,
    ) -> Result<SyncDelta, SyncError>;
}

fn default_color() -> String {
    "charcoal".to_string()
}

fn default_priority() -> i32 {
    1
}

/// Remote project as served by the sync endpoint. Unknown fields are
/// ignored; absent optional fields take the defaults below.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteProject {
    pub id: String,
    pub name: String,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub child_order: i32,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub inbox_project: bool,
    #[serde(default)]
    pub is_deleted: bool,
}

/// Remote label.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteLabel {
    pub id: String,
    pub name: String,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub item_order: i32,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub is_deleted: bool,
}

/// Remote section.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteSection {
    pub id: String,
    pub name: String,
    pub project_id: String,
    #[serde(default)]
    pub section_order: i32,
    #[serde(default)]
    pub is_deleted: bool,
}

/// Remote task. Labels are referenced by name.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteTask {
    pub id: String,
    pub content: String,
    pub project_id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub section_id: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub child_order: i32,
    #[serde(default)]
    pub due: Option<RemoteDue>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub checked: bool,
    #[serde(default)]
    pub is_deleted: bool,
}

/// Due-date payload attached to a remote task.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteDue {
    pub date: String,
    #[serde(default)]
    pub datetime: Option<String>,
    #[serde(default)]
    pub is_recurring: bool,
}
