//! Per-user synchronization state, one row per user.
//!
//! The scheduler owns this record. `sync_token` only advances after a
//! successful merge commit; `consecutive_failures` drives backoff and the
//! disable threshold.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sync_states")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_uuid: Uuid,
    pub api_token: String,
    /// Opaque cursor from the last successful sync; `None` means a full
    /// sync is required.
    pub sync_token: Option<String>,
    pub full_sync_required: bool,
    /// One of `idle | syncing | error`, see [`SyncStatus`].
    pub status: String,
    /// Lifetime failed attempts, monotonic.
    pub error_count: i32,
    /// Resets to 0 on any success.
    pub consecutive_failures: i32,
    pub auto_sync_enabled: bool,
    pub sync_frequency_minutes: i32,
    pub last_sync_at: Option<DateTimeUtc>,
    pub next_sync_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Typed view of the persisted `status` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Idle,
    Syncing,
    Error,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Error => "error",
        }
    }

    /// Unrecognized values read back as `Idle`.
    pub fn parse(value: &str) -> Self {
        match value {
            "syncing" => SyncStatus::Syncing,
            "error" => SyncStatus::Error,
            _ => SyncStatus::Idle,
        }
    }
}

impl Model {
    pub fn status(&self) -> SyncStatus {
        SyncStatus::parse(&self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips() {
        for status in [SyncStatus::Idle, SyncStatus::Syncing, SyncStatus::Error] {
            assert_eq!(SyncStatus::parse(status.as_str()), status);
        }
        assert_eq!(SyncStatus::parse("garbage"), SyncStatus::Idle);
    }
}
