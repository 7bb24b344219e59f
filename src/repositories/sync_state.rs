//! Sync state repository: reads plus the named state transitions the
//! per-user job drives.
//!
//! Only a user's own job writes these transitions, so no cross-job locking
//! is needed; the invariant that `status == error` exactly when the disable
//! threshold (or a fatal error) was hit is maintained here.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
};
use uuid::Uuid;

use crate::entities::sync_state::{self, SyncStatus};

/// Repository for per-user sync state.
pub struct SyncStateRepository;

impl SyncStateRepository {
    /// Get the sync state for a user.
    pub async fn get<C>(conn: &C, user_uuid: &Uuid) -> Result<Option<sync_state::Model>>
    where
        C: ConnectionTrait,
    {
        Ok(sync_state::Entity::find()
            .filter(sync_state::Column::UserUuid.eq(*user_uuid))
            .one(conn)
            .await?)
    }

    /// Get every user with auto-sync enabled.
    pub async fn get_auto_enabled<C>(conn: &C) -> Result<Vec<sync_state::Model>>
    where
        C: ConnectionTrait,
    {
        Ok(sync_state::Entity::find()
            .filter(sync_state::Column::AutoSyncEnabled.eq(true))
            .all(conn)
            .await?)
    }

    /// Insert or replace a user's sync state.
    pub async fn upsert<C>(conn: &C, state: sync_state::ActiveModel) -> Result<()>
    where
        C: ConnectionTrait,
    {
        sync_state::Entity::insert(state)
            .on_conflict(
                OnConflict::column(sync_state::Column::UserUuid)
                    .update_columns([
                        sync_state::Column::ApiToken,
                        sync_state::Column::SyncToken,
                        sync_state::Column::FullSyncRequired,
                        sync_state::Column::Status,
                        sync_state::Column::ErrorCount,
                        sync_state::Column::ConsecutiveFailures,
                        sync_state::Column::AutoSyncEnabled,
                        sync_state::Column::SyncFrequencyMinutes,
                        sync_state::Column::LastSyncAt,
                        sync_state::Column::NextSyncAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;
        Ok(())
    }

    /// Persist a status change without touching the counters.
    pub async fn set_status<C>(conn: &C, user_uuid: &Uuid, status: SyncStatus) -> Result<()>
    where
        C: ConnectionTrait,
    {
        sync_state::Entity::update_many()
            .col_expr(sync_state::Column::Status, Expr::value(status.as_str()))
            .filter(sync_state::Column::UserUuid.eq(*user_uuid))
            .exec(conn)
            .await?;
        Ok(())
    }

    /// A sync attempt committed. The cursor only advances here, and
    /// `next_sync_at` is exactly `last_sync_at` plus the user's frequency.
    pub async fn record_success<C>(
        conn: &C,
        state: &sync_state::Model,
        new_cursor: &str,
        now: DateTime<Utc>,
        next: DateTime<Utc>,
    ) -> Result<()>
    where
        C: ConnectionTrait,
    {
        let mut active: sync_state::ActiveModel = state.clone().into();
        active.sync_token = ActiveValue::Set(Some(new_cursor.to_string()));
        active.full_sync_required = ActiveValue::Set(false);
        active.consecutive_failures = ActiveValue::Set(0);
        active.status = ActiveValue::Set(SyncStatus::Idle.as_str().to_string());
        active.last_sync_at = ActiveValue::Set(Some(now));
        active.next_sync_at = ActiveValue::Set(Some(next));
        active.update(conn).await?;
        Ok(())
    }

    /// A transient failure below the disable threshold: bump the counters
    /// and push `next_sync_at` out to the backed-off retry time.
    pub async fn record_retry<C>(
        conn: &C,
        state: &sync_state::Model,
        failures: i32,
        next: DateTime<Utc>,
    ) -> Result<()>
    where
        C: ConnectionTrait,
    {
        let mut active: sync_state::ActiveModel = state.clone().into();
        active.error_count = ActiveValue::Set(state.error_count + 1);
        active.consecutive_failures = ActiveValue::Set(failures);
        active.status = ActiveValue::Set(SyncStatus::Idle.as_str().to_string());
        active.next_sync_at = ActiveValue::Set(Some(next));
        active.update(conn).await?;
        Ok(())
    }

    /// The disable threshold was crossed or a fatal error occurred: stop
    /// auto-sync until the user is explicitly re-enabled.
    pub async fn record_disabled<C>(
        conn: &C,
        state: &sync_state::Model,
        failures: i32,
    ) -> Result<()>
    where
        C: ConnectionTrait,
    {
        let mut active: sync_state::ActiveModel = state.clone().into();
        active.error_count = ActiveValue::Set(state.error_count + 1);
        active.consecutive_failures = ActiveValue::Set(failures);
        active.status = ActiveValue::Set(SyncStatus::Error.as_str().to_string());
        active.auto_sync_enabled = ActiveValue::Set(false);
        active.next_sync_at = ActiveValue::Set(None);
        active.update(conn).await?;
        Ok(())
    }
}
