//! Task repository for database operations.

use anyhow::Result;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};
use uuid::Uuid;

use crate::entities::task;

/// Repository for task-related database operations.
pub struct TaskRepository;

impl TaskRepository {
    /// Get all tasks belonging to a user, live rows first.
    pub async fn get_all_for_user<C>(conn: &C, user_uuid: &Uuid) -> Result<Vec<task::Model>>
    where
        C: ConnectionTrait,
    {
        Ok(task::Entity::find()
            .filter(task::Column::UserUuid.eq(*user_uuid))
            .order_by_asc(task::Column::IsDeleted)
            .order_by_asc(task::Column::IsCompleted)
            .order_by_asc(task::Column::OrderIndex)
            .all(conn)
            .await?)
    }

    /// Get a single task by remote_id for a user.
    pub async fn get_by_remote_id<C>(
        conn: &C,
        user_uuid: &Uuid,
        remote_id: &str,
    ) -> Result<Option<task::Model>>
    where
        C: ConnectionTrait,
    {
        Ok(task::Entity::find()
            .filter(task::Column::UserUuid.eq(*user_uuid))
            .filter(task::Column::RemoteId.eq(remote_id))
            .one(conn)
            .await?)
    }

    /// Point a task at its local parent.
    pub async fn set_parent<C>(conn: &C, uuid: &Uuid, parent_uuid: Option<Uuid>) -> Result<()>
    where
        C: ConnectionTrait,
    {
        task::Entity::update_many()
            .col_expr(task::Column::ParentUuid, Expr::value(parent_uuid))
            .filter(task::Column::Uuid.eq(*uuid))
            .exec(conn)
            .await?;
        Ok(())
    }

    /// Soft-delete a task. The row and its id mapping are kept.
    pub async fn mark_deleted<C>(conn: &C, uuid: &Uuid) -> Result<()>
    where
        C: ConnectionTrait,
    {
        task::Entity::update_many()
            .col_expr(task::Column::IsDeleted, Expr::value(true))
            .filter(task::Column::Uuid.eq(*uuid))
            .exec(conn)
            .await?;
        Ok(())
    }

    /// Flip the locally-owned pinned flag.
    pub async fn set_pinned<C>(conn: &C, uuid: &Uuid, pinned: bool) -> Result<()>
    where
        C: ConnectionTrait,
    {
        task::Entity::update_many()
            .col_expr(task::Column::IsPinned, Expr::value(pinned))
            .filter(task::Column::Uuid.eq(*uuid))
            .exec(conn)
            .await?;
        Ok(())
    }
}
