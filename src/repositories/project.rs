//! Project repository for database operations.

use anyhow::Result;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};
use uuid::Uuid;

use crate::entities::project;

/// Repository for project-related database operations.
pub struct ProjectRepository;

impl ProjectRepository {
    /// Get all projects belonging to a user, ordered by order index.
    pub async fn get_all_for_user<C>(conn: &C, user_uuid: &Uuid) -> Result<Vec<project::Model>>
    where
        C: ConnectionTrait,
    {
        Ok(project::Entity::find()
            .filter(project::Column::UserUuid.eq(*user_uuid))
            .order_by_asc(project::Column::OrderIndex)
            .all(conn)
            .await?)
    }

    /// Get a single project by remote_id for a user.
    pub async fn get_by_remote_id<C>(
        conn: &C,
        user_uuid: &Uuid,
        remote_id: &str,
    ) -> Result<Option<project::Model>>
    where
        C: ConnectionTrait,
    {
        Ok(project::Entity::find()
            .filter(project::Column::UserUuid.eq(*user_uuid))
            .filter(project::Column::RemoteId.eq(remote_id))
            .one(conn)
            .await?)
    }

    /// Point a project at its local parent.
    pub async fn set_parent<C>(conn: &C, uuid: &Uuid, parent_uuid: Option<Uuid>) -> Result<()>
    where
        C: ConnectionTrait,
    {
        project::Entity::update_many()
            .col_expr(project::Column::ParentUuid, Expr::value(parent_uuid))
            .filter(project::Column::Uuid.eq(*uuid))
            .exec(conn)
            .await?;
        Ok(())
    }

    /// Soft-delete a project. The row and its id mapping are kept.
    pub async fn mark_deleted<C>(conn: &C, uuid: &Uuid) -> Result<()>
    where
        C: ConnectionTrait,
    {
        project::Entity::update_many()
            .col_expr(project::Column::IsDeleted, Expr::value(true))
            .filter(project::Column::Uuid.eq(*uuid))
            .exec(conn)
            .await?;
        Ok(())
    }

    /// Flip the locally-owned pinned flag.
    pub async fn set_pinned<C>(conn: &C, uuid: &Uuid, pinned: bool) -> Result<()>
    where
        C: ConnectionTrait,
    {
        project::Entity::update_many()
            .col_expr(project::Column::IsPinned, Expr::value(pinned))
            .filter(project::Column::Uuid.eq(*uuid))
            .exec(conn)
            .await?;
        Ok(())
    }
}
