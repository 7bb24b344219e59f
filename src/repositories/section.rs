//! Section repository for database operations.

use anyhow::Result;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

use crate::entities::section;

/// Repository for section-related database operations.
pub struct SectionRepository;

impl SectionRepository {
    /// Get a single section by remote_id for a user.
    pub async fn get_by_remote_id<C>(
        conn: &C,
        user_uuid: &Uuid,
        remote_id: &str,
    ) -> Result<Option<section::Model>>
    where
        C: ConnectionTrait,
    {
        Ok(section::Entity::find()
            .filter(section::Column::UserUuid.eq(*user_uuid))
            .filter(section::Column::RemoteId.eq(remote_id))
            .one(conn)
            .await?)
    }

    /// Soft-delete a section.
    pub async fn mark_deleted<C>(conn: &C, uuid: &Uuid) -> Result<()>
    where
        C: ConnectionTrait,
    {
        section::Entity::update_many()
            .col_expr(section::Column::IsDeleted, Expr::value(true))
            .filter(section::Column::Uuid.eq(*uuid))
            .exec(conn)
            .await?;
        Ok(())
    }
}
