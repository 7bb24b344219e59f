//! Label repository for database operations.

use anyhow::Result;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

use crate::entities::label;

/// Repository for label-related database operations.
pub struct LabelRepository;

impl LabelRepository {
    /// Get a label by name for a user. Remote tasks reference labels by name.
    pub async fn get_by_name<C>(
        conn: &C,
        user_uuid: &Uuid,
        name: &str,
    ) -> Result<Option<label::Model>>
    where
        C: ConnectionTrait,
    {
        Ok(label::Entity::find()
            .filter(label::Column::UserUuid.eq(*user_uuid))
            .filter(label::Column::Name.eq(name))
            .one(conn)
            .await?)
    }

    /// Soft-delete a label.
    pub async fn mark_deleted<C>(conn: &C, uuid: &Uuid) -> Result<()>
    where
        C: ConnectionTrait,
    {
        label::Entity::update_many()
            .col_expr(label::Column::IsDeleted, Expr::value(true))
            .filter(label::Column::Uuid.eq(*uuid))
            .exec(conn)
            .await?;
        Ok(())
    }
}
