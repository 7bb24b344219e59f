//! Repository for the remote-id to local-uuid correspondence table.

use anyhow::Result;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

use crate::entities::id_mapping::{self, ItemKind};

/// Repository for external-id mapping operations.
pub struct MappingRepository;

impl MappingRepository {
    /// Look up the local uuid recorded for a remote item, if any.
    pub async fn get<C>(
        conn: &C,
        user_uuid: &Uuid,
        kind: ItemKind,
        remote_id: &str,
    ) -> Result<Option<id_mapping::Model>>
    where
        C: ConnectionTrait,
    {
        Ok(id_mapping::Entity::find()
            .filter(id_mapping::Column::UserUuid.eq(*user_uuid))
            .filter(id_mapping::Column::ItemKind.eq(kind.as_str()))
            .filter(id_mapping::Column::RemoteId.eq(remote_id))
            .one(conn)
            .await?)
    }

    /// Record a mapping, keeping the existing row on replay.
    pub async fn insert_ignore<C>(conn: &C, mapping: id_mapping::ActiveModel) -> Result<()>
    where
        C: ConnectionTrait,
    {
        id_mapping::Entity::insert(mapping)
            .on_conflict(
                OnConflict::columns([
                    id_mapping::Column::UserUuid,
                    id_mapping::Column::ItemKind,
                    id_mapping::Column::RemoteId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;
        Ok(())
    }
}
