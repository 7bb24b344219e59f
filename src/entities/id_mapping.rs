//! Correspondence between remote item ids and local entity uuids.
//!
//! A row is created the first time a remote item is merged and is never
//! deleted by sync, so delete deltas stay idempotent on replay.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "id_mappings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_uuid: Uuid,
    #[sea_orm(primary_key, auto_increment = false)]
    pub item_kind: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub remote_id: String,
    pub local_uuid: Uuid,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Item kinds tracked by the mapping table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Project,
    Section,
    Task,
    Label,
}

impl ItemKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::Project => "project",
            ItemKind::Section => "section",
            ItemKind::Task => "task",
            ItemKind::Label => "label",
        }
    }
}
