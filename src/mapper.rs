//! Translation between the remote item schema and local entities.
//!
//! For each raw delta item: deserialize it (failure means a malformed item,
//! which is logged and skipped), then resolve its remote id through the
//! mapping table and through ids staged for creation earlier in the same
//! batch. An unmapped live item is a creation (a fresh uuid is minted and a
//! mapping row prepared); a mapped or staged one is an update on the
//! existing uuid, so a create followed by a tombstone for the same remote id
//! within one delta still lands deleted. A deletion of an id never seen is a
//! no-op, which keeps delete deltas idempotent on replay.
//!
//! The mapper only reads; [`MergeEngine`](crate::merge::MergeEngine) applies
//! the resulting operations inside one transaction.

use std::collections::HashMap;

use anyhow::Result;
use log::{debug, warn};
use sea_orm::{ActiveValue, ConnectionTrait};
use uuid::Uuid;

use crate::entities::id_mapping::{self, ItemKind};
use crate::entities::{label, project, section, task};
use crate::errors::SyncError;
use crate::remote::{RemoteLabel, RemoteProject, RemoteSection, RemoteTask};
use crate::repositories::MappingRepository;

/// Mapped operations for one item kind.
pub struct MappedProjects {
    pub creates: Vec<(project::ActiveModel, id_mapping::ActiveModel)>,
    pub updates: Vec<project::ActiveModel>,
    pub deletes: Vec<Uuid>,
    /// `(child uuid, parent remote id)`, resolved after all rows land.
    pub parent_links: Vec<(Uuid, String)>,
    pub skipped: usize,
}

pub struct MappedLabels {
    pub creates: Vec<(label::ActiveModel, id_mapping::ActiveModel)>,
    pub updates: Vec<label::ActiveModel>,
    pub deletes: Vec<Uuid>,
    pub skipped: usize,
}

pub struct MappedSections {
    pub creates: Vec<(section::ActiveModel, id_mapping::ActiveModel)>,
    pub updates: Vec<section::ActiveModel>,
    pub deletes: Vec<Uuid>,
    pub skipped: usize,
}

pub struct MappedTasks {
    pub creates: Vec<(task::ActiveModel, id_mapping::ActiveModel)>,
    pub updates: Vec<task::ActiveModel>,
    pub deletes: Vec<Uuid>,
    pub parent_links: Vec<(Uuid, String)>,
    /// Label names per task, re-linked after the task rows land.
    pub labels: Vec<(Uuid, Vec<String>)>,
    pub skipped: usize,
}

/// Stateless translator for one user's deltas.
pub struct DeltaMapper {
    user_uuid: Uuid,
}

impl DeltaMapper {
    pub fn new(user_uuid: Uuid) -> Self {
        Self { user_uuid }
    }

    fn mapping_row(&self, kind: ItemKind, remote_id: &str, local: Uuid) -> id_mapping::ActiveModel {
        id_mapping::ActiveModel {
            user_uuid: ActiveValue::Set(self.user_uuid),
            item_kind: ActiveValue::Set(kind.as_str().to_string()),
            remote_id: ActiveValue::Set(remote_id.to_string()),
            local_uuid: ActiveValue::Set(local),
        }
    }

    async fn resolve<C>(
        &self,
        conn: &C,
        kind: ItemKind,
        remote_id: &str,
    ) -> Result<Option<Uuid>, SyncError>
    where
        C: ConnectionTrait,
    {
        Ok(MappingRepository::get(conn, &self.user_uuid, kind, remote_id)
            .await
            .map_err(SyncError::storage)?
            .map(|m| m.local_uuid))
    }

    pub async fn map_projects<C>(
        &self,
        conn: &C,
        raw: &[serde_json::Value],
    ) -> Result<MappedProjects, SyncError>
    where
        C: ConnectionTrait,
    {
        let mut mapped = MappedProjects {
            creates: Vec::new(),
            updates: Vec::new(),
            deletes: Vec::new(),
            parent_links: Vec::new(),
            skipped: 0,
        };
        // Remote ids staged for creation earlier in this batch.
        let mut pending: HashMap<String, Uuid> = HashMap::new();

        for value in raw {
            let item: RemoteProject = match serde_json::from_value(value.clone()) {
                Ok(item) => item,
                Err(e) => {
                    warn!("skipping malformed remote project: {e}");
                    mapped.skipped += 1;
                    continue;
                }
            };
            if item.id.is_empty() {
                warn!("skipping remote project with empty id");
                mapped.skipped += 1;
                continue;
            }

            let existing = match self.resolve(conn, ItemKind::Project, &item.id).await? {
                Some(uuid) => Some(uuid),
                None => pending.get(&item.id).copied(),
            };
            if item.is_deleted {
                if let Some(uuid) = existing {
                    mapped.deletes.push(uuid);
                }
                continue;
            }

            let uuid = existing.unwrap_or_else(Uuid::new_v4);
            if let Some(parent) = &item.parent_id {
                mapped.parent_links.push((uuid, parent.clone()));
            }
            let row = project::ActiveModel {
                uuid: ActiveValue::Set(uuid),
                user_uuid: ActiveValue::Set(self.user_uuid),
                remote_id: ActiveValue::Set(item.id.clone()),
                name: ActiveValue::Set(item.name),
                color: ActiveValue::Set(item.color),
                is_favorite: ActiveValue::Set(item.is_favorite),
                is_inbox_project: ActiveValue::Set(item.inbox_project),
                order_index: ActiveValue::Set(item.child_order),
                parent_uuid: ActiveValue::Set(None),
                is_pinned: ActiveValue::Set(false),
                is_deleted: ActiveValue::Set(false),
            };
            if existing.is_some() {
                mapped.updates.push(row);
            } else {
                pending.insert(item.id.clone(), uuid);
                let mapping = self.mapping_row(ItemKind::Project, &item.id, uuid);
                mapped.creates.push((row, mapping));
            }
        }

        Ok(mapped)
    }

    pub async fn map_labels<C>(
        &self,
        conn: &C,
        raw: &[serde_json::Value],
    ) -> Result<MappedLabels, SyncError>
    where
        C: ConnectionTrait,
    {
        let mut mapped = MappedLabels {
            creates: Vec::new(),
            updates: Vec::new(),
            deletes: Vec::new(),
            skipped: 0,
        };
        let mut pending: HashMap<String, Uuid> = HashMap::new();

        for value in raw {
            let item: RemoteLabel = match serde_json::from_value(value.clone()) {
                Ok(item) => item,
                Err(e) => {
                    warn!("skipping malformed remote label: {e}");
                    mapped.skipped += 1;
                    continue;
                }
            };
            if item.id.is_empty() {
                warn!("skipping remote label with empty id");
                mapped.skipped += 1;
                continue;
            }

            let existing = match self.resolve(conn, ItemKind::Label, &item.id).await? {
                Some(uuid) => Some(uuid),
                None => pending.get(&item.id).copied(),
            };
            if item.is_deleted {
                if let Some(uuid) = existing {
                    mapped.deletes.push(uuid);
                }
                continue;
            }

            let uuid = existing.unwrap_or_else(Uuid::new_v4);
            let row = label::ActiveModel {
                uuid: ActiveValue::Set(uuid),
                user_uuid: ActiveValue::Set(self.user_uuid),
                remote_id: ActiveValue::Set(item.id.clone()),
                name: ActiveValue::Set(item.name),
                color: ActiveValue::Set(item.color),
                order_index: ActiveValue::Set(item.item_order),
                is_favorite: ActiveValue::Set(item.is_favorite),
                is_deleted: ActiveValue::Set(false),
            };
            if existing.is_some() {
                mapped.updates.push(row);
            } else {
                pending.insert(item.id.clone(), uuid);
                let mapping = self.mapping_row(ItemKind::Label, &item.id, uuid);
                mapped.creates.push((row, mapping));
            }
        }

        Ok(mapped)
    }

    pub async fn map_sections<C>(
        &self,
        conn: &C,
        raw: &[serde_json::Value],
    ) -> Result<MappedSections, SyncError>
    where
        C: ConnectionTrait,
    {
        let mut mapped = MappedSections {
            creates: Vec::new(),
            updates: Vec::new(),
            deletes: Vec::new(),
            skipped: 0,
        };
        let mut pending: HashMap<String, Uuid> = HashMap::new();

        for value in raw {
            let item: RemoteSection = match serde_json::from_value(value.clone()) {
                Ok(item) => item,
                Err(e) => {
                    warn!("skipping malformed remote section: {e}");
                    mapped.skipped += 1;
                    continue;
                }
            };
            if item.id.is_empty() {
                warn!("skipping remote section with empty id");
                mapped.skipped += 1;
                continue;
            }

            let existing = match self.resolve(conn, ItemKind::Section, &item.id).await? {
                Some(uuid) => Some(uuid),
                None => pending.get(&item.id).copied(),
            };
            if item.is_deleted {
                if let Some(uuid) = existing {
                    mapped.deletes.push(uuid);
                }
                continue;
            }

            // Sections need their project to exist locally already.
            let project_uuid = match self.resolve(conn, ItemKind::Project, &item.project_id).await? {
                Some(uuid) => uuid,
                None => {
                    warn!(
                        "skipping section {} referencing unknown project {}",
                        item.id, item.project_id
                    );
                    mapped.skipped += 1;
                    continue;
                }
            };

            let uuid = existing.unwrap_or_else(Uuid::new_v4);
            let row = section::ActiveModel {
                uuid: ActiveValue::Set(uuid),
                user_uuid: ActiveValue::Set(self.user_uuid),
                remote_id: ActiveValue::Set(item.id.clone()),
                name: ActiveValue::Set(item.name),
                project_uuid: ActiveValue::Set(project_uuid),
                order_index: ActiveValue::Set(item.section_order),
                is_deleted: ActiveValue::Set(false),
            };
            if existing.is_some() {
                mapped.updates.push(row);
            } else {
                pending.insert(item.id.clone(), uuid);
                let mapping = self.mapping_row(ItemKind::Section, &item.id, uuid);
                mapped.creates.push((row, mapping));
            }
        }

        Ok(mapped)
    }

    pub async fn map_tasks<C>(
        &self,
        conn: &C,
        raw: &[serde_json::Value],
    ) -> Result<MappedTasks, SyncError>
    where
        C: ConnectionTrait,
    {
        let mut mapped = MappedTasks {
            creates: Vec::new(),
            updates: Vec::new(),
            deletes: Vec::new(),
            parent_links: Vec::new(),
            labels: Vec::new(),
            skipped: 0,
        };
        let mut pending: HashMap<String, Uuid> = HashMap::new();

        for value in raw {
            let item: RemoteTask = match serde_json::from_value(value.clone()) {
                Ok(item) => item,
                Err(e) => {
                    warn!("skipping malformed remote task: {e}");
                    mapped.skipped += 1;
                    continue;
                }
            };
            if item.id.is_empty() {
                warn!("skipping remote task with empty id");
                mapped.skipped += 1;
                continue;
            }

            let existing = match self.resolve(conn, ItemKind::Task, &item.id).await? {
                Some(uuid) => Some(uuid),
                None => pending.get(&item.id).copied(),
            };
            if item.is_deleted {
                if let Some(uuid) = existing {
                    mapped.deletes.push(uuid);
                } else {
                    debug!("delete for unmapped task {}, nothing to do", item.id);
                }
                continue;
            }

            let project_uuid = match self.resolve(conn, ItemKind::Project, &item.project_id).await? {
                Some(uuid) => uuid,
                None => {
                    warn!(
                        "skipping task {} referencing unknown project {}",
                        item.id, item.project_id
                    );
                    mapped.skipped += 1;
                    continue;
                }
            };
            let section_uuid = match &item.section_id {
                Some(remote) => self.resolve(conn, ItemKind::Section, remote).await?,
                None => None,
            };

            let uuid = existing.unwrap_or_else(Uuid::new_v4);
            if let Some(parent) = &item.parent_id {
                mapped.parent_links.push((uuid, parent.clone()));
            }
            mapped.labels.push((uuid, item.labels.clone()));

            let row = task::ActiveModel {
                uuid: ActiveValue::Set(uuid),
                user_uuid: ActiveValue::Set(self.user_uuid),
                remote_id: ActiveValue::Set(item.id.clone()),
                content: ActiveValue::Set(item.content),
                description: ActiveValue::Set(item.description),
                project_uuid: ActiveValue::Set(project_uuid),
                section_uuid: ActiveValue::Set(section_uuid),
                parent_uuid: ActiveValue::Set(None),
                priority: ActiveValue::Set(item.priority),
                order_index: ActiveValue::Set(item.child_order),
                due_date: ActiveValue::Set(item.due.as_ref().map(|d| d.date.clone())),
                due_datetime: ActiveValue::Set(item.due.as_ref().and_then(|d| d.datetime.clone())),
                is_recurring: ActiveValue::Set(
                    item.due.as_ref().map(|d| d.is_recurring).unwrap_or(false),
                ),
                is_completed: ActiveValue::Set(item.checked),
                is_pinned: ActiveValue::Set(false),
                is_deleted: ActiveValue::Set(false),
            };
            if existing.is_some() {
                mapped.updates.push(row);
            } else {
                pending.insert(item.id.clone(), uuid);
                let mapping = self.mapping_row(ItemKind::Task, &item.id, uuid);
                mapped.creates.push((row, mapping));
            }
        }

        Ok(mapped)
    }
}
