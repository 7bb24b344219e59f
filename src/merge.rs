//! Applies a mapped delta to local storage inside one transaction.
//!
//! Kinds are applied in dependency order (projects, labels, sections, tasks)
//! so that items referencing something created earlier in the same delta
//! resolve against a mapping row that already exists. Parent links are
//! resolved in a second pass once every row of the kind has landed.
//!
//! All writes go through `ON CONFLICT` upserts keyed on
//! `(user_uuid, remote_id)`, which is what makes replaying a delta a no-op:
//! the same remote id resolves to the same local uuid and the row converges
//! to the same values. Locally-owned fields (`is_pinned`) are never listed in
//! the conflict update set, so a remote update cannot clobber them.

use log::{debug, warn};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, TransactionTrait};
use uuid::Uuid;

use crate::entities::id_mapping::ItemKind;
use crate::entities::{label, project, section, task, task_label};
use crate::errors::SyncError;
use crate::mapper::DeltaMapper;
use crate::remote::SyncDelta;
use crate::repositories::{
    LabelRepository, MappingRepository, ProjectRepository, SectionRepository, TaskRepository,
};
use crate::storage::LocalStorage;

/// Counters describing what one merge did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeOutcome {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub skipped: usize,
}

/// Applies remote deltas to local storage.
pub struct MergeEngine;

impl MergeEngine {
    /// Merge one delta for one user. Either every item lands or none do.
    pub async fn apply(
        storage: &LocalStorage,
        user_uuid: Uuid,
        delta: &SyncDelta,
    ) -> Result<MergeOutcome, SyncError> {
        let txn = storage.conn.begin().await.map_err(SyncError::storage)?;
        let mapper = DeltaMapper::new(user_uuid);
        let mut outcome = MergeOutcome::default();

        // Projects first, every other kind points at them.
        let projects = mapper.map_projects(&txn, &delta.projects).await?;
        outcome.created += projects.creates.len();
        outcome.updated += projects.updates.len();
        outcome.deleted += projects.deletes.len();
        outcome.skipped += projects.skipped;
        for (row, mapping) in projects.creates {
            upsert_project(&txn, row).await?;
            MappingRepository::insert_ignore(&txn, mapping)
                .await
                .map_err(SyncError::storage)?;
        }
        for row in projects.updates {
            upsert_project(&txn, row).await?;
        }
        for uuid in &projects.deletes {
            ProjectRepository::mark_deleted(&txn, uuid)
                .await
                .map_err(SyncError::storage)?;
        }
        for (child, parent_remote) in &projects.parent_links {
            link_parent(&txn, &user_uuid, ItemKind::Project, child, parent_remote).await?;
        }

        let labels = mapper.map_labels(&txn, &delta.labels).await?;
        outcome.created += labels.creates.len();
        outcome.updated += labels.updates.len();
        outcome.deleted += labels.deletes.len();
        outcome.skipped += labels.skipped;
        for (row, mapping) in labels.creates {
            upsert_label(&txn, row).await?;
            MappingRepository::insert_ignore(&txn, mapping)
                .await
                .map_err(SyncError::storage)?;
        }
        for row in labels.updates {
            upsert_label(&txn, row).await?;
        }
        for uuid in &labels.deletes {
            LabelRepository::mark_deleted(&txn, uuid)
                .await
                .map_err(SyncError::storage)?;
        }

        let sections = mapper.map_sections(&txn, &delta.sections).await?;
        outcome.created += sections.creates.len();
        outcome.updated += sections.updates.len();
        outcome.deleted += sections.deletes.len();
        outcome.skipped += sections.skipped;
        for (row, mapping) in sections.creates {
            upsert_section(&txn, row).await?;
            MappingRepository::insert_ignore(&txn, mapping)
                .await
                .map_err(SyncError::storage)?;
        }
        for row in sections.updates {
            upsert_section(&txn, row).await?;
        }
        for uuid in &sections.deletes {
            SectionRepository::mark_deleted(&txn, uuid)
                .await
                .map_err(SyncError::storage)?;
        }

        let tasks = mapper.map_tasks(&txn, &delta.tasks).await?;
        outcome.created += tasks.creates.len();
        outcome.updated += tasks.updates.len();
        outcome.deleted += tasks.deletes.len();
        outcome.skipped += tasks.skipped;
        for (row, mapping) in tasks.creates {
            upsert_task(&txn, row).await?;
            MappingRepository::insert_ignore(&txn, mapping)
                .await
                .map_err(SyncError::storage)?;
        }
        for row in tasks.updates {
            upsert_task(&txn, row).await?;
        }
        for uuid in &tasks.deletes {
            TaskRepository::mark_deleted(&txn, uuid)
                .await
                .map_err(SyncError::storage)?;
        }
        for (child, parent_remote) in &tasks.parent_links {
            link_parent(&txn, &user_uuid, ItemKind::Task, child, parent_remote).await?;
        }
        for (task_uuid, names) in &tasks.labels {
            relink_labels(&txn, &user_uuid, task_uuid, names).await?;
        }

        txn.commit().await.map_err(SyncError::storage)?;
        debug!(
            "merged delta for user {user_uuid}: {} created, {} updated, {} deleted, {} skipped",
            outcome.created, outcome.updated, outcome.deleted, outcome.skipped
        );
        Ok(outcome)
    }
}

async fn upsert_project<C>(conn: &C, row: project::ActiveModel) -> Result<(), SyncError>
where
    C: ConnectionTrait,
{
    project::Entity::insert(row)
        .on_conflict(
            OnConflict::columns([project::Column::UserUuid, project::Column::RemoteId])
                .update_columns([
                    project::Column::Name,
                    project::Column::Color,
                    project::Column::IsFavorite,
                    project::Column::IsInboxProject,
                    project::Column::OrderIndex,
                    project::Column::IsDeleted,
                ])
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await
        .map_err(SyncError::storage)?;
    Ok(())
}

async fn upsert_label<C>(conn: &C, row: label::ActiveModel) -> Result<(), SyncError>
where
    C: ConnectionTrait,
{
    label::Entity::insert(row)
        .on_conflict(
            OnConflict::columns([label::Column::UserUuid, label::Column::RemoteId])
                .update_columns([
                    label::Column::Name,
                    label::Column::Color,
                    label::Column::OrderIndex,
                    label::Column::IsFavorite,
                    label::Column::IsDeleted,
                ])
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await
        .map_err(SyncError::storage)?;
    Ok(())
}

async fn upsert_section<C>(conn: &C, row: section::ActiveModel) -> Result<(), SyncError>
where
    C: ConnectionTrait,
{
    section::Entity::insert(row)
        .on_conflict(
            OnConflict::columns([section::Column::UserUuid, section::Column::RemoteId])
                .update_columns([
                    section::Column::Name,
                    section::Column::ProjectUuid,
                    section::Column::OrderIndex,
                    section::Column::IsDeleted,
                ])
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await
        .map_err(SyncError::storage)?;
    Ok(())
}

async fn upsert_task<C>(conn: &C, row: task::ActiveModel) -> Result<(), SyncError>
where
    C: ConnectionTrait,
{
    task::Entity::insert(row)
        .on_conflict(
            OnConflict::columns([task::Column::UserUuid, task::Column::RemoteId])
                .update_columns([
                    task::Column::Content,
                    task::Column::Description,
                    task::Column::ProjectUuid,
                    task::Column::SectionUuid,
                    task::Column::Priority,
                    task::Column::OrderIndex,
                    task::Column::DueDate,
                    task::Column::DueDatetime,
                    task::Column::IsRecurring,
                    task::Column::IsCompleted,
                    task::Column::IsDeleted,
                ])
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await
        .map_err(SyncError::storage)?;
    Ok(())
}

/// Second-pass parent resolution. The parent may have landed in this same
/// delta, so the lookup runs after all rows of the kind are in.
async fn link_parent<C>(
    conn: &C,
    user_uuid: &Uuid,
    kind: ItemKind,
    child: &Uuid,
    parent_remote: &str,
) -> Result<(), SyncError>
where
    C: ConnectionTrait,
{
    let parent = MappingRepository::get(conn, user_uuid, kind, parent_remote)
        .await
        .map_err(SyncError::storage)?
        .map(|m| m.local_uuid);
    if parent.is_none() {
        warn!("parent {parent_remote} not found for {child}, leaving unparented");
    }
    match kind {
        ItemKind::Project => ProjectRepository::set_parent(conn, child, parent)
            .await
            .map_err(SyncError::storage)?,
        ItemKind::Task => TaskRepository::set_parent(conn, child, parent)
            .await
            .map_err(SyncError::storage)?,
        _ => {}
    }
    Ok(())
}

/// Replace a task's label links with the set named in the delta.
async fn relink_labels<C>(
    conn: &C,
    user_uuid: &Uuid,
    task_uuid: &Uuid,
    names: &[String],
) -> Result<(), SyncError>
where
    C: ConnectionTrait,
{
    task_label::Entity::delete_many()
        .filter(task_label::Column::TaskUuid.eq(*task_uuid))
        .exec(conn)
        .await
        .map_err(SyncError::storage)?;

    for name in names {
        let label = LabelRepository::get_by_name(conn, user_uuid, name)
            .await
            .map_err(SyncError::storage)?;
        let Some(label) = label else {
            warn!("task {task_uuid} references unknown label {name:?}");
            continue;
        };
        let link = task_label::ActiveModel {
            task_uuid: sea_orm::ActiveValue::Set(*task_uuid),
            label_uuid: sea_orm::ActiveValue::Set(label.uuid),
        };
        task_label::Entity::insert(link)
            .on_conflict(
                OnConflict::columns([
                    task_label::Column::TaskUuid,
                    task_label::Column::LabelUuid,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(conn)
            .await
            .map_err(SyncError::storage)?;
    }
    Ok(())
}
