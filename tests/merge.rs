use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde_json::json;
use uuid::Uuid;

use tasksync::entities::id_mapping::ItemKind;
use tasksync::entities::{project, task, task_label};
use tasksync::merge::MergeEngine;
use tasksync::remote::SyncDelta;
use tasksync::repositories::{
    LabelRepository, MappingRepository, ProjectRepository, SectionRepository, TaskRepository,
};
use tasksync::storage::LocalStorage;

fn full_delta() -> SyncDelta {
    SyncDelta {
        projects: vec![json!({
            "id": "p1",
            "name": "Inbox",
            "color": "charcoal",
            "inbox_project": true
        })],
        labels: vec![json!({ "id": "l1", "name": "urgent", "color": "red" })],
        sections: vec![json!({ "id": "s1", "name": "Backlog", "project_id": "p1" })],
        tasks: vec![json!({
            "id": "t1",
            "content": "water the plants",
            "project_id": "p1",
            "section_id": "s1",
            "priority": 3,
            "labels": ["urgent"]
        })],
        sync_token: "cursor-1".to_string(),
        full_sync: true,
    }
}

#[tokio::test]
async fn full_sync_creates_everything() {
    let storage = LocalStorage::in_memory().await.unwrap();
    let user = Uuid::new_v4();

    let outcome = MergeEngine::apply(&storage, user, &full_delta()).await.unwrap();
    assert_eq!(outcome.created, 4);
    assert_eq!(outcome.skipped, 0);

    let project = ProjectRepository::get_by_remote_id(&storage.conn, &user, "p1")
        .await
        .unwrap()
        .expect("project should exist");
    assert_eq!(project.name, "Inbox");
    assert!(project.is_inbox_project);

    let section = SectionRepository::get_by_remote_id(&storage.conn, &user, "s1")
        .await
        .unwrap()
        .expect("section should exist");
    assert_eq!(section.project_uuid, project.uuid);

    let task = TaskRepository::get_by_remote_id(&storage.conn, &user, "t1")
        .await
        .unwrap()
        .expect("task should exist");
    assert_eq!(task.project_uuid, project.uuid);
    assert_eq!(task.section_uuid, Some(section.uuid));
    assert_eq!(task.priority, 3);

    let label = LabelRepository::get_by_name(&storage.conn, &user, "urgent")
        .await
        .unwrap()
        .expect("label should exist");
    let links = task_label::Entity::find()
        .filter(task_label::Column::TaskUuid.eq(task.uuid))
        .all(&storage.conn)
        .await
        .unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].label_uuid, label.uuid);
}

#[tokio::test]
async fn replaying_a_delta_changes_nothing() {
    let storage = LocalStorage::in_memory().await.unwrap();
    let user = Uuid::new_v4();
    let delta = full_delta();

    MergeEngine::apply(&storage, user, &delta).await.unwrap();
    let task_before = TaskRepository::get_by_remote_id(&storage.conn, &user, "t1")
        .await
        .unwrap()
        .unwrap();

    let outcome = MergeEngine::apply(&storage, user, &delta).await.unwrap();
    assert_eq!(outcome.created, 0);
    assert_eq!(outcome.updated, 4);

    let task_after = TaskRepository::get_by_remote_id(&storage.conn, &user, "t1")
        .await
        .unwrap()
        .unwrap();
    // Same local identity, same content, no duplicate rows.
    assert_eq!(task_before, task_after);
    let all_tasks = TaskRepository::get_all_for_user(&storage.conn, &user).await.unwrap();
    assert_eq!(all_tasks.len(), 1);
}

#[tokio::test]
async fn malformed_item_is_skipped_without_failing_the_delta() {
    let storage = LocalStorage::in_memory().await.unwrap();
    let user = Uuid::new_v4();

    let mut delta = full_delta();
    // A project missing its required name, among otherwise valid items.
    delta.projects.push(json!({ "id": "p2", "color": "blue" }));

    let outcome = MergeEngine::apply(&storage, user, &delta).await.unwrap();
    assert_eq!(outcome.skipped, 1);
    assert_eq!(outcome.created, 4);

    let projects = ProjectRepository::get_all_for_user(&storage.conn, &user).await.unwrap();
    assert_eq!(projects.len(), 1);
}

#[tokio::test]
async fn remote_delete_is_a_soft_delete_and_keeps_the_mapping() {
    let storage = LocalStorage::in_memory().await.unwrap();
    let user = Uuid::new_v4();
    MergeEngine::apply(&storage, user, &full_delta()).await.unwrap();

    let delete = SyncDelta {
        tasks: vec![json!({ "id": "t1", "content": "", "project_id": "p1", "is_deleted": true })],
        sync_token: "cursor-2".to_string(),
        ..Default::default()
    };
    let outcome = MergeEngine::apply(&storage, user, &delete).await.unwrap();
    assert_eq!(outcome.deleted, 1);

    let task = TaskRepository::get_by_remote_id(&storage.conn, &user, "t1")
        .await
        .unwrap()
        .expect("row should survive deletion");
    assert!(task.is_deleted);

    let mapping = MappingRepository::get(&storage.conn, &user, ItemKind::Task, "t1")
        .await
        .unwrap();
    assert!(mapping.is_some(), "mapping should survive deletion");
}

#[tokio::test]
async fn deleting_an_unknown_item_is_a_noop() {
    let storage = LocalStorage::in_memory().await.unwrap();
    let user = Uuid::new_v4();

    let delta = SyncDelta {
        tasks: vec![json!({ "id": "ghost", "content": "", "project_id": "p1", "is_deleted": true })],
        sync_token: "cursor-1".to_string(),
        ..Default::default()
    };
    let outcome = MergeEngine::apply(&storage, user, &delta).await.unwrap();
    assert_eq!(outcome.deleted, 0);
    assert_eq!(outcome.skipped, 0);
}

#[tokio::test]
async fn create_then_delete_in_one_delta_lands_deleted() {
    let storage = LocalStorage::in_memory().await.unwrap();
    let user = Uuid::new_v4();

    let delta = SyncDelta {
        projects: vec![
            json!({ "id": "p1", "name": "Short-lived" }),
            json!({ "id": "p1", "name": "Short-lived", "is_deleted": true }),
        ],
        sync_token: "cursor-1".to_string(),
        ..Default::default()
    };
    let outcome = MergeEngine::apply(&storage, user, &delta).await.unwrap();
    assert_eq!(outcome.deleted, 1);

    let project = ProjectRepository::get_by_remote_id(&storage.conn, &user, "p1")
        .await
        .unwrap()
        .expect("row should exist, soft-deleted");
    assert!(project.is_deleted, "tombstone in the same delta must apply");
}

#[tokio::test]
async fn task_created_and_deleted_in_one_delta_lands_deleted() {
    let storage = LocalStorage::in_memory().await.unwrap();
    let user = Uuid::new_v4();

    let delta = SyncDelta {
        projects: vec![json!({ "id": "p1", "name": "Inbox" })],
        tasks: vec![
            json!({ "id": "t1", "content": "fleeting", "project_id": "p1" }),
            json!({ "id": "t1", "content": "fleeting", "project_id": "p1", "is_deleted": true }),
        ],
        sync_token: "cursor-1".to_string(),
        ..Default::default()
    };
    MergeEngine::apply(&storage, user, &delta).await.unwrap();

    let task = TaskRepository::get_by_remote_id(&storage.conn, &user, "t1")
        .await
        .unwrap()
        .expect("row should exist, soft-deleted");
    assert!(task.is_deleted);
}

#[tokio::test]
async fn duplicate_remote_ids_in_one_delta_converge_to_one_row() {
    let storage = LocalStorage::in_memory().await.unwrap();
    let user = Uuid::new_v4();

    let delta = SyncDelta {
        projects: vec![
            json!({ "id": "p1", "name": "Old name" }),
            json!({ "id": "p1", "name": "New name" }),
        ],
        sync_token: "cursor-1".to_string(),
        ..Default::default()
    };
    MergeEngine::apply(&storage, user, &delta).await.unwrap();

    let projects = ProjectRepository::get_all_for_user(&storage.conn, &user).await.unwrap();
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].name, "New name");

    // The mapping points at the surviving row.
    let mapping = MappingRepository::get(&storage.conn, &user, ItemKind::Project, "p1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(mapping.local_uuid, projects[0].uuid);
}

#[tokio::test]
async fn locally_pinned_flag_survives_remote_updates() {
    let storage = LocalStorage::in_memory().await.unwrap();
    let user = Uuid::new_v4();
    MergeEngine::apply(&storage, user, &full_delta()).await.unwrap();

    let task = TaskRepository::get_by_remote_id(&storage.conn, &user, "t1")
        .await
        .unwrap()
        .unwrap();
    TaskRepository::set_pinned(&storage.conn, &task.uuid, true).await.unwrap();
    let project = ProjectRepository::get_by_remote_id(&storage.conn, &user, "p1")
        .await
        .unwrap()
        .unwrap();
    ProjectRepository::set_pinned(&storage.conn, &project.uuid, true).await.unwrap();

    let update = SyncDelta {
        projects: vec![json!({ "id": "p1", "name": "Renamed", "inbox_project": true })],
        tasks: vec![json!({ "id": "t1", "content": "feed the cat", "project_id": "p1" })],
        sync_token: "cursor-2".to_string(),
        ..Default::default()
    };
    MergeEngine::apply(&storage, user, &update).await.unwrap();

    let task = TaskRepository::get_by_remote_id(&storage.conn, &user, "t1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(task.content, "feed the cat");
    assert!(task.is_pinned, "remote update must not clear the pin");

    let project = ProjectRepository::get_by_remote_id(&storage.conn, &user, "p1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(project.name, "Renamed");
    assert!(project.is_pinned, "remote update must not clear the pin");
}

#[tokio::test]
async fn task_referencing_an_unknown_project_is_skipped() {
    let storage = LocalStorage::in_memory().await.unwrap();
    let user = Uuid::new_v4();

    let delta = SyncDelta {
        tasks: vec![json!({ "id": "t1", "content": "orphan", "project_id": "nope" })],
        sync_token: "cursor-1".to_string(),
        ..Default::default()
    };
    let outcome = MergeEngine::apply(&storage, user, &delta).await.unwrap();
    assert_eq!(outcome.skipped, 1);
    assert!(TaskRepository::get_by_remote_id(&storage.conn, &user, "t1")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn parent_links_resolve_within_one_delta() {
    let storage = LocalStorage::in_memory().await.unwrap();
    let user = Uuid::new_v4();

    let delta = SyncDelta {
        projects: vec![
            // Child listed before its parent on purpose.
            json!({ "id": "p2", "name": "Child", "parent_id": "p1" }),
            json!({ "id": "p1", "name": "Parent" }),
        ],
        sync_token: "cursor-1".to_string(),
        ..Default::default()
    };
    MergeEngine::apply(&storage, user, &delta).await.unwrap();

    let parent = ProjectRepository::get_by_remote_id(&storage.conn, &user, "p1")
        .await
        .unwrap()
        .unwrap();
    let child = ProjectRepository::get_by_remote_id(&storage.conn, &user, "p2")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(child.parent_uuid, Some(parent.uuid));
}

#[tokio::test]
async fn data_is_scoped_per_user() {
    let storage = LocalStorage::in_memory().await.unwrap();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    MergeEngine::apply(&storage, alice, &full_delta()).await.unwrap();
    MergeEngine::apply(&storage, bob, &full_delta()).await.unwrap();

    // Same remote ids, two separate local rows.
    let a = ProjectRepository::get_by_remote_id(&storage.conn, &alice, "p1")
        .await
        .unwrap()
        .unwrap();
    let b = ProjectRepository::get_by_remote_id(&storage.conn, &bob, "p1")
        .await
        .unwrap()
        .unwrap();
    assert_ne!(a.uuid, b.uuid);

    let rows = project::Entity::find().all(&storage.conn).await.unwrap();
    assert_eq!(rows.len(), 2);
    let tasks = task::Entity::find().all(&storage.conn).await.unwrap();
    assert_eq!(tasks.len(), 2);
}
