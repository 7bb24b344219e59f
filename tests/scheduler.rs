use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use sea_orm::{ActiveValue, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use tokio::sync::Semaphore;
use uuid::Uuid;

use tasksync::config::SyncConfig;
use tasksync::control::{dispatch, ControlCommand, ControlResponse};
use tasksync::entities::sync_state::{self, SyncStatus};
use tasksync::errors::SyncError;
use tasksync::job::{JobOutcome, SyncJob};
use tasksync::remote::{ExternalSyncClient, SyncDelta};
use tasksync::repositories::SyncStateRepository;
use tasksync::scheduler::{Scheduler, TriggerOutcome};
use tasksync::storage::LocalStorage;

/// Scripted client: pops one canned response per fetch and records the
/// cursor each fetch was made with.
struct MockClient {
    responses: Mutex<VecDeque<Result<SyncDelta, SyncError>>>,
    cursors: Mutex<Vec<Option<String>>>,
    calls: AtomicUsize,
}

impl MockClient {
    fn new(responses: Vec<Result<SyncDelta, SyncError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            cursors: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn cursors(&self) -> Vec<Option<String>> {
        self.cursors.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExternalSyncClient for MockClient {
    async fn fetch_delta(
        &self,
        _api_token: &str,
        cursor: Option<&str>,
    ) -> Result<SyncDelta, SyncError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.cursors.lock().unwrap().push(cursor.map(String::from));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(empty_delta("fallback")))
    }
}

fn empty_delta(token: &str) -> SyncDelta {
    SyncDelta {
        sync_token: token.to_string(),
        full_sync: false,
        ..Default::default()
    }
}

fn settings() -> SyncConfig {
    SyncConfig::default()
}

async fn seed_user(storage: &LocalStorage, user: Uuid, failures: i32, enabled: bool) {
    let state = sync_state::ActiveModel {
        user_uuid: ActiveValue::Set(user),
        api_token: ActiveValue::Set("secret".to_string()),
        sync_token: ActiveValue::Set(None),
        full_sync_required: ActiveValue::Set(true),
        status: ActiveValue::Set("idle".to_string()),
        error_count: ActiveValue::Set(0),
        consecutive_failures: ActiveValue::Set(failures),
        auto_sync_enabled: ActiveValue::Set(enabled),
        sync_frequency_minutes: ActiveValue::Set(30),
        last_sync_at: ActiveValue::Set(None),
        // Far future so spawned loops stay idle during tests.
        next_sync_at: ActiveValue::Set(Some(Utc::now() + ChronoDuration::hours(6))),
    };
    SyncStateRepository::upsert(&storage.conn, state).await.unwrap();
}

fn job(
    user: Uuid,
    storage: &Arc<LocalStorage>,
    client: Arc<dyn ExternalSyncClient>,
    running: Arc<AtomicBool>,
) -> SyncJob {
    SyncJob::new(
        user,
        Arc::clone(storage),
        client,
        settings(),
        Arc::new(Semaphore::new(8)),
        running,
    )
}

#[tokio::test]
async fn first_sync_stores_cursor_and_schedules_the_next_run() {
    let storage = Arc::new(LocalStorage::in_memory().await.unwrap());
    let user = Uuid::new_v4();
    seed_user(&storage, user, 0, true).await;
    let client = MockClient::new(vec![Ok(empty_delta("cursor-1"))]);

    let job = job(user, &storage, client.clone(), Arc::new(AtomicBool::new(false)));
    let outcome = job.run_once().await;
    assert_eq!(outcome, JobOutcome::Scheduled(Duration::from_secs(30 * 60)));
    assert_eq!(client.calls(), 1);

    let state = SyncStateRepository::get(&storage.conn, &user).await.unwrap().unwrap();
    assert_eq!(state.sync_token.as_deref(), Some("cursor-1"));
    assert!(!state.full_sync_required);
    assert_eq!(state.consecutive_failures, 0);
    assert_eq!(state.status(), SyncStatus::Idle);

    let last = state.last_sync_at.expect("last_sync_at should be set");
    let next = state.next_sync_at.expect("next_sync_at should be set");
    assert_eq!(next, last + ChronoDuration::minutes(30));
}

#[tokio::test]
async fn second_sync_resumes_from_the_stored_cursor() {
    let storage = Arc::new(LocalStorage::in_memory().await.unwrap());
    let user = Uuid::new_v4();
    seed_user(&storage, user, 0, true).await;
    let client = MockClient::new(vec![
        Ok(empty_delta("cursor-1")),
        Ok(empty_delta("cursor-2")),
    ]);
    let job = job(user, &storage, client.clone(), Arc::new(AtomicBool::new(false)));

    job.run_once().await;
    job.run_once().await;

    // First fetch is a full sync (no cursor), the second resumes.
    assert_eq!(
        client.cursors(),
        vec![None, Some("cursor-1".to_string())]
    );
    let state = SyncStateRepository::get(&storage.conn, &user).await.unwrap().unwrap();
    assert_eq!(state.sync_token.as_deref(), Some("cursor-2"));
}

#[tokio::test]
async fn malformed_items_do_not_count_as_failures() {
    let storage = Arc::new(LocalStorage::in_memory().await.unwrap());
    let user = Uuid::new_v4();
    seed_user(&storage, user, 0, true).await;

    let mut delta = empty_delta("cursor-1");
    delta.projects = vec![
        serde_json::json!({ "id": "p1", "name": "Valid" }),
        serde_json::json!({ "id": "p2" }), // no name
    ];
    let client = MockClient::new(vec![Ok(delta)]);
    let job = job(user, &storage, client, Arc::new(AtomicBool::new(false)));

    assert!(matches!(job.run_once().await, JobOutcome::Scheduled(_)));

    let state = SyncStateRepository::get(&storage.conn, &user).await.unwrap().unwrap();
    assert_eq!(state.consecutive_failures, 0);
    assert_eq!(state.error_count, 0);
    assert_eq!(state.sync_token.as_deref(), Some("cursor-1"));
}

#[tokio::test]
async fn transient_failures_back_off_exponentially() {
    let storage = Arc::new(LocalStorage::in_memory().await.unwrap());
    let user = Uuid::new_v4();
    seed_user(&storage, user, 0, true).await;
    let client = MockClient::new(vec![
        Err(SyncError::Transient("connection reset".to_string())),
        Err(SyncError::Transient("connection reset".to_string())),
    ]);
    let job = job(user, &storage, client, Arc::new(AtomicBool::new(false)));

    // First failure: base * 2 (60s), +/- 10% jitter.
    let JobOutcome::Scheduled(first) = job.run_once().await else {
        panic!("expected a scheduled retry");
    };
    assert!(first >= Duration::from_secs(54) && first <= Duration::from_secs(66));

    // Second failure: doubled again.
    let JobOutcome::Scheduled(second) = job.run_once().await else {
        panic!("expected a scheduled retry");
    };
    assert!(second >= Duration::from_secs(108) && second <= Duration::from_secs(132));

    let state = SyncStateRepository::get(&storage.conn, &user).await.unwrap().unwrap();
    assert_eq!(state.consecutive_failures, 2);
    assert_eq!(state.error_count, 2);
    assert!(state.auto_sync_enabled);
    assert!(state.next_sync_at.is_some());
}

#[tokio::test]
async fn fifth_consecutive_failure_disables_auto_sync() {
    let storage = Arc::new(LocalStorage::in_memory().await.unwrap());
    let user = Uuid::new_v4();
    seed_user(&storage, user, 4, true).await;
    let client = MockClient::new(vec![Err(SyncError::Transient("still down".to_string()))]);
    let job = job(user, &storage, client, Arc::new(AtomicBool::new(false)));

    assert_eq!(job.run_once().await, JobOutcome::Disabled);

    let state = SyncStateRepository::get(&storage.conn, &user).await.unwrap().unwrap();
    assert!(!state.auto_sync_enabled);
    assert_eq!(state.consecutive_failures, 5);
    assert_eq!(state.status(), SyncStatus::Error);
    assert!(state.next_sync_at.is_none());

    // And a disabled user does not sync again.
    assert_eq!(job.run_once().await, JobOutcome::Disabled);
}

#[tokio::test]
async fn success_resets_the_failure_streak() {
    let storage = Arc::new(LocalStorage::in_memory().await.unwrap());
    let user = Uuid::new_v4();
    seed_user(&storage, user, 3, true).await;
    let client = MockClient::new(vec![Ok(empty_delta("cursor-1"))]);
    let job = job(user, &storage, client, Arc::new(AtomicBool::new(false)));

    assert!(matches!(job.run_once().await, JobOutcome::Scheduled(_)));

    let state = SyncStateRepository::get(&storage.conn, &user).await.unwrap().unwrap();
    assert_eq!(state.consecutive_failures, 0);
    assert!(state.auto_sync_enabled);
}

#[tokio::test]
async fn credential_failure_disables_immediately() {
    let storage = Arc::new(LocalStorage::in_memory().await.unwrap());
    let user = Uuid::new_v4();
    seed_user(&storage, user, 0, true).await;
    let client = MockClient::new(vec![Err(SyncError::FatalCredential(
        "remote service answered 401".to_string(),
    ))]);
    let job = job(user, &storage, client, Arc::new(AtomicBool::new(false)));

    assert_eq!(job.run_once().await, JobOutcome::Disabled);

    let state = SyncStateRepository::get(&storage.conn, &user).await.unwrap().unwrap();
    assert!(!state.auto_sync_enabled);
    assert_eq!(state.consecutive_failures, 1);
}

#[tokio::test]
async fn retry_after_is_a_floor_on_the_backoff() {
    let storage = Arc::new(LocalStorage::in_memory().await.unwrap());
    let user = Uuid::new_v4();
    seed_user(&storage, user, 0, true).await;
    let client = MockClient::new(vec![Err(SyncError::RateLimited {
        retry_after_secs: Some(300),
    })]);
    let job = job(user, &storage, client, Arc::new(AtomicBool::new(false)));

    let JobOutcome::Scheduled(delay) = job.run_once().await else {
        panic!("rate limiting should schedule a retry");
    };
    // 300s floor beats the 60s first-retry backoff; jitter stays within 10%.
    assert!(delay >= Duration::from_secs(270));
    assert!(delay <= Duration::from_secs(330));
}

#[tokio::test]
async fn missing_credentials_disable_the_user() {
    let storage = Arc::new(LocalStorage::in_memory().await.unwrap());
    let user = Uuid::new_v4();
    let state = sync_state::ActiveModel {
        user_uuid: ActiveValue::Set(user),
        api_token: ActiveValue::Set(String::new()),
        sync_token: ActiveValue::Set(None),
        full_sync_required: ActiveValue::Set(true),
        status: ActiveValue::Set("idle".to_string()),
        error_count: ActiveValue::Set(0),
        consecutive_failures: ActiveValue::Set(0),
        auto_sync_enabled: ActiveValue::Set(true),
        sync_frequency_minutes: ActiveValue::Set(30),
        last_sync_at: ActiveValue::Set(None),
        next_sync_at: ActiveValue::Set(None),
    };
    SyncStateRepository::upsert(&storage.conn, state).await.unwrap();

    let client = MockClient::new(vec![]);
    let job = job(user, &storage, client.clone(), Arc::new(AtomicBool::new(false)));
    assert_eq!(job.run_once().await, JobOutcome::Disabled);
    assert_eq!(client.calls(), 0, "no fetch without credentials");

    let state = SyncStateRepository::get(&storage.conn, &user).await.unwrap().unwrap();
    assert!(!state.auto_sync_enabled);
}

#[tokio::test]
async fn storage_failure_during_merge_is_retried_with_status_reset() {
    let storage = Arc::new(LocalStorage::in_memory().await.unwrap());
    let user = Uuid::new_v4();
    seed_user(&storage, user, 0, true).await;

    let mut delta = empty_delta("cursor-1");
    delta.projects = vec![serde_json::json!({ "id": "p1", "name": "Inbox" })];
    let client = MockClient::new(vec![Ok(delta)]);
    let job = job(user, &storage, client, Arc::new(AtomicBool::new(false)));

    // Break the merge mid-attempt.
    storage
        .conn
        .execute_unprepared("DROP TABLE id_mappings")
        .await
        .unwrap();

    assert!(matches!(job.run_once().await, JobOutcome::Scheduled(_)));

    let state = SyncStateRepository::get(&storage.conn, &user).await.unwrap().unwrap();
    assert_eq!(state.status(), SyncStatus::Idle, "status must not stay syncing");
    assert_eq!(state.consecutive_failures, 1);
    assert!(state.sync_token.is_none(), "cursor must not advance");
}

#[tokio::test]
async fn sync_state_outage_does_not_kill_the_loop() {
    let storage = Arc::new(LocalStorage::in_memory().await.unwrap());
    let user = Uuid::new_v4();
    seed_user(&storage, user, 0, true).await;
    let client = MockClient::new(vec![]);
    let job = job(user, &storage, client.clone(), Arc::new(AtomicBool::new(false)));

    storage
        .conn
        .execute_unprepared("DROP TABLE sync_states")
        .await
        .unwrap();

    // The attempt fails before any fetch, and the job reschedules instead
    // of panicking or disabling.
    let JobOutcome::Scheduled(delay) = job.run_once().await else {
        panic!("a storage outage should schedule a retry");
    };
    assert!(delay >= Duration::from_secs(27) && delay <= Duration::from_secs(33));
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn concurrent_trigger_coalesces_into_the_running_attempt() {
    let storage = Arc::new(LocalStorage::in_memory().await.unwrap());
    let user = Uuid::new_v4();
    seed_user(&storage, user, 0, true).await;
    let client = MockClient::new(vec![Ok(empty_delta("cursor-1"))]);

    let running = Arc::new(AtomicBool::new(false));
    let job = job(user, &storage, client.clone(), Arc::clone(&running));

    // Simulate an attempt in flight.
    running.store(true, Ordering::SeqCst);
    assert_eq!(job.run_once().await, JobOutcome::AlreadyRunning);
    assert_eq!(client.calls(), 0);

    running.store(false, Ordering::SeqCst);
    assert!(matches!(job.run_once().await, JobOutcome::Scheduled(_)));
    assert_eq!(client.calls(), 1);
}

#[tokio::test]
async fn start_all_is_idempotent() {
    let storage = Arc::new(LocalStorage::in_memory().await.unwrap());
    seed_user(&storage, Uuid::new_v4(), 0, true).await;
    seed_user(&storage, Uuid::new_v4(), 0, true).await;
    seed_user(&storage, Uuid::new_v4(), 0, false).await; // disabled, no job

    let client = MockClient::new(vec![]);
    let scheduler = Scheduler::new(Arc::clone(&storage), client, settings());

    assert_eq!(scheduler.start_all().await.unwrap(), 2);
    assert_eq!(scheduler.active_jobs().await, 2);

    // Second call finds both jobs live and starts nothing.
    assert_eq!(scheduler.start_all().await.unwrap(), 0);
    assert_eq!(scheduler.active_jobs().await, 2);

    scheduler.stop_all().await;
    assert_eq!(scheduler.active_jobs().await, 0);
}

#[tokio::test]
async fn user_update_removes_disabled_and_deleted_users() {
    let storage = Arc::new(LocalStorage::in_memory().await.unwrap());
    let disabled = Uuid::new_v4();
    let deleted = Uuid::new_v4();
    seed_user(&storage, disabled, 0, true).await;
    seed_user(&storage, deleted, 0, true).await;

    let client = MockClient::new(vec![]);
    let scheduler = Scheduler::new(Arc::clone(&storage), client, settings());
    scheduler.start_all().await.unwrap();
    assert_eq!(scheduler.active_jobs().await, 2);

    // One user turns auto-sync off, the other disappears entirely.
    seed_user(&storage, disabled, 0, false).await;
    sync_state::Entity::delete_many()
        .filter(sync_state::Column::UserUuid.eq(deleted))
        .exec(&storage.conn)
        .await
        .unwrap();

    scheduler.handle_user_update(disabled).await.unwrap();
    scheduler.handle_user_update(deleted).await.unwrap();
    assert_eq!(scheduler.active_jobs().await, 0);

    scheduler.stop_all().await;
}

#[tokio::test]
async fn user_update_restarts_the_job_for_an_enabled_user() {
    let storage = Arc::new(LocalStorage::in_memory().await.unwrap());
    let user = Uuid::new_v4();
    seed_user(&storage, user, 0, true).await;

    let client = MockClient::new(vec![]);
    let scheduler = Scheduler::new(Arc::clone(&storage), client, settings());
    scheduler.start_all().await.unwrap();

    scheduler.handle_user_update(user).await.unwrap();
    assert_eq!(scheduler.active_jobs().await, 1);

    scheduler.stop_all().await;
}

#[tokio::test]
async fn trigger_for_an_idle_user_runs_a_one_shot_sync() {
    let storage = Arc::new(LocalStorage::in_memory().await.unwrap());
    let user = Uuid::new_v4();
    seed_user(&storage, user, 0, true).await;

    let client = MockClient::new(vec![Ok(empty_delta("cursor-1"))]);
    let scheduler = Scheduler::new(Arc::clone(&storage), client.clone(), settings());

    // No job loop started for this user; the trigger syncs inline.
    let outcome = scheduler.trigger_sync(user).await.unwrap();
    assert_eq!(outcome, TriggerOutcome::Completed);
    assert_eq!(client.calls(), 1);

    let state = SyncStateRepository::get(&storage.conn, &user).await.unwrap().unwrap();
    assert_eq!(state.sync_token.as_deref(), Some("cursor-1"));
}

#[tokio::test]
async fn control_update_user_requires_a_user_id() {
    let storage = Arc::new(LocalStorage::in_memory().await.unwrap());
    let client = MockClient::new(vec![]);
    let scheduler = Scheduler::new(storage, client, settings());

    let err = dispatch(&scheduler, ControlCommand::UpdateUser { user_uuid: None })
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Configuration(_)));
    assert!(err.to_string().contains("user id required"));
}

#[tokio::test]
async fn control_start_and_stop_round_trip() {
    let storage = Arc::new(LocalStorage::in_memory().await.unwrap());
    seed_user(&storage, Uuid::new_v4(), 0, true).await;
    let client = MockClient::new(vec![]);
    let scheduler = Scheduler::new(Arc::clone(&storage), client, settings());

    let response = dispatch(&scheduler, ControlCommand::StartAll).await.unwrap();
    assert_eq!(response, ControlResponse::Started { jobs: 1 });

    let response = dispatch(&scheduler, ControlCommand::StopAll).await.unwrap();
    assert_eq!(response, ControlResponse::Stopped);
    assert_eq!(scheduler.active_jobs().await, 0);
}
