//! Job registry and admission control.
//!
//! The scheduler owns one spawned [`SyncJob`] loop per auto-sync user plus
//! the global semaphore that caps how many fetches are in flight at once.
//! It is the only writer of the job map; everything else talks to jobs
//! through their command channels.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use log::{debug, info, warn};
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::constants::JOB_CHANNEL_CAPACITY;
use crate::entities::sync_state;
use crate::job::{JobCommand, JobOutcome, SyncJob};
use crate::remote::ExternalSyncClient;
use crate::repositories::SyncStateRepository;
use crate::storage::LocalStorage;

/// What a manual sync trigger did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// Handed to the user's running job loop.
    Started,
    /// No job loop for this user; a one-shot attempt ran to completion.
    Completed,
    /// A sync was already in flight; the trigger coalesced into it.
    AlreadyInProgress,
}

struct JobHandle {
    commands: mpsc::Sender<JobCommand>,
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Owns the per-user job loops and the global concurrency cap.
pub struct Scheduler {
    storage: Arc<LocalStorage>,
    client: Arc<dyn ExternalSyncClient>,
    settings: SyncConfig,
    semaphore: Arc<Semaphore>,
    jobs: Mutex<HashMap<Uuid, JobHandle>>,
}

impl Scheduler {
    pub fn new(
        storage: Arc<LocalStorage>,
        client: Arc<dyn ExternalSyncClient>,
        settings: SyncConfig,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(settings.max_concurrent_syncs));
        Self {
            storage,
            client,
            settings,
            semaphore,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Spawn a job for every auto-sync user that does not already have a
    /// live one. Calling this twice in a row starts nothing the second time.
    pub async fn start_all(&self) -> Result<usize> {
        let states = SyncStateRepository::get_auto_enabled(&self.storage.conn).await?;
        let mut jobs = self.jobs.lock().await;
        let mut started = 0;

        for state in states {
            if let Some(existing) = jobs.get(&state.user_uuid) {
                if !existing.handle.is_finished() {
                    debug!("job for user {} already live, skipping", state.user_uuid);
                    continue;
                }
            }
            self.spawn_job(&mut jobs, &state);
            started += 1;
        }

        info!("started {started} sync job(s), {} total", jobs.len());
        Ok(started)
    }

    /// Shut every job down and wait for in-flight attempts to finish.
    pub async fn stop_all(&self) {
        let drained: Vec<(Uuid, JobHandle)> = self.jobs.lock().await.drain().collect();
        for (user_uuid, job) in drained {
            let _ = job.commands.send(JobCommand::Shutdown).await;
            if let Err(e) = job.handle.await {
                warn!("job for user {user_uuid} ended badly: {e}");
            }
        }
        info!("all sync jobs stopped");
    }

    /// React to a change in one user's sync state: re-read it and bring the
    /// job map in line. A deleted or disabled user loses their job (any
    /// in-flight attempt still commits its result); an enabled user gets a
    /// fresh loop picking up the new settings.
    pub async fn handle_user_update(&self, user_uuid: Uuid) -> Result<()> {
        let state = SyncStateRepository::get(&self.storage.conn, &user_uuid).await?;
        let mut jobs = self.jobs.lock().await;

        match state {
            None => {
                if let Some(job) = jobs.remove(&user_uuid) {
                    info!("user {user_uuid} gone, dropping their sync job");
                    let _ = job.commands.send(JobCommand::Shutdown).await;
                }
            }
            Some(state) if !state.auto_sync_enabled => {
                if let Some(job) = jobs.remove(&user_uuid) {
                    info!("auto-sync disabled for user {user_uuid}, dropping their job");
                    let _ = job.commands.send(JobCommand::Shutdown).await;
                }
            }
            Some(state) => {
                if let Some(job) = jobs.remove(&user_uuid) {
                    let _ = job.commands.send(JobCommand::Shutdown).await;
                }
                self.spawn_job(&mut jobs, &state);
                info!("restarted sync job for user {user_uuid}");
            }
        }
        Ok(())
    }

    /// Sync a user now. Coalesces with any attempt already in flight.
    pub async fn trigger_sync(&self, user_uuid: Uuid) -> Result<TriggerOutcome> {
        let jobs = self.jobs.lock().await;
        if let Some(job) = jobs.get(&user_uuid) {
            if !job.handle.is_finished() {
                if job.running.load(Ordering::SeqCst) {
                    return Ok(TriggerOutcome::AlreadyInProgress);
                }
                let _ = job.commands.send(JobCommand::SyncNow).await;
                return Ok(TriggerOutcome::Started);
            }
        }
        drop(jobs);

        // No live loop (manual sync for a user whose auto-sync is off);
        // run a one-shot attempt inline.
        let job = SyncJob::new(
            user_uuid,
            Arc::clone(&self.storage),
            Arc::clone(&self.client),
            self.settings.clone(),
            Arc::clone(&self.semaphore),
            Arc::new(AtomicBool::new(false)),
        );
        match job.run_once().await {
            JobOutcome::AlreadyRunning => Ok(TriggerOutcome::AlreadyInProgress),
            _ => Ok(TriggerOutcome::Completed),
        }
    }

    /// Number of job loops that have not finished.
    pub async fn active_jobs(&self) -> usize {
        let jobs = self.jobs.lock().await;
        jobs.values().filter(|j| !j.handle.is_finished()).count()
    }

    fn spawn_job(&self, jobs: &mut HashMap<Uuid, JobHandle>, state: &sync_state::Model) {
        let (tx, rx) = mpsc::channel(JOB_CHANNEL_CAPACITY);
        let running = Arc::new(AtomicBool::new(false));
        let job = SyncJob::new(
            state.user_uuid,
            Arc::clone(&self.storage),
            Arc::clone(&self.client),
            self.settings.clone(),
            Arc::clone(&self.semaphore),
            Arc::clone(&running),
        );
        let delay = initial_delay(state);
        debug!(
            "spawning sync job for user {} (first run in {delay:?})",
            state.user_uuid
        );
        let handle = tokio::spawn(job.run(rx, delay));
        jobs.insert(
            state.user_uuid,
            JobHandle {
                commands: tx,
                running,
                handle,
            },
        );
    }
}

/// Time until a user's stored `next_sync_at`; zero when it is unset or
/// already past, so a fresh or overdue user syncs immediately.
fn initial_delay(state: &sync_state::Model) -> Duration {
    match state.next_sync_at {
        Some(next) => (next - Utc::now()).to_std().unwrap_or(Duration::ZERO),
        None => Duration::ZERO,
    }
}
