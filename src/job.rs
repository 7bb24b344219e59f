//! Per-user sync job.
//!
//! One job owns one user's sync loop: fetch a delta (under the global
//! admission semaphore), merge it, and decide when to run next. Failures
//! drive exponential backoff; crossing the disable threshold, or any fatal
//! error, turns the user's auto-sync off until an operator re-enables it.
//!
//! The `running` flag gives per-user mutual exclusion: a manual trigger that
//! lands while a sync is in flight coalesces into the running attempt
//! instead of starting a second one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use log::{debug, error, info, warn};
use rand::Rng;
use tokio::sync::{mpsc, Semaphore};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::entities::sync_state::{self, SyncStatus};
use crate::errors::SyncError;
use crate::merge::MergeEngine;
use crate::remote::ExternalSyncClient;
use crate::repositories::SyncStateRepository;
use crate::storage::LocalStorage;

/// What a sync attempt decided about the future.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Run again after this delay.
    Scheduled(Duration),
    /// Auto-sync was (or already is) off for this user; stop the loop.
    Disabled,
    /// An attempt was already in flight; nothing was done.
    AlreadyRunning,
}

/// Commands a job loop accepts from the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobCommand {
    /// Sync now instead of waiting out the timer.
    SyncNow,
    Shutdown,
}

/// One user's sync job.
pub struct SyncJob {
    user_uuid: Uuid,
    storage: Arc<LocalStorage>,
    client: Arc<dyn ExternalSyncClient>,
    settings: SyncConfig,
    semaphore: Arc<Semaphore>,
    running: Arc<AtomicBool>,
}

impl SyncJob {
    pub fn new(
        user_uuid: Uuid,
        storage: Arc<LocalStorage>,
        client: Arc<dyn ExternalSyncClient>,
        settings: SyncConfig,
        semaphore: Arc<Semaphore>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            user_uuid,
            storage,
            client,
            settings,
            semaphore,
            running,
        }
    }

    /// Loop until shutdown or disable: sleep out the delay (or a `SyncNow`),
    /// run one attempt, reschedule from its outcome.
    pub async fn run(self, mut commands: mpsc::Receiver<JobCommand>, initial_delay: Duration) {
        let mut delay = initial_delay;
        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(JobCommand::SyncNow) => {}
                    Some(JobCommand::Shutdown) | None => break,
                },
                _ = tokio::time::sleep(delay) => {}
            }

            match self.run_once().await {
                JobOutcome::Scheduled(next) => delay = next,
                JobOutcome::Disabled => {
                    info!("auto-sync off for user {}, job loop ending", self.user_uuid);
                    break;
                }
                // Only reachable from a racing manual trigger; check back soon.
                JobOutcome::AlreadyRunning => delay = self.settings.backoff_base(),
            }
        }
    }

    /// Run a single sync attempt, honoring the in-flight flag.
    pub async fn run_once(&self) -> JobOutcome {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("sync already in flight for user {}", self.user_uuid);
            return JobOutcome::AlreadyRunning;
        }
        let outcome = self.execute().await;
        self.running.store(false, Ordering::SeqCst);

        match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                // Bookkeeping write failed; retry on the base delay rather
                // than losing the loop.
                error!("sync attempt for user {} hit a storage error: {e:#}", self.user_uuid);
                // Best effort: the persisted status must not stay `syncing`
                // with nothing in flight.
                if let Err(reset) = SyncStateRepository::set_status(
                    &self.storage.conn,
                    &self.user_uuid,
                    SyncStatus::Idle,
                )
                .await
                {
                    warn!("could not reset status for user {}: {reset:#}", self.user_uuid);
                }
                JobOutcome::Scheduled(apply_jitter(self.settings.backoff_base()))
            }
        }
    }

    async fn execute(&self) -> Result<JobOutcome> {
        let conn = &self.storage.conn;
        let Some(state) = SyncStateRepository::get(conn, &self.user_uuid).await? else {
            warn!("no sync state for user {}", self.user_uuid);
            return Ok(JobOutcome::Disabled);
        };
        if !state.auto_sync_enabled {
            return Ok(JobOutcome::Disabled);
        }
        if state.api_token.is_empty() {
            warn!("user {} has no credentials, disabling", self.user_uuid);
            SyncStateRepository::record_disabled(conn, &state, state.consecutive_failures + 1)
                .await?;
            return Ok(JobOutcome::Disabled);
        }

        SyncStateRepository::set_status(conn, &self.user_uuid, SyncStatus::Syncing).await?;

        match self.sync_attempt(&state).await {
            Ok(new_cursor) => {
                let frequency = self.frequency_minutes(&state);
                let now = Utc::now();
                let next = now + chrono::Duration::minutes(frequency);
                SyncStateRepository::record_success(conn, &state, &new_cursor, now, next).await?;
                Ok(JobOutcome::Scheduled(Duration::from_secs(
                    frequency as u64 * 60,
                )))
            }
            Err(e) => self.record_failure(&state, e).await,
        }
    }

    /// Fetch and merge. The admission permit is held for the fetch only;
    /// local merging does not count against the global concurrency cap.
    async fn sync_attempt(&self, state: &sync_state::Model) -> Result<String, SyncError> {
        let permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| SyncError::Transient("scheduler shutting down".to_string()))?;
        let cursor = if state.full_sync_required {
            None
        } else {
            state.sync_token.as_deref()
        };
        let delta = self.client.fetch_delta(&state.api_token, cursor).await?;
        drop(permit);

        if delta.is_empty() {
            debug!("nothing changed for user {}, cursor advances", self.user_uuid);
        } else {
            let outcome = MergeEngine::apply(&self.storage, self.user_uuid, &delta).await?;
            info!(
                "synced user {}: {} created, {} updated, {} deleted, {} skipped",
                self.user_uuid, outcome.created, outcome.updated, outcome.deleted, outcome.skipped
            );
        }
        Ok(delta.sync_token)
    }

    async fn record_failure(
        &self,
        state: &sync_state::Model,
        err: SyncError,
    ) -> Result<JobOutcome> {
        let conn = &self.storage.conn;
        let failures = state.consecutive_failures + 1;

        if err.is_fatal() {
            warn!("fatal error for user {}: {err}, disabling auto-sync", self.user_uuid);
            SyncStateRepository::record_disabled(conn, state, failures).await?;
            return Ok(JobOutcome::Disabled);
        }
        if failures as u32 >= self.settings.disable_threshold {
            warn!(
                "user {} failed {failures} times in a row ({err}), disabling auto-sync",
                self.user_uuid
            );
            SyncStateRepository::record_disabled(conn, state, failures).await?;
            return Ok(JobOutcome::Disabled);
        }

        let mut delay = backoff_delay(
            failures as u32,
            self.settings.backoff_base(),
            self.settings.backoff_max(),
        );
        if let SyncError::RateLimited {
            retry_after_secs: Some(secs),
        } = &err
        {
            // Retry-After is a floor, never a shortcut past the backoff.
            delay = delay.max(Duration::from_secs(*secs));
        }
        let delay = apply_jitter(delay);

        warn!(
            "sync failed for user {} ({err}), retry {failures}/{} in {delay:?}",
            self.user_uuid, self.settings.disable_threshold
        );
        let next = Utc::now() + chrono::Duration::seconds(delay.as_secs() as i64);
        SyncStateRepository::record_retry(conn, state, failures, next).await?;
        Ok(JobOutcome::Scheduled(delay))
    }

    fn frequency_minutes(&self, state: &sync_state::Model) -> i64 {
        if state.sync_frequency_minutes > 0 {
            state.sync_frequency_minutes as i64
        } else {
            self.settings.default_frequency_minutes as i64
        }
    }
}

/// Delay after `failures` consecutive failures: `base * 2^failures` capped
/// at `max`.
pub fn backoff_delay(failures: u32, base: Duration, max: Duration) -> Duration {
    let exponent = failures.min(31);
    base.saturating_mul(1u32 << exponent).min(max)
}

/// Spread retries out by +/- 10% so users failing together do not retry
/// together.
pub fn apply_jitter(delay: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(0.9..1.1);
    delay.mul_f64(factor)
}
