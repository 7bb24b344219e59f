//! Operator-facing control surface over the scheduler.
//!
//! Commands arrive already parsed (the transport is whoever embeds the
//! crate); dispatch validates them, drives the [`Scheduler`], and answers
//! with a serializable response.

use log::info;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::SyncError;
use crate::scheduler::{Scheduler, TriggerOutcome};

/// Control commands accepted by the daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ControlCommand {
    /// Start jobs for every auto-sync user.
    StartAll,
    /// Stop every job, waiting out in-flight attempts.
    StopAll,
    /// A user's sync settings changed (or the user was deleted).
    UpdateUser { user_uuid: Option<Uuid> },
    /// Sync one user now.
    TriggerSync { user_uuid: Uuid },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ControlResponse {
    Started { jobs: usize },
    Stopped,
    UserUpdated,
    Triggered { outcome: String },
}

impl From<TriggerOutcome> for ControlResponse {
    fn from(outcome: TriggerOutcome) -> Self {
        let outcome = match outcome {
            TriggerOutcome::Started => "started",
            TriggerOutcome::Completed => "completed",
            TriggerOutcome::AlreadyInProgress => "already_in_progress",
        };
        ControlResponse::Triggered {
            outcome: outcome.to_string(),
        }
    }
}

/// Execute one control command against the scheduler.
pub async fn dispatch(
    scheduler: &Scheduler,
    command: ControlCommand,
) -> Result<ControlResponse, SyncError> {
    info!("control command: {command:?}");
    match command {
        ControlCommand::StartAll => {
            let jobs = scheduler
                .start_all()
                .await
                .map_err(SyncError::storage)?;
            Ok(ControlResponse::Started { jobs })
        }
        ControlCommand::StopAll => {
            scheduler.stop_all().await;
            Ok(ControlResponse::Stopped)
        }
        ControlCommand::UpdateUser { user_uuid } => {
            let user_uuid = user_uuid
                .ok_or_else(|| SyncError::Configuration("user id required".to_string()))?;
            scheduler
                .handle_user_update(user_uuid)
                .await
                .map_err(SyncError::storage)?;
            Ok(ControlResponse::UserUpdated)
        }
        ControlCommand::TriggerSync { user_uuid } => {
            let outcome = scheduler.trigger_sync(user_uuid).await.map_err(SyncError::storage)?;
            Ok(outcome.into())
        }
    }
}
