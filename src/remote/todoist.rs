//! Todoist sync-endpoint client.
//!
//! Speaks the incremental sync protocol: `POST /sync` with the stored
//! `sync_token` (or `*` for a full sync) and a list of resource types,
//! answered with per-type arrays of changed objects and a fresh token.
//! Error classification happens here, once, so the rest of the crate only
//! deals in [`SyncError`] variants.

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;

use super::{ExternalSyncClient, SyncDelta, FULL_SYNC_TOKEN};
use crate::errors::SyncError;

const DEFAULT_BASE_URL: &str = "https://api.todoist.com/sync/v9";

/// HTTP client for the Todoist sync API.
pub struct TodoistSyncClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SyncResponse {
    sync_token: String,
    #[serde(default)]
    full_sync: bool,
    #[serde(default)]
    projects: Vec<serde_json::Value>,
    #[serde(default)]
    labels: Vec<serde_json::Value>,
    #[serde(default)]
    sections: Vec<serde_json::Value>,
    #[serde(default, rename = "items")]
    tasks: Vec<serde_json::Value>,
}

impl TodoistSyncClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Point the client at a different endpoint, used by tests.
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl Default for TodoistSyncClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExternalSyncClient for TodoistSyncClient {
    async fn fetch_delta(
        &self,
        api_token: &str,
        cursor: Option<&str>,
    ) -> Result<SyncDelta, SyncError> {
        let sync_token = cursor.unwrap_or(FULL_SYNC_TOKEN);
        debug!(
            "fetching delta (full sync: {})",
            sync_token == FULL_SYNC_TOKEN
        );

        let body = serde_json::json!({
            "sync_token": sync_token,
            "resource_types": ["projects", "labels", "sections", "items"],
        });

        let response = self
            .http
            .post(format!("{}/sync", self.base_url))
            .bearer_auth(api_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| SyncError::Transient(format!("request failed: {e}")))?;

        let status = response.status();
        match status.as_u16() {
            200 => {
                let parsed: SyncResponse = response
                    .json()
                    .await
                    .map_err(|e| SyncError::Transient(format!("undecodable response: {e}")))?;
                Ok(SyncDelta {
                    projects: parsed.projects,
                    labels: parsed.labels,
                    sections: parsed.sections,
                    tasks: parsed.tasks,
                    sync_token: parsed.sync_token,
                    full_sync: parsed.full_sync,
                })
            }
            401 | 403 => Err(SyncError::FatalCredential(format!(
                "remote service answered {status}"
            ))),
            429 => {
                let retry_after_secs = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok());
                Err(SyncError::RateLimited { retry_after_secs })
            }
            _ => Err(SyncError::Transient(format!(
                "unexpected status {status}"
            ))),
        }
    }
}
