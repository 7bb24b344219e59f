//! Error taxonomy for synchronization operations.
//!
//! Remote failures are classified exactly once, at the client boundary, into
//! the variants below. The sync job branches on the classification: transient
//! errors retry with backoff, fatal credential errors disable the user's job,
//! malformed items are skipped without failing the run, and configuration
//! errors surface to whoever issued the control command.

use thiserror::Error;

/// Classified synchronization error.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Network or remote-side failure that is expected to clear on retry.
    #[error("transient failure: {0}")]
    Transient(String),

    /// The remote service asked us to slow down. Retryable with backoff;
    /// `retry_after_secs` is honored as a floor under the computed delay.
    #[error("rate limited by remote service")]
    RateLimited { retry_after_secs: Option<u64> },

    /// The credential was rejected. Never retried automatically.
    #[error("credential rejected: {0}")]
    FatalCredential(String),

    /// A single remote item could not be understood. Scoped to that item;
    /// the rest of the delta still commits.
    #[error("malformed remote item: {0}")]
    MalformedItem(String),

    /// Missing token, unknown user, or invalid control request.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Local database failure. Treated as transient by the job.
    #[error("storage failure: {0}")]
    Storage(String),
}

impl SyncError {
    /// Wrap any database error as a storage failure.
    pub fn storage<E: std::fmt::Display>(err: E) -> Self {
        SyncError::Storage(err.to_string())
    }

    /// Whether the job should retry with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::Transient(_) | SyncError::RateLimited { .. } | SyncError::Storage(_)
        )
    }

    /// Whether the job must stop and require manual intervention.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::FatalCredential(_) | SyncError::Configuration(_))
    }
}
