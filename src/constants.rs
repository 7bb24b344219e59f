//! Application constants and default tuning values.

/// Consecutive failures after which a user's auto-sync is disabled.
pub const DEFAULT_DISABLE_THRESHOLD: u32 = 5;

/// Base delay for exponential backoff, in seconds.
pub const DEFAULT_BACKOFF_BASE_SECS: u64 = 30;

/// Ceiling for exponential backoff, in seconds (one hour).
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 3600;

/// Global cap on concurrent in-flight remote fetches across all users.
pub const DEFAULT_MAX_CONCURRENT_SYNCS: usize = 8;

/// Sync frequency assigned to users that have not chosen one, in minutes.
pub const DEFAULT_FREQUENCY_MINUTES: u32 = 30;

/// Upper bound accepted for a user's sync frequency (24 hours).
pub const MAX_FREQUENCY_MINUTES: u32 = 1440;

/// Config file looked up in the working directory before the XDG dir.
pub const CONFIG_FILE_NAME: &str = "tasksync.toml";

/// Capacity of each job's command channel.
pub const JOB_CHANNEL_CAPACITY: usize = 4;
