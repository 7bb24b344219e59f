//! Tasksync - a per-user synchronization scheduler for task data
//!
//! This library keeps a local SQLite mirror of each user's projects,
//! sections, tasks, and labels in step with an external task service's
//! incremental sync endpoint. Every user gets their own job loop with
//! exponential backoff on failure; a global semaphore caps how many
//! fetches run at once.
//!
//! # Modules
//!
//! The library is organized into several key modules:
//!
//! * [`config`] - Application configuration management
//! * [`storage`] - Local database and data persistence
//! * [`remote`] - External service client and wire types
//! * [`mapper`] / [`merge`] - Translating and applying remote deltas
//! * [`job`] / [`scheduler`] - Per-user sync loops and admission control
//! * [`control`] - Operator command surface

/// Configuration module for managing application settings
pub mod config;

/// Application constants and default values
pub mod constants;

/// Operator control commands and dispatch
pub mod control;

/// SeaORM entity models for database tables
pub mod entities;

/// Error taxonomy for sync attempts
pub mod errors;

/// Per-user sync job state machine
pub mod job;

/// Log setup
pub mod logger;

/// Delta-to-entity translation
pub mod mapper;

/// Transactional delta application
pub mod merge;

/// Remote service client abstraction
pub mod remote;

/// Repository layer for database operations
pub mod repositories;

/// Job registry and global admission control
pub mod scheduler;

/// Local storage layer for the task mirror
pub mod storage;

// Re-export entity models for convenient access
pub use entities::{id_mapping, label, project, section, sync_state, task, task_label};
