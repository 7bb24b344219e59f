//! Local storage module for persisted task data and sync state
//!
//! This module provides database operations using SeaORM for:
//! - Projects
//! - Sections
//! - Tasks
//! - Labels
//! - Task-label relationships
//! - Per-user sync state and remote-id mappings

pub mod db;

pub use db::LocalStorage;
