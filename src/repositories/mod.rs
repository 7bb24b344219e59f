//! Repository layer for database operations.
//!
//! This module provides repository structs that encapsulate database queries
//! and operations, following the Data Mapper pattern recommended by SeaORM.
//! Repositories keep entities as pure data models while providing reusable
//! database access methods.

pub mod id_mapping;
pub mod label;
pub mod project;
pub mod section;
pub mod sync_state;
pub mod task;

pub use id_mapping::MappingRepository;
pub use label::LabelRepository;
pub use project::ProjectRepository;
pub use section::SectionRepository;
pub use sync_state::SyncStateRepository;
pub use task::TaskRepository;
