pub mod id_mapping;
pub mod label;
pub mod project;
pub mod section;
pub mod sync_state;
pub mod task;
pub mod task_label;

pub use id_mapping::Entity as IdMapping;
pub use label::Entity as Label;
pub use project::Entity as Project;
pub use section::Entity as Section;
pub use sync_state::Entity as SyncState;
pub use task::Entity as Task;
pub use task_label::Entity as TaskLabel;
