//! Outbox task entity.

pub mod model;
pub mod status;

pub use model::{CreateSyncTask, SyncTask};
pub use status::{TaskAction, TaskStatus};
