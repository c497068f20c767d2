//! Sync task entity model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::{TaskAction, TaskStatus};

/// One outbox entry: a pending remote-store operation.
///
/// Tasks are inserted in the same transaction as the node mutation that
/// requires them, so the outbox survives a crash between the mutation
/// and the drain.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SyncTask {
    /// Surrogate key.
    pub id: i64,
    /// Remote operation to perform.
    pub action: TaskAction,
    /// Absolute path of the cached file (uploads only).
    pub local_path: String,
    /// Remote object key.
    pub remote_path: String,
    /// Current status.
    pub status: TaskStatus,
    /// Number of times a drain has claimed this task.
    pub attempts: i64,
    /// Lease timestamp (unix seconds) set when the task was claimed.
    pub locked_at: i64,
    /// Creation timestamp (unix seconds).
    pub create_time: i64,
    /// Last update timestamp (unix seconds).
    pub update_time: i64,
}

/// Data required to enqueue a new sync task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSyncTask {
    /// Remote operation to perform.
    pub action: TaskAction,
    /// Absolute path of the cached file (uploads only).
    pub local_path: String,
    /// Remote object key.
    pub remote_path: String,
}

impl CreateSyncTask {
    /// An upload task for a cached file.
    pub fn upload(local_path: impl Into<String>, remote_path: impl Into<String>) -> Self {
        Self {
            action: TaskAction::Upload,
            local_path: local_path.into(),
            remote_path: remote_path.into(),
        }
    }

    /// A delete task for a remote object.
    pub fn delete(remote_path: impl Into<String>) -> Self {
        Self {
            action: TaskAction::Delete,
            local_path: String::new(),
            remote_path: remote_path.into(),
        }
    }
}
