//! Sync task action and status enumerations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a sync task does to the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TaskAction {
    /// Push a locally cached file to the remote store.
    Upload,
    /// Remove an object from the remote store.
    Delete,
}

impl TaskAction {
    /// Return the action as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of a sync task.
///
/// Transitions are `waiting → running → {success, failed}`. A `running`
/// task whose lease expired and a `failed` task past its retry backoff
/// are both reclaimable (treated as waiting by the next claim).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Queued, not yet claimed by a drain.
    Waiting,
    /// Claimed by a drain holding an unexpired lease.
    Running,
    /// Remote operation completed.
    Success,
    /// Remote operation failed; reclaimable after the retry backoff.
    Failed,
}

impl TaskStatus {
    /// Whether the task reached a state no drain will pick up again
    /// without an expired lease or backoff window.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Return the status as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
