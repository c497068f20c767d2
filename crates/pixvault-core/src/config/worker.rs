//! Sync worker configuration.

use serde::{Deserialize, Serialize};

/// Outbox sync worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Whether the sync worker is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Lease duration in seconds after which a running task whose worker
    /// crashed becomes reclaimable.
    #[serde(default = "default_lease")]
    pub lease_seconds: u64,
    /// Backoff in seconds before a failed task is claimed again.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_seconds: u64,
    /// Interval in seconds between periodic drains (catches missed
    /// notifications and expired leases).
    #[serde(default = "default_tick")]
    pub tick_seconds: u64,
    /// Capacity of the drain-notification channel.
    #[serde(default = "default_queue_capacity")]
    pub notify_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            lease_seconds: default_lease(),
            retry_backoff_seconds: default_retry_backoff(),
            tick_seconds: default_tick(),
            notify_capacity: default_queue_capacity(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_lease() -> u64 {
    600
}

fn default_retry_backoff() -> u64 {
    60
}

fn default_tick() -> u64 {
    60
}

fn default_queue_capacity() -> usize {
    16
}
