//! Drain runner: a dedicated task that wakes on mutation notifications
//! and on a periodic tick.
//!
//! The periodic tick catches notifications lost to a full channel or a
//! crashed process, and is what eventually reclaims expired leases.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use pixvault_core::config::worker::WorkerConfig;

use crate::queue::SyncQueue;

/// Settled tasks are kept this long for inspection before cleanup.
const SETTLED_RETAIN_SECONDS: i64 = 24 * 60 * 60;

/// Owns the receiving half of the drain-notification channel and drives
/// the queue.
#[derive(Debug)]
pub struct SyncRunner {
    queue: Arc<SyncQueue>,
    notifications: mpsc::Receiver<()>,
    tick: Duration,
    shutdown: watch::Receiver<bool>,
}

impl SyncRunner {
    /// Create a new runner.
    pub fn new(
        queue: Arc<SyncQueue>,
        notifications: mpsc::Receiver<()>,
        config: &WorkerConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            queue,
            notifications,
            tick: Duration::from_secs(config.tick_seconds.max(1)),
            shutdown,
        }
    }

    /// Run until shutdown is signalled. Intended to be spawned.
    pub async fn run(mut self) {
        info!(tick_seconds = self.tick.as_secs(), "Sync runner started");
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately and drains whatever a
        // previous process left behind.

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        break;
                    }
                }
                notification = self.notifications.recv() => {
                    match notification {
                        Some(()) => self.drain().await,
                        // Every notifier dropped; the tick keeps the
                        // queue moving until shutdown.
                        None => {
                            self.tick_only().await;
                            break;
                        }
                    }
                }
                _ = ticker.tick() => {
                    self.drain().await;
                    if let Err(e) = self.queue.cleanup_settled(SETTLED_RETAIN_SECONDS).await {
                        error!(error = %e, "Task cleanup failed");
                    }
                }
            }
        }
        info!("Sync runner stopped");
    }

    async fn drain(&self) {
        if let Err(e) = self.queue.run().await {
            error!(error = %e, "Sync drain failed");
        }
    }

    /// Fallback loop once the notification channel is closed.
    async fn tick_only(&mut self) {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        return;
                    }
                }
                _ = ticker.tick() => self.drain().await,
            }
        }
    }
}
