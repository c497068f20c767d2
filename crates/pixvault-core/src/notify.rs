//! Drain notification channel between mutation paths and the sync worker.
//!
//! Node mutations that enqueue outbox tasks call [`SyncNotifier::notify`]
//! after their transaction commits. The worker's runner owns the receiving
//! half and drains the outbox once per wake-up. The channel is bounded and
//! `notify` never blocks: a full channel means a drain is already pending,
//! which is all the signal carries.

use tokio::sync::mpsc;
use tracing::trace;

/// Sending half of the drain-notification channel.
#[derive(Debug, Clone)]
pub struct SyncNotifier {
    tx: mpsc::Sender<()>,
}

impl SyncNotifier {
    /// Create a notifier and its receiving half with the given capacity.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Request a drain of the outbox. Non-blocking; coalesces with any
    /// notification already queued.
    pub fn notify(&self) {
        match self.tx.try_send(()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(())) => {
                trace!("drain already pending, notification coalesced");
            }
            Err(mpsc::error::TrySendError::Closed(())) => {
                trace!("sync runner stopped, notification dropped");
            }
        }
    }
}
