//! Per-key request coalescing ("singleflight").
//!
//! [`Singleflight::run`] guarantees at most one concurrent execution of
//! the supplied future per key. Callers that arrive while an execution
//! for that key is in flight wait for the leader and receive a clone of
//! its result. Nothing is cached across calls: once the in-flight
//! execution finishes, the next call with the same key executes again.

use std::future::Future;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::error::AppError;
use crate::result::AppResult;

/// Generic per-key execution deduplication.
#[derive(Debug)]
pub struct Singleflight<T: Clone> {
    inflight: DashMap<String, broadcast::Sender<AppResult<T>>>,
}

enum Role<T: Clone> {
    Leader(broadcast::Sender<AppResult<T>>),
    Follower(broadcast::Receiver<AppResult<T>>),
}

impl<T: Clone> Default for Singleflight<T> {
    fn default() -> Self {
        Self {
            inflight: DashMap::new(),
        }
    }
}

impl<T: Clone + Send + 'static> Singleflight<T> {
    /// Create an empty singleflight group.
    pub fn new() -> Self {
        Self::default()
    }

    /// Execute `fut` for `key`, coalescing concurrent callers.
    ///
    /// The first caller for a key becomes the leader and runs the future;
    /// everyone else blocks until the leader finishes and shares its
    /// result. Errors are shared too ([`AppError`] clones without its
    /// source).
    pub async fn run<F, Fut>(&self, key: &str, fut: F) -> AppResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        // The entry guard holds the shard lock, so leader election is atomic.
        let role = match self.inflight.entry(key.to_string()) {
            Entry::Occupied(occupied) => Role::Follower(occupied.get().subscribe()),
            Entry::Vacant(vacant) => {
                let (tx, _rx) = broadcast::channel(1);
                vacant.insert(tx.clone());
                Role::Leader(tx)
            }
        };

        match role {
            Role::Follower(mut rx) => match rx.recv().await {
                Ok(result) => result,
                // The leader dropped without publishing (panic or task
                // abort); surface it rather than hanging forever.
                Err(_) => Err(AppError::internal(format!(
                    "coalesced execution for '{key}' was abandoned"
                ))),
            },
            Role::Leader(tx) => {
                let result = fut().await;
                // Deregister before publishing so a caller arriving now
                // starts a fresh execution instead of receiving a result
                // computed from state it may have just changed.
                self.inflight.remove(key);
                let _ = tx.send(result.clone());
                result
            }
        }
    }

    /// Number of executions currently in flight.
    pub fn inflight_len(&self) -> usize {
        self.inflight.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn concurrent_callers_share_one_execution() {
        let sf = Arc::new(Singleflight::<u64>::new());
        let executions = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let sf = sf.clone();
            let executions = executions.clone();
            handles.push(tokio::spawn(async move {
                sf.run("answer", || async {
                    executions.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(42)
                })
                .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 42);
        }
        assert_eq!(executions.load(Ordering::SeqCst), 1);
        assert_eq!(sf.inflight_len(), 0);
    }

    #[tokio::test]
    async fn errors_are_shared_with_followers() {
        let sf = Arc::new(Singleflight::<u64>::new());

        let leader = {
            let sf = sf.clone();
            tokio::spawn(async move {
                sf.run("boom", || async {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    Err(AppError::storage("remote unavailable"))
                })
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        let follower = sf.run("boom", || async { Ok(1) }).await;

        assert!(leader.await.unwrap().is_err());
        assert!(follower.is_err());
    }

    #[tokio::test]
    async fn sequential_calls_execute_again() {
        let sf = Singleflight::<u64>::new();
        let executions = AtomicUsize::new(0);

        for _ in 0..3 {
            let result = sf
                .run("seq", || async {
                    executions.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                })
                .await
                .unwrap();
            assert_eq!(result, 7);
        }
        assert_eq!(executions.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn distinct_keys_do_not_coalesce() {
        let sf = Arc::new(Singleflight::<String>::new());
        let a = {
            let sf = sf.clone();
            tokio::spawn(async move { sf.run("a", || async { Ok("a".to_string()) }).await })
        };
        let b = sf.run("b", || async { Ok("b".to_string()) }).await;

        assert_eq!(a.await.unwrap().unwrap(), "a");
        assert_eq!(b.unwrap(), "b");
    }
}
