//! Outbox claim and drain.
//!
//! Claiming selects every reclaimable task and flips it to `running`
//! with a fresh lease in one transaction; a singleflight guard collapses
//! concurrent claim attempts into one query. The drain itself is
//! serialized by a mutex so the same task is never processed twice
//! concurrently.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, info};

use pixvault_core::config::worker::WorkerConfig;
use pixvault_core::error::{AppError, ErrorKind};
use pixvault_core::result::AppResult;
use pixvault_core::singleflight::Singleflight;
use pixvault_database::repositories::task::TaskRepository;
use pixvault_entity::task::{CreateSyncTask, SyncTask, TaskAction, TaskStatus};
use pixvault_storage::ContentStore;

/// Outcome of one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Tasks claimed in this pass.
    pub claimed: usize,
    /// Uploads that reached the remote store.
    pub uploaded: usize,
    /// Deletes that reached the remote store.
    pub deleted: usize,
    /// Tasks marked failed (retried on a later pass).
    pub failed: usize,
}

/// Durable queue of pending remote-sync operations.
#[derive(Debug)]
pub struct SyncQueue {
    task_repo: Arc<TaskRepository>,
    content: Arc<ContentStore>,
    config: WorkerConfig,
    /// Only one drain in flight at a time.
    run_lock: Mutex<()>,
    /// Collapses concurrent claim attempts into one query.
    claim_flight: Singleflight<Vec<SyncTask>>,
}

impl SyncQueue {
    /// Create a new sync queue.
    pub fn new(task_repo: Arc<TaskRepository>, content: Arc<ContentStore>, config: WorkerConfig) -> Self {
        Self {
            task_repo,
            content,
            config,
            run_lock: Mutex::new(()),
            claim_flight: Singleflight::new(),
        }
    }

    /// Enqueue tasks on a caller-owned transaction connection, so the
    /// outbox entry commits or rolls back with the node mutation it
    /// mirrors.
    pub async fn add(
        &self,
        conn: &mut sqlx::SqliteConnection,
        tasks: &[CreateSyncTask],
    ) -> AppResult<()> {
        self.task_repo
            .insert_batch(conn, tasks, chrono::Utc::now().timestamp())
            .await
    }

    /// Claim every reclaimable task: `waiting`, `failed` past the retry
    /// backoff, and `running` with an expired lease.
    async fn claim(&self) -> AppResult<Vec<SyncTask>> {
        self.claim_flight
            .run("claimable", || async {
                let now = chrono::Utc::now().timestamp();
                let mut tx = self.task_repo.pool().begin().await.map_err(|e| {
                    AppError::with_source(ErrorKind::Database, "Failed to begin claim", e)
                })?;

                let tasks = self
                    .task_repo
                    .find_claimable(
                        &mut *tx,
                        now,
                        self.config.lease_seconds as i64,
                        self.config.retry_backoff_seconds as i64,
                    )
                    .await?;
                if !tasks.is_empty() {
                    let ids: Vec<i64> = tasks.iter().map(|t| t.id).collect();
                    self.task_repo.mark_running(&mut *tx, &ids, now).await?;
                }

                tx.commit().await.map_err(|e| {
                    AppError::with_source(ErrorKind::Database, "Failed to commit claim", e)
                })?;
                Ok(tasks)
            })
            .await
    }

    /// Drain the outbox once: claim, then push uploads individually and
    /// deletes in one remote batch.
    ///
    /// Task failures never fail the drain; they are recorded on the task
    /// and retried by a later pass.
    pub async fn run(&self) -> AppResult<DrainReport> {
        let _guard = self.run_lock.lock().await;

        let tasks = self.claim().await?;
        if tasks.is_empty() {
            return Ok(DrainReport::default());
        }
        debug!(count = tasks.len(), "Claimed sync tasks");

        let mut report = DrainReport {
            claimed: tasks.len(),
            ..DrainReport::default()
        };
        let (uploads, deletes): (Vec<_>, Vec<_>) = tasks
            .into_iter()
            .partition(|t| t.action == TaskAction::Upload);

        for task in &uploads {
            if self.process_upload(task).await {
                report.uploaded += 1;
            } else {
                report.failed += 1;
            }
        }
        if !deletes.is_empty() {
            let (ok, failed) = self.process_delete_batch(&deletes).await;
            report.deleted += ok;
            report.failed += failed;
        }

        info!(
            claimed = report.claimed,
            uploaded = report.uploaded,
            deleted = report.deleted,
            failed = report.failed,
            "Drained sync queue"
        );
        Ok(report)
    }

    /// Upload one cached file; returns whether it succeeded.
    async fn process_upload(&self, task: &SyncTask) -> bool {
        let content_type = mime_guess::from_path(&task.local_path)
            .first_or_octet_stream()
            .to_string();
        let status = match self
            .content
            .upload(Path::new(&task.local_path), &task.remote_path, &content_type)
            .await
        {
            Ok(()) => TaskStatus::Success,
            Err(e) => {
                error!(task = task.id, error = %e, "Upload task failed");
                TaskStatus::Failed
            }
        };
        self.finish(task.id, status).await;
        status == TaskStatus::Success
    }

    /// Delete a batch of remote objects, marking exactly the failed
    /// subset failed. Returns `(succeeded, failed)` counts.
    async fn process_delete_batch(&self, tasks: &[SyncTask]) -> (usize, usize) {
        let keys: Vec<String> = tasks.iter().map(|t| t.remote_path.clone()).collect();
        let failed_keys = match self.content.delete_batch(&keys).await {
            Ok(failed) => failed,
            Err(e) => {
                error!(error = %e, "Batch delete failed outright");
                keys.clone()
            }
        };

        let mut succeeded = 0;
        let mut failed = 0;
        for task in tasks {
            let status = if failed_keys.contains(&task.remote_path) {
                failed += 1;
                TaskStatus::Failed
            } else {
                succeeded += 1;
                TaskStatus::Success
            };
            self.finish(task.id, status).await;
        }
        (succeeded, failed)
    }

    /// Record a task's terminal status; a lost update here only means a
    /// redundant retry after the lease expires.
    async fn finish(&self, task_id: i64, status: TaskStatus) {
        let now = chrono::Utc::now().timestamp();
        if let Err(e) = self
            .task_repo
            .update_status(self.task_repo.pool(), task_id, status, now)
            .await
        {
            error!(task = task_id, error = %e, "Failed to update task status");
        }
    }

    /// Drop settled tasks older than the retention window.
    pub async fn cleanup_settled(&self, retain_seconds: i64) -> AppResult<u64> {
        let before = chrono::Utc::now().timestamp() - retain_seconds;
        self.task_repo
            .cleanup_settled(self.task_repo.pool(), before)
            .await
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use pixvault_core::traits::remote::RemoteStore;
    use pixvault_database::connection::DatabasePool;
    use pixvault_database::migration::run_migrations;
    use pixvault_storage::backends::local::LocalRemoteStore;

    use super::*;

    struct Fixture {
        _dir: tempfile::TempDir,
        db: DatabasePool,
        task_repo: Arc<TaskRepository>,
        content: Arc<ContentStore>,
        queue: SyncQueue,
    }

    async fn fixture(config: WorkerConfig) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db = DatabasePool::connect_in_memory().await.unwrap();
        run_migrations(db.pool()).await.unwrap();

        let remote = Arc::new(
            LocalRemoteStore::new(dir.path().join("remote").to_str().unwrap())
                .await
                .unwrap(),
        );
        let content = Arc::new(ContentStore::new(
            dir.path().join("data"),
            remote as Arc<dyn RemoteStore>,
        ));
        let task_repo = Arc::new(TaskRepository::new(db.pool().clone()));
        let queue = SyncQueue::new(task_repo.clone(), content.clone(), config);
        Fixture {
            _dir: dir,
            db,
            task_repo,
            content,
            queue,
        }
    }

    fn fast_retry() -> WorkerConfig {
        WorkerConfig {
            retry_backoff_seconds: 0,
            ..WorkerConfig::default()
        }
    }

    async fn enqueue(f: &Fixture, task: CreateSyncTask) -> i64 {
        let now = chrono::Utc::now().timestamp();
        f.task_repo
            .insert_batch(f.db.pool(), &[task], now)
            .await
            .unwrap();
        sqlx::query_scalar::<_, i64>("SELECT MAX(id) FROM sync_tasks")
            .fetch_one(f.db.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn upload_task_pushes_cached_file_to_remote() {
        let f = fixture(WorkerConfig::default()).await;
        let local = f.content.write_cache(b"bytes", "aabbccdd", ".png").await.unwrap();
        let id = enqueue(
            &f,
            CreateSyncTask::upload(local.to_string_lossy().into_owned(), "aabbccdd.png"),
        )
        .await;

        let report = f.queue.run().await.unwrap();
        assert_eq!(report.claimed, 1);
        assert_eq!(report.uploaded, 1);

        let task = f.task_repo.find_by_id(f.db.pool(), id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Success);
        assert_eq!(task.attempts, 1);
        assert_eq!(
            f.content.download_bytes("aabbccdd.png").await.unwrap(),
            Bytes::from_static(b"bytes")
        );
    }

    #[tokio::test]
    async fn delete_tasks_are_batched_and_marked_individually() {
        let f = fixture(WorkerConfig::default()).await;
        f.content
            .upload_bytes(Bytes::from_static(b"1"), "k1.png", "")
            .await
            .unwrap();
        f.content
            .upload_bytes(Bytes::from_static(b"2"), "k2.png", "")
            .await
            .unwrap();
        let id1 = enqueue(&f, CreateSyncTask::delete("k1.png")).await;
        let id2 = enqueue(&f, CreateSyncTask::delete("k2.png")).await;

        let report = f.queue.run().await.unwrap();
        assert_eq!(report.deleted, 2);
        assert!(f.content.download_bytes("k1.png").await.is_err());
        assert!(f.content.download_bytes("k2.png").await.is_err());
        for id in [id1, id2] {
            let task = f.task_repo.find_by_id(f.db.pool(), id).await.unwrap().unwrap();
            assert_eq!(task.status, TaskStatus::Success);
        }
    }

    #[tokio::test]
    async fn settled_tasks_are_not_reclaimed() {
        let f = fixture(fast_retry()).await;
        f.content
            .upload_bytes(Bytes::from_static(b"x"), "gone.png", "")
            .await
            .unwrap();
        enqueue(&f, CreateSyncTask::delete("gone.png")).await;

        assert_eq!(f.queue.run().await.unwrap().claimed, 1);
        // Everything settled: the next drain claims nothing.
        assert_eq!(f.queue.run().await.unwrap(), DrainReport::default());
    }

    #[tokio::test]
    async fn failed_upload_is_retried_after_backoff() {
        let f = fixture(fast_retry()).await;
        let id = enqueue(
            &f,
            CreateSyncTask::upload("/nonexistent/file.png", "never.png"),
        )
        .await;

        let report = f.queue.run().await.unwrap();
        assert_eq!(report.failed, 1);
        let task = f.task_repo.find_by_id(f.db.pool(), id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Failed);

        // Zero backoff: the failed task is claimed and fails again.
        let report = f.queue.run().await.unwrap();
        assert_eq!(report.claimed, 1);
        assert_eq!(report.failed, 1);
        let task = f.task_repo.find_by_id(f.db.pool(), id).await.unwrap().unwrap();
        assert_eq!(task.attempts, 2);
    }

    #[tokio::test]
    async fn failed_task_waits_out_the_backoff() {
        let f = fixture(WorkerConfig {
            retry_backoff_seconds: 3600,
            ..WorkerConfig::default()
        })
        .await;
        enqueue(
            &f,
            CreateSyncTask::upload("/nonexistent/file.png", "never.png"),
        )
        .await;

        assert_eq!(f.queue.run().await.unwrap().failed, 1);
        // Freshly failed, well inside the backoff window.
        assert_eq!(f.queue.run().await.unwrap().claimed, 0);
    }

    #[tokio::test]
    async fn expired_lease_makes_a_running_task_reclaimable() {
        let f = fixture(WorkerConfig::default()).await;
        let local = f.content.write_cache(b"late", "ffeeddcc", ".png").await.unwrap();
        let id = enqueue(
            &f,
            CreateSyncTask::upload(local.to_string_lossy().into_owned(), "ffeeddcc.png"),
        )
        .await;

        // Simulate a crashed worker: running with an ancient lease.
        sqlx::query("UPDATE sync_tasks SET status = 'running', locked_at = 1 WHERE id = ?")
            .bind(id)
            .execute(f.db.pool())
            .await
            .unwrap();

        let report = f.queue.run().await.unwrap();
        assert_eq!(report.claimed, 1);
        assert_eq!(report.uploaded, 1);
        // Re-uploading the same object is idempotent at the remote.
        assert_eq!(
            f.content.download_bytes("ffeeddcc.png").await.unwrap(),
            Bytes::from_static(b"late")
        );
    }

    #[tokio::test]
    async fn fresh_lease_is_not_reclaimed() {
        let f = fixture(WorkerConfig::default()).await;
        let id = enqueue(&f, CreateSyncTask::delete("held.png")).await;
        let now = chrono::Utc::now().timestamp();
        sqlx::query("UPDATE sync_tasks SET status = 'running', locked_at = ? WHERE id = ?")
            .bind(now)
            .bind(id)
            .execute(f.db.pool())
            .await
            .unwrap();

        assert_eq!(f.queue.run().await.unwrap().claimed, 0);
    }

    #[tokio::test]
    async fn cleanup_drops_only_old_settled_tasks() {
        let f = fixture(WorkerConfig::default()).await;
        f.content
            .upload_bytes(Bytes::from_static(b"x"), "old.png", "")
            .await
            .unwrap();
        let id = enqueue(&f, CreateSyncTask::delete("old.png")).await;
        f.queue.run().await.unwrap();

        // Still inside the retention window.
        assert_eq!(f.queue.cleanup_settled(3600).await.unwrap(), 0);

        sqlx::query("UPDATE sync_tasks SET update_time = 1 WHERE id = ?")
            .bind(id)
            .execute(f.db.pool())
            .await
            .unwrap();
        assert_eq!(f.queue.cleanup_settled(3600).await.unwrap(), 1);
    }
}
