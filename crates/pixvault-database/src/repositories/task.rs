//! Sync task repository implementation.

use sqlx::{Executor, QueryBuilder, Sqlite, SqlitePool};

use pixvault_core::error::{AppError, ErrorKind};
use pixvault_core::result::AppResult;
use pixvault_entity::task::{CreateSyncTask, SyncTask, TaskStatus};

/// Repository for the outbox table.
#[derive(Debug, Clone)]
pub struct TaskRepository {
    pool: SqlitePool,
}

impl TaskRepository {
    /// Create a new task repository.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The pool this repository reads from outside transactions.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Find a task by ID.
    pub async fn find_by_id<'e, E>(&self, ex: E, id: i64) -> AppResult<Option<SyncTask>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, SyncTask>("SELECT * FROM sync_tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(ex)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find task", e))
    }

    /// Bulk-insert tasks.
    ///
    /// Must run on the same transaction as the node mutation the tasks
    /// mirror, so a rollback on either side takes both.
    pub async fn insert_batch<'e, E>(
        &self,
        ex: E,
        tasks: &[CreateSyncTask],
        now: i64,
    ) -> AppResult<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        if tasks.is_empty() {
            return Ok(());
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT INTO sync_tasks \
             (action, local_path, remote_path, status, attempts, locked_at, create_time, update_time) ",
        );
        builder.push_values(tasks, |mut row, task| {
            row.push_bind(task.action)
                .push_bind(&task.local_path)
                .push_bind(&task.remote_path)
                .push_bind(TaskStatus::Waiting)
                .push_bind(0i64)
                .push_bind(0i64)
                .push_bind(now)
                .push_bind(now);
        });

        builder
            .build()
            .execute(ex)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to enqueue tasks", e))?;
        Ok(())
    }

    /// Select every claimable task: `waiting`, `failed` past the retry
    /// backoff, and `running` with an expired lease.
    pub async fn find_claimable<'e, E>(
        &self,
        ex: E,
        now: i64,
        lease_seconds: i64,
        retry_backoff_seconds: i64,
    ) -> AppResult<Vec<SyncTask>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, SyncTask>(
            "SELECT * FROM sync_tasks WHERE \
                status = 'waiting' \
                OR (status = 'failed' AND update_time <= ?) \
                OR (status = 'running' AND locked_at <= ?) \
             ORDER BY id ASC",
        )
        .bind(now - retry_backoff_seconds)
        .bind(now - lease_seconds)
        .fetch_all(ex)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to select tasks", e))
    }

    /// Flip the given tasks to `running` with a fresh lease, counting the
    /// claim attempt.
    pub async fn mark_running<'e, E>(&self, ex: E, ids: &[i64], now: i64) -> AppResult<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        if ids.is_empty() {
            return Ok(());
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "UPDATE sync_tasks SET status = 'running', attempts = attempts + 1, ",
        );
        builder
            .push("locked_at = ")
            .push_bind(now)
            .push(", update_time = ")
            .push_bind(now)
            .push(" WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        builder
            .build()
            .execute(ex)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to claim tasks", e))?;
        Ok(())
    }

    /// Record a task's terminal status for this drain.
    pub async fn update_status<'e, E>(
        &self,
        ex: E,
        id: i64,
        status: TaskStatus,
        now: i64,
    ) -> AppResult<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query("UPDATE sync_tasks SET status = ?, update_time = ? WHERE id = ?")
            .bind(status)
            .bind(now)
            .bind(id)
            .execute(ex)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to update task status", e)
            })?;
        Ok(())
    }

    /// Count tasks in a given status.
    pub async fn count_by_status<'e, E>(&self, ex: E, status: TaskStatus) -> AppResult<i64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM sync_tasks WHERE status = ?")
            .bind(status)
            .fetch_one(ex)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to count tasks", e))
    }

    /// Delete settled tasks last touched before the given timestamp.
    pub async fn cleanup_settled<'e, E>(&self, ex: E, before: i64) -> AppResult<u64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result =
            sqlx::query("DELETE FROM sync_tasks WHERE status = 'success' AND update_time < ?")
                .bind(before)
                .execute(ex)
                .await
                .map_err(|e| {
                    AppError::with_source(ErrorKind::Database, "Failed to clean up tasks", e)
                })?;
        Ok(result.rows_affected())
    }
}
