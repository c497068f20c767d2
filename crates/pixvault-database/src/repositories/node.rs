//! Node repository implementation.

use sqlx::{Executor, QueryBuilder, Sqlite, SqlitePool};

use pixvault_core::error::{AppError, ErrorKind};
use pixvault_core::result::AppResult;
use pixvault_entity::node::{CreateNode, Node};

use super::is_unique_violation;

/// Repository for node CRUD and tree queries.
///
/// Mutating methods take an explicit executor so callers can run them
/// inside their own transaction; read helpers that never participate in
/// a transaction go through the held pool.
#[derive(Debug, Clone)]
pub struct NodeRepository {
    pool: SqlitePool,
}

impl NodeRepository {
    /// Create a new node repository.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The pool this repository reads from outside transactions.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Find a node by ID.
    pub async fn find_by_id<'e, E>(&self, ex: E, id: i64) -> AppResult<Option<Node>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Node>("SELECT * FROM nodes WHERE id = ?")
            .bind(id)
            .fetch_optional(ex)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find node", e))
    }

    /// Find a child by the sibling-unique triple.
    pub async fn find_child<'e, E>(
        &self,
        ex: E,
        parent_id: i64,
        name: &str,
        ext_name: &str,
    ) -> AppResult<Option<Node>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Node>(
            "SELECT * FROM nodes WHERE parent_id = ? AND name = ? AND ext_name = ?",
        )
        .bind(parent_id)
        .bind(name)
        .bind(ext_name)
        .fetch_optional(ex)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find child node", e))
    }

    /// Find a child folder by name.
    pub async fn find_folder_child<'e, E>(
        &self,
        ex: E,
        parent_id: i64,
        name: &str,
    ) -> AppResult<Option<Node>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Node>(
            "SELECT * FROM nodes WHERE parent_id = ? AND name = ? AND is_folder = 1",
        )
        .bind(parent_id)
        .bind(name)
        .fetch_optional(ex)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find child folder", e))
    }

    /// Count siblings that would collide with the given triple,
    /// excluding one node (0 = exclude nothing).
    pub async fn count_siblings<'e, E>(
        &self,
        ex: E,
        parent_id: i64,
        name: &str,
        ext_name: &str,
        exclude_id: i64,
    ) -> AppResult<i64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM nodes \
             WHERE parent_id = ? AND name = ? AND ext_name = ? AND id != ?",
        )
        .bind(parent_id)
        .bind(name)
        .bind(ext_name)
        .bind(exclude_id)
        .fetch_one(ex)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to count siblings", e))
    }

    /// Insert a new node and return the stored row.
    pub async fn create<'e, E>(&self, ex: E, data: &CreateNode, now: i64) -> AppResult<Node>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Node>(
            "INSERT INTO nodes \
             (parent_id, name, ext_name, is_folder, hash, content_type, file_size, create_time, update_time) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(data.parent_id)
        .bind(&data.name)
        .bind(&data.ext_name)
        .bind(data.is_folder)
        .bind(&data.hash)
        .bind(&data.content_type)
        .bind(data.file_size)
        .bind(now)
        .bind(now)
        .fetch_one(ex)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::conflict(format!(
                    "Name '{}{}' already exists in this folder",
                    data.name, data.ext_name
                ))
            } else {
                AppError::with_source(ErrorKind::Database, "Failed to create node", e)
            }
        })
    }

    /// Rename a node.
    pub async fn update_name<'e, E>(
        &self,
        ex: E,
        id: i64,
        name: &str,
        ext_name: &str,
        now: i64,
    ) -> AppResult<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query("UPDATE nodes SET name = ?, ext_name = ?, update_time = ? WHERE id = ?")
            .bind(name)
            .bind(ext_name)
            .bind(now)
            .bind(id)
            .execute(ex)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to rename node", e))?;
        Ok(())
    }

    /// Reparent a node.
    pub async fn update_parent<'e, E>(
        &self,
        ex: E,
        id: i64,
        new_parent_id: i64,
        now: i64,
    ) -> AppResult<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query("UPDATE nodes SET parent_id = ?, update_time = ? WHERE id = ?")
            .bind(new_parent_id)
            .bind(now)
            .bind(id)
            .execute(ex)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to move node", e))?;
        Ok(())
    }

    /// Delete a node row.
    pub async fn delete<'e, E>(&self, ex: E, id: i64) -> AppResult<bool>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM nodes WHERE id = ?")
            .bind(id)
            .execute(ex)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to delete node", e))?;
        Ok(result.rows_affected() > 0)
    }

    /// List direct children of a node.
    pub async fn children<'e, E>(&self, ex: E, parent_id: i64) -> AppResult<Vec<Node>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Node>(
            "SELECT * FROM nodes WHERE parent_id = ? ORDER BY is_folder DESC, name ASC",
        )
        .bind(parent_id)
        .fetch_all(ex)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list children", e))
    }

    /// Count direct children of a node.
    pub async fn count_children<'e, E>(&self, ex: E, parent_id: i64) -> AppResult<i64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM nodes WHERE parent_id = ?")
            .bind(parent_id)
            .fetch_one(ex)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to count children", e))
    }

    /// Find any file node carrying the given content hash.
    pub async fn find_file_by_hash<'e, E>(&self, ex: E, hash: &str) -> AppResult<Option<Node>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Node>("SELECT * FROM nodes WHERE hash = ? AND is_folder = 0 LIMIT 1")
            .bind(hash)
            .fetch_optional(ex)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to find node by hash", e)
            })
    }

    /// Count file nodes still referencing the given content hash.
    pub async fn count_files_by_hash<'e, E>(&self, ex: E, hash: &str) -> AppResult<i64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM nodes WHERE hash = ? AND is_folder = 0")
            .bind(hash)
            .fetch_one(ex)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to count nodes by hash", e)
            })
    }

    /// Fetch every folder row (tree materialization).
    pub async fn all_folders<'e, E>(&self, ex: E) -> AppResult<Vec<Node>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Node>("SELECT * FROM nodes WHERE is_folder = 1 ORDER BY id ASC")
            .fetch_all(ex)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list folders", e))
    }

    /// Paginated file listing, newest first.
    pub async fn files_page<'e, E>(&self, ex: E, limit: i64, offset: i64) -> AppResult<Vec<Node>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Node>(
            "SELECT * FROM nodes WHERE is_folder = 0 \
             ORDER BY create_time DESC, id DESC LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(ex)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list files", e))
    }

    /// Count all file nodes.
    pub async fn count_files<'e, E>(&self, ex: E) -> AppResult<i64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM nodes WHERE is_folder = 0")
            .fetch_one(ex)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to count files", e))
    }

    /// File count, folder count and total file bytes in one scan.
    pub async fn stats<'e, E>(&self, ex: E) -> AppResult<(i64, i64, i64)>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, (i64, i64, i64)>(
            "SELECT \
                COUNT(CASE WHEN is_folder = 0 THEN 1 END), \
                COUNT(CASE WHEN is_folder = 1 THEN 1 END), \
                COALESCE(SUM(CASE WHEN is_folder = 0 THEN file_size END), 0) \
             FROM nodes",
        )
        .fetch_one(ex)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to compute stats", e))
    }

    /// Fetch every node row (snapshot export).
    pub async fn all_nodes<'e, E>(&self, ex: E) -> AppResult<Vec<Node>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Node>("SELECT * FROM nodes ORDER BY id ASC")
            .fetch_all(ex)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to export nodes", e))
    }

    /// Delete every node row (snapshot restore).
    pub async fn delete_all<'e, E>(&self, ex: E) -> AppResult<u64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM nodes")
            .execute(ex)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to clear nodes", e))?;
        Ok(result.rows_affected())
    }

    /// Bulk-insert full rows, preserving ids and timestamps (snapshot
    /// restore).
    pub async fn insert_full_batch<'e, E>(&self, ex: E, nodes: &[Node]) -> AppResult<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        if nodes.is_empty() {
            return Ok(());
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT INTO nodes \
             (id, parent_id, name, ext_name, is_folder, hash, content_type, file_size, create_time, update_time) ",
        );
        builder.push_values(nodes, |mut row, node| {
            row.push_bind(node.id)
                .push_bind(node.parent_id)
                .push_bind(&node.name)
                .push_bind(&node.ext_name)
                .push_bind(node.is_folder)
                .push_bind(&node.hash)
                .push_bind(&node.content_type)
                .push_bind(node.file_size)
                .push_bind(node.create_time)
                .push_bind(node.update_time);
        });

        builder
            .build()
            .execute(ex)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to restore nodes", e))?;
        Ok(())
    }
}
