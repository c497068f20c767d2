//! Path resolution and structural mutation of the virtual filesystem.
//!
//! Paths are resolved by walking the adjacency list from the root, one
//! `(parent_id, name, ext_name)` index lookup per component. Successful
//! resolutions are cached by full path string; every structural mutation
//! invalidates the mutated path and all cached descendant paths.
//!
//! Reads inside a transaction bypass the cache entirely: they must see
//! the transaction's own uncommitted writes, and must not publish them.

use std::path::PathBuf;
use std::sync::Arc;

use sqlx::SqliteConnection;
use tracing::{info, warn};

use pixvault_cache::PathCache;
use pixvault_core::error::{AppError, ErrorKind};
use pixvault_core::notify::SyncNotifier;
use pixvault_core::result::AppResult;
use pixvault_database::repositories::node::NodeRepository;
use pixvault_database::repositories::task::TaskRepository;
use pixvault_entity::node::{split_file_name, CreateNode, Node, ROOT_ID};
use pixvault_entity::task::CreateSyncTask;
use pixvault_storage::ContentStore;

/// Manages the adjacency-list tree: resolution, creation, rename, move
/// and delete.
#[derive(Clone)]
pub struct PathTreeService {
    node_repo: Arc<NodeRepository>,
    task_repo: Arc<TaskRepository>,
    content: Arc<ContentStore>,
    cache: Arc<dyn PathCache>,
    notifier: SyncNotifier,
}

impl std::fmt::Debug for PathTreeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathTreeService").finish()
    }
}

/// Normalize a path into its canonical string and component list.
///
/// `"/a//b/"` → `("/a/b", ["a", "b"])`; `"/"` → `("/", [])`.
pub(crate) fn canonicalize(path: &str) -> AppResult<(String, Vec<String>)> {
    let parts: Vec<String> = path
        .split('/')
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();
    if parts.iter().any(|p| p == "." || p == "..") {
        return Err(AppError::validation(format!("Invalid path: {path}")));
    }
    let canonical = if parts.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", parts.join("/"))
    };
    Ok((canonical, parts))
}

impl PathTreeService {
    /// Create a new path-tree service.
    pub fn new(
        node_repo: Arc<NodeRepository>,
        task_repo: Arc<TaskRepository>,
        content: Arc<ContentStore>,
        cache: Arc<dyn PathCache>,
        notifier: SyncNotifier,
    ) -> Self {
        Self {
            node_repo,
            task_repo,
            content,
            cache,
            notifier,
        }
    }

    /// The node repository this service reads through.
    pub fn node_repo(&self) -> &NodeRepository {
        &self.node_repo
    }

    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }

    // ── Resolution ─────────────────────────────────────────────

    /// Resolve a path to its node. `Ok(None)` means the path does not
    /// exist; errors are reserved for storage faults.
    pub async fn resolve(&self, path: &str) -> AppResult<Option<Node>> {
        let (canonical, parts) = canonicalize(path)?;
        if parts.is_empty() {
            return Ok(Some(Node::root()));
        }

        if let Some(node) = self.cache.get(&canonical).await {
            return Ok(Some(node));
        }

        let mut conn = self
            .node_repo
            .pool()
            .acquire()
            .await
            .map_err(|e| AppError::with_source(
                ErrorKind::Database,
                "Failed to acquire connection",
                e,
            ))?;
        let resolved = self.walk(&mut conn, &parts).await?;

        if let Some(ref node) = resolved {
            self.cache.put(&canonical, node.clone()).await;
        }
        Ok(resolved)
    }

    /// Resolve a path on a caller-owned connection, bypassing the cache.
    pub(crate) async fn resolve_in(
        &self,
        conn: &mut SqliteConnection,
        path: &str,
    ) -> AppResult<Option<Node>> {
        let (_, parts) = canonicalize(path)?;
        if parts.is_empty() {
            return Ok(Some(Node::root()));
        }
        self.walk(conn, &parts).await
    }

    /// Walk path components from the root. A component matches a node
    /// stored under its literal name first (folders, extension-less
    /// files), then under its `(bare, ext)` split.
    async fn walk(
        &self,
        conn: &mut SqliteConnection,
        parts: &[String],
    ) -> AppResult<Option<Node>> {
        let mut parent_id = ROOT_ID;
        let mut current: Option<Node> = None;

        for part in parts {
            let mut found = self
                .node_repo
                .find_child(&mut *conn, parent_id, part, "")
                .await?;
            if found.is_none() {
                let (bare, ext) = split_file_name(part);
                if !ext.is_empty() {
                    found = self
                        .node_repo
                        .find_child(&mut *conn, parent_id, &bare, &ext)
                        .await?;
                }
            }
            match found {
                Some(node) => {
                    parent_id = node.id;
                    current = Some(node);
                }
                None => return Ok(None),
            }
        }
        Ok(current)
    }

    /// Reconstruct a node's canonical path by walking parent pointers to
    /// the root.
    pub async fn path_of(&self, node: &Node) -> AppResult<String> {
        let mut segments = vec![node.file_name()];
        let mut parent_id = node.parent_id;
        while parent_id != ROOT_ID {
            let parent = self
                .node_repo
                .find_by_id(self.node_repo.pool(), parent_id)
                .await?
                .ok_or_else(|| {
                    AppError::not_found(format!("Ancestor {parent_id} of node {} is missing", node.id))
                })?;
            segments.push(parent.file_name());
            parent_id = parent.parent_id;
        }
        segments.reverse();
        Ok(format!("/{}", segments.join("/")))
    }

    // ── Creation ───────────────────────────────────────────────

    /// Create a single node under an existing parent folder.
    pub async fn create(&self, path: &str, is_folder: bool) -> AppResult<Node> {
        let (canonical, mut parts) = canonicalize(path)?;
        let Some(leaf) = parts.pop() else {
            return Err(AppError::validation("Root path already exists"));
        };
        let parent_path = if parts.is_empty() {
            "/".to_string()
        } else {
            format!("/{}", parts.join("/"))
        };

        let parent = self
            .resolve(&parent_path)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Parent path not found: {parent_path}")))?;
        if !parent.is_folder {
            return Err(AppError::not_a_folder(format!(
                "Parent is not a folder: {parent_path}"
            )));
        }

        let (name, ext_name) = if is_folder {
            (leaf.clone(), String::new())
        } else {
            split_file_name(&leaf)
        };
        let duplicates = self
            .node_repo
            .count_siblings(self.node_repo.pool(), parent.id, &name, &ext_name, 0)
            .await?;
        if duplicates > 0 {
            return Err(AppError::conflict(format!(
                "Name already exists in parent: {leaf}"
            )));
        }

        let mut data = CreateNode::folder(parent.id, name);
        data.is_folder = is_folder;
        data.ext_name = ext_name;
        let node = self
            .node_repo
            .create(self.node_repo.pool(), &data, self.now())
            .await?;

        self.cache.put(&canonical, node.clone()).await;
        Ok(node)
    }

    /// Recursively create folders (`mkdir -p`), returning the deepest
    /// folder's ID. Idempotent; existing non-folder components fail.
    pub async fn mkdir(&self, path: &str) -> AppResult<i64> {
        let mut tx = self.begin().await?;
        let leaf_id = self.mkdir_in(&mut tx, path).await?;
        tx.commit()
            .await
            .map_err(|e| AppError::with_source(
                ErrorKind::Database,
                "Failed to commit mkdir",
                e,
            ))?;
        Ok(leaf_id)
    }

    /// `mkdir -p` on a caller-owned transaction connection.
    pub(crate) async fn mkdir_in(
        &self,
        conn: &mut SqliteConnection,
        path: &str,
    ) -> AppResult<i64> {
        let (_, parts) = canonicalize(path)?;
        let mut parent_id = ROOT_ID;

        for part in &parts {
            let existing = self
                .node_repo
                .find_child(&mut *conn, parent_id, part, "")
                .await?;
            match existing {
                Some(node) if node.is_folder => parent_id = node.id,
                Some(_) => {
                    return Err(AppError::not_a_folder(format!(
                        "Path component exists but is not a folder: {part}"
                    )));
                }
                None => {
                    let created = self
                        .node_repo
                        .create(&mut *conn, &CreateNode::folder(parent_id, part), self.now())
                        .await?;
                    parent_id = created.id;
                }
            }
        }
        Ok(parent_id)
    }

    // ── Rename / move ──────────────────────────────────────────

    /// Rename a node in place; the parent is unchanged.
    pub async fn rename(&self, path: &str, new_name: &str) -> AppResult<Node> {
        let (canonical, parts) = canonicalize(path)?;
        if parts.is_empty() {
            return Err(AppError::validation("Root path cannot be renamed"));
        }
        if new_name.is_empty() || new_name.contains('/') {
            return Err(AppError::validation(format!("Invalid name: {new_name}")));
        }

        let node = self
            .resolve(&canonical)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Path not found: {canonical}")))?;

        let (name, ext_name) = if node.is_folder {
            (new_name.to_string(), String::new())
        } else {
            split_file_name(new_name)
        };
        let duplicates = self
            .node_repo
            .count_siblings(self.node_repo.pool(), node.parent_id, &name, &ext_name, node.id)
            .await?;
        if duplicates > 0 {
            return Err(AppError::conflict(format!(
                "Name already exists in parent: {new_name}"
            )));
        }

        self.node_repo
            .update_name(self.node_repo.pool(), node.id, &name, &ext_name, self.now())
            .await?;

        // The whole subtree resolves through the renamed component.
        self.cache.invalidate_prefix(&canonical).await;
        info!(path = %canonical, new_name, "Renamed node");

        self.node_repo
            .find_by_id(self.node_repo.pool(), node.id)
            .await?
            .ok_or_else(|| AppError::not_found("Node vanished during rename"))
    }

    /// Move nodes under a new parent folder. All paths succeed or none:
    /// the whole batch runs in one transaction.
    pub async fn move_nodes(&self, paths: &[String], new_parent_path: &str) -> AppResult<()> {
        if paths.is_empty() {
            return Ok(());
        }

        let mut tx = self.begin().await?;

        let new_parent_id = {
            let parent = self
                .resolve_in(&mut tx, new_parent_path)
                .await?
                .ok_or_else(|| {
                    AppError::not_found(format!("Target parent not found: {new_parent_path}"))
                })?;
            if !parent.is_folder {
                return Err(AppError::not_a_folder(format!(
                    "Target parent is not a folder: {new_parent_path}"
                )));
            }
            parent.id
        };

        let mut moved_paths = Vec::with_capacity(paths.len());
        for path in paths {
            let (canonical, parts) = canonicalize(path)?;
            if parts.is_empty() {
                return Err(AppError::validation("Root path cannot be moved"));
            }
            let source = self
                .resolve_in(&mut tx, &canonical)
                .await?
                .ok_or_else(|| AppError::not_found(format!("Source path not found: {canonical}")))?;

            if new_parent_id != ROOT_ID {
                self.check_cycle(&mut tx, source.id, new_parent_id).await?;
            }

            let duplicates = self
                .node_repo
                .count_siblings(&mut *tx, new_parent_id, &source.name, &source.ext_name, source.id)
                .await?;
            if duplicates > 0 {
                return Err(AppError::conflict(format!(
                    "Name already exists in target parent: {}",
                    source.file_name()
                )));
            }

            self.node_repo
                .update_parent(&mut *tx, source.id, new_parent_id, self.now())
                .await?;
            moved_paths.push(canonical);
        }

        tx.commit()
            .await
            .map_err(|e| AppError::with_source(
                ErrorKind::Database,
                "Failed to commit move",
                e,
            ))?;

        for path in &moved_paths {
            self.cache.invalidate_prefix(path).await;
        }
        info!(count = moved_paths.len(), target = %new_parent_path, "Moved nodes");
        Ok(())
    }

    /// Fail with `CircularReference` if `node_id` appears on the ancestor
    /// chain of the destination parent.
    async fn check_cycle(
        &self,
        conn: &mut SqliteConnection,
        node_id: i64,
        target_parent_id: i64,
    ) -> AppResult<()> {
        let mut current = target_parent_id;
        while current != ROOT_ID {
            if current == node_id {
                return Err(AppError::circular_reference(
                    "Cannot move a node into its own subtree",
                ));
            }
            match self.node_repo.find_by_id(&mut *conn, current).await? {
                Some(ancestor) => current = ancestor.parent_id,
                None => break,
            }
        }
        Ok(())
    }

    // ── Delete ─────────────────────────────────────────────────

    /// Delete nodes. With `recursive` unset, a populated folder fails
    /// with `NotEmpty`; with it set, the subtree goes depth-first.
    ///
    /// All paths are processed in one transaction. Remote-delete tasks
    /// are enqueued in the same transaction, but only for hashes no
    /// surviving node references.
    pub async fn delete(&self, paths: &[String], recursive: bool) -> AppResult<()> {
        if paths.is_empty() {
            return Ok(());
        }

        let mut tx = self.begin().await?;
        let mut tasks: Vec<CreateSyncTask> = Vec::new();
        let mut removed_files: Vec<(String, String)> = Vec::new();
        let mut deleted_paths = Vec::with_capacity(paths.len());

        for path in paths {
            let (canonical, parts) = canonicalize(path)?;
            if parts.is_empty() {
                return Err(AppError::validation("Root path cannot be deleted"));
            }
            let node = self
                .resolve_in(&mut tx, &canonical)
                .await?
                .ok_or_else(|| AppError::not_found(format!("Path not found: {canonical}")))?;

            if node.is_folder && !recursive {
                let children = self.node_repo.count_children(&mut *tx, node.id).await?;
                if children > 0 {
                    return Err(AppError::not_empty(format!(
                        "Folder is not empty: {canonical}"
                    )));
                }
            }

            if recursive && node.is_folder {
                self.delete_subtree(&mut tx, &node, &mut tasks, &mut removed_files)
                    .await?;
            } else {
                self.delete_one(&mut tx, &node, &mut tasks, &mut removed_files)
                    .await?;
            }
            deleted_paths.push(canonical);
        }

        let enqueued = tasks.len();
        self.task_repo.insert_batch(&mut *tx, &tasks, self.now()).await?;
        tx.commit()
            .await
            .map_err(|e| AppError::with_source(
                ErrorKind::Database,
                "Failed to commit delete",
                e,
            ))?;

        for path in &deleted_paths {
            self.cache.invalidate_prefix(path).await;
        }
        for (hash, ext_name) in &removed_files {
            if let Err(e) = self.content.remove_cache(hash, ext_name).await {
                warn!(%hash, error = %e, "Failed to drop cached content");
            }
        }
        if enqueued > 0 {
            self.notifier.notify();
        }
        info!(count = deleted_paths.len(), tasks = enqueued, "Deleted nodes");
        Ok(())
    }

    /// Depth-first subtree delete: children strictly before parents.
    async fn delete_subtree(
        &self,
        conn: &mut SqliteConnection,
        root: &Node,
        tasks: &mut Vec<CreateSyncTask>,
        removed_files: &mut Vec<(String, String)>,
    ) -> AppResult<()> {
        let mut stack = vec![root.clone()];
        let mut discovered = Vec::new();
        while let Some(node) = stack.pop() {
            if node.is_folder {
                let children = self.node_repo.children(&mut *conn, node.id).await?;
                stack.extend(children);
            }
            discovered.push(node);
        }

        // Discovery order puts every child after its parent, so the
        // reverse order deletes leaves first.
        for node in discovered.iter().rev() {
            self.delete_one(&mut *conn, node, tasks, removed_files).await?;
        }
        Ok(())
    }

    /// Delete a single row. For file nodes, enqueue a remote delete only
    /// when the row carried the hash's last reference.
    async fn delete_one(
        &self,
        conn: &mut SqliteConnection,
        node: &Node,
        tasks: &mut Vec<CreateSyncTask>,
        removed_files: &mut Vec<(String, String)>,
    ) -> AppResult<()> {
        self.node_repo.delete(&mut *conn, node.id).await?;
        if node.is_folder {
            return Ok(());
        }

        let survivors = self
            .node_repo
            .count_files_by_hash(&mut *conn, &node.hash)
            .await?;
        if survivors == 0 {
            tasks.push(CreateSyncTask::delete(node.remote_path()));
            removed_files.push((node.hash.clone(), node.ext_name.clone()));
        }
        Ok(())
    }

    // ── Listing ────────────────────────────────────────────────

    /// List the direct children of a folder path.
    pub async fn children(&self, path: &str) -> AppResult<Vec<Node>> {
        let node = self
            .resolve(path)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Path not found: {path}")))?;
        if !node.is_folder {
            return Err(AppError::not_a_folder(format!("Not a folder: {path}")));
        }
        self.node_repo.children(self.node_repo.pool(), node.id).await
    }

    /// Local cache location of a file node's content, pulling from the
    /// remote store when absent.
    pub async fn content_path(&self, node: &Node) -> AppResult<PathBuf> {
        if node.is_folder {
            return Err(AppError::validation("Folders have no content"));
        }
        self.content.fetch(&node.hash, &node.ext_name).await
    }

    pub(crate) async fn begin(
        &self,
    ) -> AppResult<sqlx::Transaction<'static, sqlx::Sqlite>> {
        self.node_repo.pool().begin().await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Database,
                "Failed to begin transaction",
                e,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_normalizes_separators() {
        assert_eq!(canonicalize("/").unwrap().0, "/");
        assert_eq!(canonicalize("/a//b/").unwrap().0, "/a/b");
        assert_eq!(
            canonicalize("a/b/c.png").unwrap().1,
            vec!["a", "b", "c.png"]
        );
        assert!(canonicalize("/a/../b").is_err());
    }

}
