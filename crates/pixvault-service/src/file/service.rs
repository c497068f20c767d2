//! Content-addressed file save, download and delete.
//!
//! `save` is the write path of the whole layer: hash the payload, park
//! it in the local cache, then commit the node row and the upload task
//! in one transaction. The remote store catches up asynchronously via
//! the outbox drain.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use pixvault_cache::PathCache;
use pixvault_core::error::{AppError, ErrorKind};
use pixvault_core::notify::SyncNotifier;
use pixvault_core::result::AppResult;
use pixvault_core::types::{PageRequest, PageResponse};
use pixvault_database::repositories::node::NodeRepository;
use pixvault_database::repositories::task::TaskRepository;
use pixvault_entity::node::{split_file_name, CreateNode, Node};
use pixvault_entity::task::CreateSyncTask;
use pixvault_storage::ContentStore;

use crate::tree::service::canonicalize;
use crate::tree::PathTreeService;

/// Handles file content: save, read-through download, delete, listing.
#[derive(Clone)]
pub struct FileService {
    tree: Arc<PathTreeService>,
    node_repo: Arc<NodeRepository>,
    task_repo: Arc<TaskRepository>,
    content: Arc<ContentStore>,
    cache: Arc<dyn PathCache>,
    notifier: SyncNotifier,
    max_upload_size: u64,
}

impl std::fmt::Debug for FileService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileService").finish()
    }
}

impl FileService {
    /// Create a new file service.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tree: Arc<PathTreeService>,
        node_repo: Arc<NodeRepository>,
        task_repo: Arc<TaskRepository>,
        content: Arc<ContentStore>,
        cache: Arc<dyn PathCache>,
        notifier: SyncNotifier,
        max_upload_size: u64,
    ) -> Self {
        Self {
            tree,
            node_repo,
            task_repo,
            content,
            cache,
            notifier,
            max_upload_size,
        }
    }

    /// Store file content under a full path (`/gallery/2024/cat.png`),
    /// creating missing ancestor folders.
    ///
    /// Content is deduplicated by hash: a second upload of identical
    /// bytes gets its own node row but no second cache file write
    /// conflict and no second upload task.
    pub async fn save(&self, data: Bytes, path: &str) -> AppResult<Node> {
        let (canonical, mut parts) = canonicalize(path)?;
        let Some(file_name) = parts.pop() else {
            return Err(AppError::validation("Cannot save to the root path"));
        };
        if data.len() as u64 > self.max_upload_size {
            return Err(AppError::validation(format!(
                "Upload exceeds the {} byte limit",
                self.max_upload_size
            )));
        }

        let hash = hex::encode(Sha256::digest(&data));
        let (name, ext_name) = split_file_name(&file_name);
        let content_type = mime_guess::from_path(&file_name)
            .first_or_octet_stream()
            .to_string();

        let local_path = self.content.write_cache(&data, &hash, &ext_name).await?;

        let parent_dir = if parts.is_empty() {
            "/".to_string()
        } else {
            format!("/{}", parts.join("/"))
        };

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.tree.begin().await?;

        // Identical bytes already known: one remote object is enough.
        let known_hash = self
            .node_repo
            .find_file_by_hash(&mut *tx, &hash)
            .await?
            .is_some();

        let parent_id = self.tree.mkdir_in(&mut tx, &parent_dir).await?;

        let duplicates = self
            .node_repo
            .count_siblings(&mut *tx, parent_id, &name, &ext_name, 0)
            .await?;
        if duplicates > 0 {
            return Err(AppError::conflict(format!(
                "Name already exists in parent: {file_name}"
            )));
        }

        let node = self
            .node_repo
            .create(
                &mut *tx,
                &CreateNode {
                    parent_id,
                    name,
                    ext_name: ext_name.clone(),
                    is_folder: false,
                    hash: hash.clone(),
                    content_type,
                    file_size: data.len() as i64,
                },
                now,
            )
            .await?;

        if !known_hash {
            self.task_repo
                .insert_batch(
                    &mut *tx,
                    &[CreateSyncTask::upload(
                        local_path.to_string_lossy().into_owned(),
                        node.remote_path(),
                    )],
                    now,
                )
                .await?;
        } else {
            debug!(%hash, "Hash already stored remotely, skipping upload task");
        }

        tx.commit().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to commit save", e)
        })?;

        self.cache.put(&canonical, node.clone()).await;
        if !known_hash {
            self.notifier.notify();
        }
        info!(path = %canonical, id = node.id, size = node.file_size, "Saved file");
        Ok(node)
    }

    /// Fetch a file node by ID.
    pub async fn node_by_id(&self, id: i64) -> AppResult<Node> {
        self.node_repo
            .find_by_id(self.node_repo.pool(), id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("File {id} not found")))
    }

    /// Local path of a node's content, pulled from the remote store on a
    /// cache miss. Concurrent callers for the same content share one
    /// download.
    pub async fn download(&self, node: &Node) -> AppResult<PathBuf> {
        if node.is_folder {
            return Err(AppError::validation("Folders have no content"));
        }
        self.content.fetch(&node.hash, &node.ext_name).await
    }

    /// Delete nodes by ID, subtrees included.
    pub async fn delete_by_ids(&self, ids: &[i64]) -> AppResult<()> {
        let mut paths = Vec::with_capacity(ids.len());
        for id in ids {
            let node = self.node_by_id(*id).await?;
            paths.push(self.tree.path_of(&node).await?);
        }
        self.tree.delete(&paths, true).await
    }

    /// Paginated listing of every file node, newest first.
    pub async fn files(&self, page: PageRequest) -> AppResult<PageResponse<Node>> {
        let total = self
            .node_repo
            .count_files(self.node_repo.pool())
            .await?;
        let items = self
            .node_repo
            .files_page(
                self.node_repo.pool(),
                page.limit() as i64,
                page.offset() as i64,
            )
            .await?;
        Ok(PageResponse::new(items, &page, total as u64))
    }
}
