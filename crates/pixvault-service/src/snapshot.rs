//! Node-table snapshots for the external backup component.
//!
//! This service only moves metadata: exporting and restoring the node
//! table, and persisting serialized snapshots through the content
//! store's byte primitives. Scheduling and retention live outside this
//! layer.

use std::sync::Arc;

use bytes::Bytes;
use tracing::info;

use pixvault_cache::PathCache;
use pixvault_core::error::{AppError, ErrorKind};
use pixvault_core::result::AppResult;
use pixvault_core::traits::remote::RemoteObject;
use pixvault_database::repositories::node::NodeRepository;
use pixvault_entity::snapshot::{NodeSnapshot, SNAPSHOT_VERSION};
use pixvault_storage::ContentStore;

/// Remote key prefix snapshots are stored under.
const SNAPSHOT_PREFIX: &str = "backup";

/// Exports and restores the node table.
#[derive(Clone)]
pub struct SnapshotService {
    node_repo: Arc<NodeRepository>,
    content: Arc<ContentStore>,
    cache: Arc<dyn PathCache>,
}

impl std::fmt::Debug for SnapshotService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotService").finish()
    }
}

impl SnapshotService {
    /// Create a new snapshot service.
    pub fn new(
        node_repo: Arc<NodeRepository>,
        content: Arc<ContentStore>,
        cache: Arc<dyn PathCache>,
    ) -> Self {
        Self {
            node_repo,
            content,
            cache,
        }
    }

    /// Export every node row.
    pub async fn export(&self) -> AppResult<NodeSnapshot> {
        let nodes = self.node_repo.all_nodes(self.node_repo.pool()).await?;
        Ok(NodeSnapshot::new(nodes))
    }

    /// Replace the node table with a snapshot's rows: transactional
    /// delete-all plus bulk insert. Snapshots from a newer format
    /// version are rejected.
    pub async fn restore(&self, snapshot: &NodeSnapshot) -> AppResult<()> {
        if snapshot.version > SNAPSHOT_VERSION {
            return Err(AppError::validation(format!(
                "Snapshot version {} is newer than supported version {SNAPSHOT_VERSION}",
                snapshot.version
            )));
        }

        let mut tx = self.node_repo.pool().begin().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to begin restore", e)
        })?;

        self.node_repo.delete_all(&mut *tx).await?;
        // Chunked to stay clear of SQLite's bind-variable ceiling.
        for chunk in snapshot.nodes.chunks(100) {
            self.node_repo.insert_full_batch(&mut *tx, chunk).await?;
        }

        tx.commit().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to commit restore", e)
        })?;

        // Every cached resolution may now be wrong.
        self.cache.clear().await;
        info!(nodes = snapshot.nodes.len(), "Restored node table from snapshot");
        Ok(())
    }

    /// Serialize the current table and store it remotely under the given
    /// name.
    pub async fn store(&self, name: &str) -> AppResult<()> {
        let snapshot = self.export().await?;
        let data = serde_json::to_vec(&snapshot)?;
        self.content
            .upload_bytes(
                Bytes::from(data),
                &format!("{SNAPSHOT_PREFIX}/{name}"),
                "application/json",
            )
            .await
    }

    /// Fetch a stored snapshot and restore it.
    pub async fn load(&self, name: &str) -> AppResult<()> {
        let data = self
            .content
            .download_bytes(&format!("{SNAPSHOT_PREFIX}/{name}"))
            .await?;
        let snapshot: NodeSnapshot = serde_json::from_slice(&data)?;
        self.restore(&snapshot).await
    }

    /// List stored snapshots, newest first.
    pub async fn list(&self) -> AppResult<Vec<RemoteObject>> {
        let mut objects = self.content.list(SNAPSHOT_PREFIX).await?;
        objects.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        Ok(objects)
    }

    /// Delete a stored snapshot.
    pub async fn delete(&self, name: &str) -> AppResult<()> {
        self.content
            .delete(&format!("{SNAPSHOT_PREFIX}/{name}"))
            .await
    }
}
