//! Filesystem-mirror remote store.
//!
//! Keeps objects as plain files under a root directory. Useful for
//! development, tests and single-box deployments where "remote" is a
//! second disk or a mounted share.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tracing::debug;

use pixvault_core::error::{AppError, ErrorKind};
use pixvault_core::result::AppResult;
use pixvault_core::traits::remote::{RemoteObject, RemoteStore};

/// Remote store backed by a local directory tree.
#[derive(Debug, Clone)]
pub struct LocalRemoteStore {
    /// Root directory for all stored objects.
    root: PathBuf,
}

impl LocalRemoteStore {
    /// Create a new mirror rooted at the given path.
    pub async fn new(root_path: &str) -> AppResult<Self> {
        let root = PathBuf::from(root_path);
        fs::create_dir_all(&root).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to create mirror root: {}", root.display()),
                e,
            )
        })?;
        Ok(Self { root })
    }

    /// Resolve a key to an absolute path within the root.
    fn resolve(&self, key: &str) -> PathBuf {
        self.root.join(key.trim_start_matches('/'))
    }

    /// Ensure the parent directory of a path exists.
    async fn ensure_parent(path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to create parent directory: {}", parent.display()),
                    e,
                )
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for LocalRemoteStore {
    fn backend_type(&self) -> &str {
        "local"
    }

    async fn put(&self, key: &str, local: &Path, _content_type: &str) -> AppResult<()> {
        let target = self.resolve(key);
        Self::ensure_parent(&target).await?;
        fs::copy(local, &target).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to store object: {key}"),
                e,
            )
        })?;
        debug!(key, "Stored object in mirror");
        Ok(())
    }

    async fn get(&self, key: &str, local: &Path) -> AppResult<()> {
        let source = self.resolve(key);
        Self::ensure_parent(local).await?;
        fs::copy(&source, local).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::not_found(format!("Object not found: {key}"))
            } else {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to fetch object: {key}"),
                    e,
                )
            }
        })?;
        Ok(())
    }

    async fn put_bytes(&self, key: &str, data: Bytes, _content_type: &str) -> AppResult<()> {
        let target = self.resolve(key);
        Self::ensure_parent(&target).await?;
        fs::write(&target, &data).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to store object: {key}"),
                e,
            )
        })?;
        debug!(key, bytes = data.len(), "Stored object in mirror");
        Ok(())
    }

    async fn get_bytes(&self, key: &str) -> AppResult<Bytes> {
        let source = self.resolve(key);
        let data = fs::read(&source).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::not_found(format!("Object not found: {key}"))
            } else {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to read object: {key}"),
                    e,
                )
            }
        })?;
        Ok(Bytes::from(data))
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let target = self.resolve(key);
        match fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            // Deleting what is already gone is success: tasks are
            // processed at-least-once.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to delete object: {key}"),
                e,
            )),
        }
    }

    async fn delete_batch(&self, keys: &[String]) -> AppResult<Vec<String>> {
        let mut failed = Vec::new();
        for key in keys {
            if self.delete(key).await.is_err() {
                failed.push(key.clone());
            }
        }
        Ok(failed)
    }

    async fn list(&self, prefix: &str) -> AppResult<Vec<RemoteObject>> {
        let start = self.resolve(prefix);
        if fs::metadata(&start).await.is_err() {
            return Ok(Vec::new());
        }

        let mut objects = Vec::new();
        let mut pending = vec![start];
        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to list: {}", dir.display()),
                    e,
                )
            })?;
            while let Some(entry) = entries.next_entry().await.map_err(|e| {
                AppError::with_source(ErrorKind::Storage, "Failed to read directory entry", e)
            })? {
                let path = entry.path();
                let meta = entry.metadata().await.map_err(|e| {
                    AppError::with_source(ErrorKind::Storage, "Failed to stat entry", e)
                })?;
                if meta.is_dir() {
                    pending.push(path);
                    continue;
                }

                let rel = path
                    .strip_prefix(&self.root)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .into_owned();
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let ext = path
                    .extension()
                    .map(|e| format!(".{}", e.to_string_lossy()))
                    .unwrap_or_default();
                objects.push(RemoteObject {
                    name,
                    ext,
                    path: rel,
                    size: meta.len() as i64,
                    last_modified: meta.modified().ok().map(chrono::DateTime::from),
                });
            }
        }
        Ok(objects)
    }
}
