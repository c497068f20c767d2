//! Hybrid content store: sharded local cache in front of the remote
//! store.
//!
//! Reads are served from the cache directory; a miss pulls the object
//! from the remote store into place first. Concurrent misses for the
//! same cache path are coalesced so the object is downloaded once no
//! matter the request concurrency.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tokio::fs;
use tracing::debug;

use pixvault_core::error::{AppError, ErrorKind};
use pixvault_core::result::AppResult;
use pixvault_core::singleflight::Singleflight;
use pixvault_core::traits::remote::{RemoteObject, RemoteStore};
use pixvault_entity::node::model::cache_rel_path;

/// Local-cache + remote-store pairing for file content.
#[derive(Debug)]
pub struct ContentStore {
    /// Root directory for runtime data; cache files live under
    /// `<data_root>/cache`.
    data_root: PathBuf,
    /// Durable source of truth.
    remote: Arc<dyn RemoteStore>,
    /// Coalesces concurrent cache-miss downloads per cache path.
    fetch_flight: Singleflight<PathBuf>,
}

impl ContentStore {
    /// Create a content store over the given data root and backend.
    pub fn new(data_root: impl Into<PathBuf>, remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            data_root: data_root.into(),
            remote,
            fetch_flight: Singleflight::new(),
        }
    }

    /// The backend type serving as source of truth.
    pub fn backend_type(&self) -> &str {
        self.remote.backend_type()
    }

    /// Absolute cache path for a content hash.
    pub fn cache_path(&self, hash: &str, ext_name: &str) -> PathBuf {
        self.data_root.join(cache_rel_path(hash, ext_name))
    }

    /// Write bytes into the cache, creating the shard directories.
    pub async fn write_cache(&self, data: &[u8], hash: &str, ext_name: &str) -> AppResult<PathBuf> {
        let path = self.cache_path(hash, ext_name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to create cache directory: {}", parent.display()),
                    e,
                )
            })?;
        }
        fs::write(&path, data).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to write cache file: {}", path.display()),
                e,
            )
        })?;
        Ok(path)
    }

    /// Remove a cached file if present.
    pub async fn remove_cache(&self, hash: &str, ext_name: &str) -> AppResult<()> {
        let path = self.cache_path(hash, ext_name);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to remove cache file: {}", path.display()),
                e,
            )),
        }
    }

    /// Return the cache path for a content hash, pulling the object from
    /// the remote store on a miss.
    ///
    /// Concurrent callers for the same cache path share one download.
    pub async fn fetch(&self, hash: &str, ext_name: &str) -> AppResult<PathBuf> {
        let path = self.cache_path(hash, ext_name);
        if fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(path);
        }

        let key = format!("{hash}{ext_name}");
        self.fetch_flight
            .run(&key, || async {
                // A follower that lost the race may arrive after the
                // leader finished; the file is already in place.
                if fs::try_exists(&path).await.unwrap_or(false) {
                    return Ok(path.clone());
                }
                debug!(%key, "Cache miss, pulling from remote store");
                self.remote.get(&key, &path).await?;
                Ok(path.clone())
            })
            .await
    }

    /// Upload a local file to the remote store.
    pub async fn upload(&self, local: &Path, remote_path: &str, content_type: &str) -> AppResult<()> {
        self.remote.put(remote_path, local, content_type).await
    }

    /// Download a remote object into an arbitrary local file.
    pub async fn download(&self, remote_path: &str, local: &Path) -> AppResult<()> {
        self.remote.get(remote_path, local).await
    }

    /// Delete a single remote object.
    pub async fn delete(&self, remote_path: &str) -> AppResult<()> {
        self.remote.delete(remote_path).await
    }

    /// Delete a batch of remote objects, returning the failed subset.
    pub async fn delete_batch(&self, remote_paths: &[String]) -> AppResult<Vec<String>> {
        self.remote.delete_batch(remote_paths).await
    }

    /// List remote objects under a prefix.
    pub async fn list(&self, prefix: &str) -> AppResult<Vec<RemoteObject>> {
        self.remote.list(prefix).await
    }

    /// Upload an in-memory payload, bypassing the cache directory.
    pub async fn upload_bytes(
        &self,
        data: Bytes,
        remote_path: &str,
        content_type: &str,
    ) -> AppResult<()> {
        self.remote.put_bytes(remote_path, data, content_type).await
    }

    /// Download a remote object into memory, bypassing the cache
    /// directory.
    pub async fn download_bytes(&self, remote_path: &str) -> AppResult<Bytes> {
        self.remote.get_bytes(remote_path).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::backends::local::LocalRemoteStore;

    use super::*;

    /// Wraps a real backend and counts `get` calls.
    #[derive(Debug)]
    struct CountingStore {
        inner: LocalRemoteStore,
        gets: AtomicUsize,
    }

    #[async_trait]
    impl RemoteStore for CountingStore {
        fn backend_type(&self) -> &str {
            "counting"
        }
        async fn put(&self, key: &str, local: &Path, content_type: &str) -> AppResult<()> {
            self.inner.put(key, local, content_type).await
        }
        async fn get(&self, key: &str, local: &Path) -> AppResult<()> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            // Slow the download so followers pile up on the leader.
            tokio::time::sleep(std::time::Duration::from_millis(30)).await;
            self.inner.get(key, local).await
        }
        async fn put_bytes(&self, key: &str, data: Bytes, content_type: &str) -> AppResult<()> {
            self.inner.put_bytes(key, data, content_type).await
        }
        async fn get_bytes(&self, key: &str) -> AppResult<Bytes> {
            self.inner.get_bytes(key).await
        }
        async fn delete(&self, key: &str) -> AppResult<()> {
            self.inner.delete(key).await
        }
        async fn delete_batch(&self, keys: &[String]) -> AppResult<Vec<String>> {
            self.inner.delete_batch(keys).await
        }
        async fn list(&self, prefix: &str) -> AppResult<Vec<RemoteObject>> {
            self.inner.list(prefix).await
        }
    }

    const HASH: &str = "deadbeefcafe0123";

    async fn fixture() -> (tempfile::TempDir, Arc<CountingStore>, Arc<ContentStore>) {
        let dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(CountingStore {
            inner: LocalRemoteStore::new(dir.path().join("remote").to_str().unwrap())
                .await
                .unwrap(),
            gets: AtomicUsize::new(0),
        });
        let store = Arc::new(ContentStore::new(
            dir.path().join("data"),
            remote.clone() as Arc<dyn RemoteStore>,
        ));
        (dir, remote, store)
    }

    #[tokio::test]
    async fn concurrent_fetches_download_once() {
        let (_dir, remote, store) = fixture().await;
        remote
            .put_bytes(&format!("{HASH}.png"), Bytes::from_static(b"image"), "")
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..6 {
            let store = store.clone();
            handles.push(tokio::spawn(
                async move { store.fetch(HASH, ".png").await },
            ));
        }
        let mut paths = Vec::new();
        for handle in handles {
            paths.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(remote.gets.load(Ordering::SeqCst), 1);
        assert!(paths.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(fs::read(&paths[0]).await.unwrap(), b"image");
    }

    #[tokio::test]
    async fn fetch_hits_cache_without_remote_call() {
        let (_dir, remote, store) = fixture().await;
        store.write_cache(b"cached", HASH, ".png").await.unwrap();

        let path = store.fetch(HASH, ".png").await.unwrap();
        assert_eq!(remote.gets.load(Ordering::SeqCst), 0);
        assert_eq!(fs::read(&path).await.unwrap(), b"cached");
    }

    #[tokio::test]
    async fn fetch_missing_object_fails() {
        let (_dir, _remote, store) = fixture().await;
        assert!(store.fetch(HASH, ".png").await.is_err());
    }

    #[tokio::test]
    async fn cache_paths_are_sharded() {
        let (_dir, _remote, store) = fixture().await;
        let path = store.cache_path("abcdef012345", ".png");
        let rel: Vec<_> = path.iter().rev().take(3).collect();
        assert_eq!(rel[0].to_str().unwrap(), "abcdef012345.png");
        assert_eq!(rel[1].to_str().unwrap(), "cd");
        assert_eq!(rel[2].to_str().unwrap(), "ab");
    }

    #[tokio::test]
    async fn remove_cache_is_idempotent() {
        let (_dir, _remote, store) = fixture().await;
        store.write_cache(b"x", HASH, ".png").await.unwrap();
        store.remove_cache(HASH, ".png").await.unwrap();
        store.remove_cache(HASH, ".png").await.unwrap();
    }
}
