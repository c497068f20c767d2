//! Remote object-store trait for pluggable durable backends.

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;

use crate::result::AppResult;

/// Metadata about a remote object, as returned by listings.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RemoteObject {
    /// File name (last key segment).
    pub name: String,
    /// File extension including the dot, empty if none.
    pub ext: String,
    /// Key relative to the store's configured prefix.
    pub path: String,
    /// Size in bytes.
    pub size: i64,
    /// Last modified timestamp.
    pub last_modified: Option<chrono::DateTime<chrono::Utc>>,
}

/// Trait for durable remote object stores.
///
/// The remote store is the source of truth for file content; the local
/// cache directory in front of it is disposable. Implementations exist
/// for a filesystem mirror and S3-compatible services. The trait is
/// defined here in `pixvault-core` and implemented in `pixvault-storage`.
///
/// Task processing is at-least-once, so every operation must be
/// idempotent: re-putting an existing key and deleting a missing key
/// both succeed.
#[async_trait]
pub trait RemoteStore: Send + Sync + std::fmt::Debug + 'static {
    /// Return the backend type name (e.g., "local", "s3").
    fn backend_type(&self) -> &str;

    /// Upload a local file to the given remote key.
    async fn put(&self, key: &str, local: &Path, content_type: &str) -> AppResult<()>;

    /// Download a remote object into a local file, creating parent
    /// directories as needed.
    async fn get(&self, key: &str, local: &Path) -> AppResult<()>;

    /// Upload an in-memory payload to the given remote key.
    async fn put_bytes(&self, key: &str, data: Bytes, content_type: &str) -> AppResult<()>;

    /// Download a remote object into memory.
    async fn get_bytes(&self, key: &str) -> AppResult<Bytes>;

    /// Delete a single remote object.
    async fn delete(&self, key: &str) -> AppResult<()>;

    /// Delete a batch of remote objects, returning the keys that failed.
    ///
    /// A wholesale failure returns every key as failed rather than an
    /// error, so callers can mark exactly the unsynced subset.
    async fn delete_batch(&self, keys: &[String]) -> AppResult<Vec<String>>;

    /// List remote objects under a prefix, with the store's own key
    /// prefix stripped from the returned paths.
    async fn list(&self, prefix: &str) -> AppResult<Vec<RemoteObject>>;
}
