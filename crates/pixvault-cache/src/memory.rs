//! In-memory path cache implementation using the moka crate.

use async_trait::async_trait;
use moka::future::Cache;
use tracing::debug;

use pixvault_core::config::cache::CacheConfig;
use pixvault_entity::node::Node;

use crate::PathCache;

/// Bounded in-memory path cache.
#[derive(Debug, Clone)]
pub struct MemoryPathCache {
    cache: Cache<String, Node>,
}

impl MemoryPathCache {
    /// Create a new path cache from configuration.
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            cache: Cache::builder().max_capacity(config.max_capacity).build(),
        }
    }

    /// Number of cached resolutions (approximate until pending
    /// maintenance runs).
    pub fn len(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PathCache for MemoryPathCache {
    async fn get(&self, path: &str) -> Option<Node> {
        self.cache.get(path).await
    }

    async fn put(&self, path: &str, node: Node) {
        self.cache.insert(path.to_string(), node).await;
    }

    async fn remove(&self, path: &str) {
        self.cache.remove(path).await;
    }

    async fn invalidate_prefix(&self, path: &str) -> u64 {
        // Moka has no prefix scan, so collect matching keys first and
        // remove them afterwards. "/a" must drop "/a" and "/a/…" but
        // not "/ab".
        let child_prefix = format!("{}/", path.trim_end_matches('/'));
        let keys: Vec<String> = self
            .cache
            .iter()
            .filter(|(key, _)| key.as_str() == path || key.starts_with(&child_prefix))
            .map(|(key, _)| key.to_string())
            .collect();

        let mut count = 0u64;
        for key in keys {
            self.cache.remove(&key).await;
            count += 1;
        }

        debug!(path, count, "Invalidated cached paths");
        count
    }

    async fn clear(&self) {
        self.cache.invalidate_all();
    }
}
