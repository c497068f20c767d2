//! # pixvault-cache
//!
//! The materialized path cache: full path string → resolved [`Node`].
//!
//! The cache is a derived index over the relational store, never a
//! source of truth. It is populated on successful resolution and
//! invalidated explicitly on structural mutation (rename, move,
//! delete) — prefix-wide, because every cached descendant path of a
//! mutated node resolves through it. There is no TTL; a momentarily
//! stale read between a commit and its invalidation is the documented
//! consistency model.

pub mod memory;

use async_trait::async_trait;

use pixvault_entity::node::Node;

pub use memory::MemoryPathCache;

/// Cache seam injected into the path-tree service.
#[async_trait]
pub trait PathCache: Send + Sync + std::fmt::Debug + 'static {
    /// Look up a cached resolution.
    async fn get(&self, path: &str) -> Option<Node>;

    /// Store a successful resolution.
    async fn put(&self, path: &str, node: Node);

    /// Drop a single path.
    async fn remove(&self, path: &str);

    /// Drop a path and every cached descendant path, returning how many
    /// entries were removed.
    async fn invalidate_prefix(&self, path: &str) -> u64;

    /// Drop everything (snapshot restore).
    async fn clear(&self);
}
