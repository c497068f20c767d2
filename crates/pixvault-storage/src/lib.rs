//! # pixvault-storage
//!
//! Remote object-store backends and the [`content::ContentStore`]
//! hybrid cache that fronts them.
//!
//! The remote store is the durable source of truth; the sharded local
//! cache directory is disposable and repopulated on demand. Backends
//! implement [`pixvault_core::traits::remote::RemoteStore`]: a
//! filesystem mirror (default `local` feature) and an S3-compatible
//! client (`s3` feature).

pub mod backends;
pub mod content;

pub use content::ContentStore;
