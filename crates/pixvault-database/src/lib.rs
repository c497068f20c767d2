//! # pixvault-database
//!
//! SQLite connection pool management, the migration runner, and the
//! node/task repositories.
//!
//! Repository methods are generic over [`sqlx::Executor`] so the same
//! query can run against the pool or inside a caller-owned transaction.
//! The outbox contract depends on this: a sync task must be inserted in
//! the same transaction as the node mutation it mirrors.

pub mod connection;
pub mod migration;
pub mod repositories;

pub use connection::DatabasePool;
