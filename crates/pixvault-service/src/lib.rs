//! # pixvault-service
//!
//! Domain services over the repositories: the path tree
//! ([`tree::PathTreeService`]), content-addressed files
//! ([`file::FileService`]) and node-table snapshots
//! ([`snapshot::SnapshotService`]).

pub mod file;
pub mod snapshot;
pub mod tree;

pub use file::FileService;
pub use snapshot::SnapshotService;
pub use tree::PathTreeService;
