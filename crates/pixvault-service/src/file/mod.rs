//! Content-addressed file operations.

pub mod service;

pub use service::FileService;
