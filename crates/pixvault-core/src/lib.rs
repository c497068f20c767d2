//! # pixvault-core
//!
//! Core crate for PixVault. Contains the unified error system,
//! configuration schemas, the remote-store trait, the singleflight
//! request-coalescing primitive, the sync-drain notifier, and shared
//! pagination types.
//!
//! This crate has **no** internal dependencies on other PixVault crates.

pub mod config;
pub mod error;
pub mod notify;
pub mod result;
pub mod singleflight;
pub mod traits;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
