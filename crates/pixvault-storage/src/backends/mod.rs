//! Remote store backend implementations.

#[cfg(feature = "local")]
pub mod local;
#[cfg(feature = "s3")]
pub mod s3;

use std::sync::Arc;

use pixvault_core::config::storage::StorageConfig;
use pixvault_core::error::AppError;
use pixvault_core::result::AppResult;
use pixvault_core::traits::remote::RemoteStore;

/// Build the configured remote store backend.
pub async fn from_config(config: &StorageConfig) -> AppResult<Arc<dyn RemoteStore>> {
    match config.backend.as_str() {
        #[cfg(feature = "local")]
        "local" => {
            tracing::info!(root = %config.local.root_path, "Initializing filesystem mirror backend");
            let store = local::LocalRemoteStore::new(&config.local.root_path).await?;
            Ok(Arc::new(store))
        }
        #[cfg(feature = "s3")]
        "s3" => {
            tracing::info!(bucket = %config.s3.bucket, "Initializing S3 backend");
            let store = s3::S3RemoteStore::new(&config.s3).await?;
            Ok(Arc::new(store))
        }
        other => Err(AppError::configuration(format!(
            "Unknown remote backend: '{other}'"
        ))),
    }
}
