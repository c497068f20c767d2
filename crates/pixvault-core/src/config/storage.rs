//! Local cache and remote object-store configuration.

use serde::{Deserialize, Serialize};

/// Top-level storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for all runtime data (cache files live under
    /// `<data_root>/cache`).
    #[serde(default = "default_data_root")]
    pub data_root: String,
    /// Remote backend to use: `"local"` or `"s3"`.
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Maximum accepted upload size in bytes (default 50 MB).
    #[serde(default = "default_max_upload")]
    pub max_upload_size_bytes: u64,
    /// Filesystem-mirror backend configuration.
    #[serde(default)]
    pub local: LocalRemoteConfig,
    /// S3-compatible backend configuration.
    #[serde(default)]
    pub s3: S3RemoteConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_root: default_data_root(),
            backend: default_backend(),
            max_upload_size_bytes: default_max_upload(),
            local: LocalRemoteConfig::default(),
            s3: S3RemoteConfig::default(),
        }
    }
}

/// Filesystem-mirror remote backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalRemoteConfig {
    /// Root path the mirror stores objects under.
    #[serde(default = "default_mirror_root")]
    pub root_path: String,
}

impl Default for LocalRemoteConfig {
    fn default() -> Self {
        Self {
            root_path: default_mirror_root(),
        }
    }
}

/// S3-compatible remote backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct S3RemoteConfig {
    /// S3 endpoint URL (for non-AWS services like MinIO).
    #[serde(default)]
    pub endpoint: String,
    /// AWS region.
    #[serde(default = "default_region")]
    pub region: String,
    /// Bucket name.
    #[serde(default)]
    pub bucket: String,
    /// Access key ID.
    #[serde(default)]
    pub access_key: String,
    /// Secret access key.
    #[serde(default)]
    pub secret_key: String,
    /// Key prefix applied to every object in the bucket.
    #[serde(default)]
    pub prefix: String,
}

fn default_data_root() -> String {
    "./data".to_string()
}

fn default_backend() -> String {
    "local".to_string()
}

fn default_max_upload() -> u64 {
    52_428_800 // 50 MB
}

fn default_mirror_root() -> String {
    "./data/remote".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}
