//! S3-compatible remote store (requires the `s3` feature).

use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use aws_sdk_s3::Client;
use bytes::Bytes;
use tokio::fs;
use tracing::debug;

use pixvault_core::config::storage::S3RemoteConfig;
use pixvault_core::error::{AppError, ErrorKind};
use pixvault_core::result::AppResult;
use pixvault_core::traits::remote::{RemoteObject, RemoteStore};

/// Remote store on an S3-compatible service.
#[derive(Debug, Clone)]
pub struct S3RemoteStore {
    client: Client,
    bucket: String,
    /// Key prefix applied to every object, empty or ending without '/'.
    prefix: String,
}

impl S3RemoteStore {
    /// Create a new S3 remote store from configuration.
    pub async fn new(config: &S3RemoteConfig) -> AppResult<Self> {
        if config.bucket.is_empty() {
            return Err(AppError::configuration("S3 bucket is not configured"));
        }

        let credentials = Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "pixvault",
        );
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials);
        if !config.endpoint.is_empty() {
            loader = loader.endpoint_url(&config.endpoint);
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if !config.endpoint.is_empty() {
            // Custom endpoints (MinIO and friends) expect path-style keys.
            builder = builder.force_path_style(true);
        }
        let client = Client::from_conf(builder.build());

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            prefix: config.prefix.trim_matches('/').to_string(),
        })
    }

    /// Apply the configured key prefix.
    fn full_key(&self, key: &str) -> String {
        let key = key.trim_start_matches('/');
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{key}", self.prefix)
        }
    }

    /// Strip the configured key prefix from a bucket key.
    fn relative_key<'a>(&self, key: &'a str) -> &'a str {
        if self.prefix.is_empty() {
            key
        } else {
            key.strip_prefix(&self.prefix)
                .map(|rest| rest.trim_start_matches('/'))
                .unwrap_or(key)
        }
    }
}

#[async_trait]
impl RemoteStore for S3RemoteStore {
    fn backend_type(&self) -> &str {
        "s3"
    }

    async fn put(&self, key: &str, local: &Path, content_type: &str) -> AppResult<()> {
        let body = ByteStream::from_path(local).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to open upload source: {}", local.display()),
                e,
            )
        })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Storage, format!("S3 put failed: {key}"), e)
            })?;

        debug!(key, "Uploaded object to S3");
        Ok(())
    }

    async fn get(&self, key: &str, local: &Path) -> AppResult<()> {
        let data = self.get_bytes(key).await?;
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to create cache directory: {}", parent.display()),
                    e,
                )
            })?;
        }
        fs::write(local, &data).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to write cache file: {}", local.display()),
                e,
            )
        })?;
        Ok(())
    }

    async fn put_bytes(&self, key: &str, data: Bytes, content_type: &str) -> AppResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Storage, format!("S3 put failed: {key}"), e)
            })?;
        Ok(())
    }

    async fn get_bytes(&self, key: &str) -> AppResult<Bytes> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .send()
            .await
            .map_err(|e| {
                let not_found = e
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false);
                if not_found {
                    AppError::not_found(format!("Object not found: {key}"))
                } else {
                    AppError::with_source(ErrorKind::Storage, format!("S3 get failed: {key}"), e)
                }
            })?;

        let data = resp.body.collect().await.map_err(|e| {
            AppError::with_source(ErrorKind::Storage, format!("S3 body read failed: {key}"), e)
        })?;
        Ok(data.into_bytes())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        // S3 DeleteObject succeeds for missing keys, which is exactly the
        // idempotence the at-least-once queue needs.
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .send()
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Storage, format!("S3 delete failed: {key}"), e)
            })?;
        Ok(())
    }

    async fn delete_batch(&self, keys: &[String]) -> AppResult<Vec<String>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut objects = Vec::with_capacity(keys.len());
        for key in keys {
            let object = ObjectIdentifier::builder()
                .key(self.full_key(key))
                .build()
                .map_err(|e| {
                    AppError::with_source(ErrorKind::Storage, "Invalid delete key", e)
                })?;
            objects.push(object);
        }
        let delete = Delete::builder()
            .set_objects(Some(objects))
            // Not quiet: we need the per-key results to mark exactly the
            // failed subset.
            .quiet(false)
            .build()
            .map_err(|e| {
                AppError::with_source(ErrorKind::Storage, "Failed to build delete batch", e)
            })?;

        let output = match self
            .client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
        {
            Ok(output) => output,
            // Wholesale failure: every key is unsynced.
            Err(e) => {
                debug!(error = %e, "S3 batch delete failed outright");
                return Ok(keys.to_vec());
            }
        };

        let failed = output
            .errors()
            .iter()
            .filter_map(|err| err.key())
            .map(|key| self.relative_key(key).to_string())
            .collect();
        Ok(failed)
    }

    async fn list(&self, prefix: &str) -> AppResult<Vec<RemoteObject>> {
        let mut objects = Vec::new();
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(self.full_key(prefix))
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| {
                AppError::with_source(ErrorKind::Storage, format!("S3 list failed: {prefix}"), e)
            })?;
            for obj in page.contents() {
                let Some(key) = obj.key() else { continue };
                let rel = self.relative_key(key).to_string();
                let name = rel.rsplit('/').next().unwrap_or(&rel).to_string();
                let ext = match name.rfind('.') {
                    Some(idx) if idx > 0 => name[idx..].to_string(),
                    _ => String::new(),
                };
                objects.push(RemoteObject {
                    name,
                    ext,
                    path: rel,
                    size: obj.size().unwrap_or(0),
                    last_modified: obj
                        .last_modified()
                        .and_then(|dt| chrono::DateTime::from_timestamp(dt.secs(), 0)),
                });
            }
        }
        Ok(objects)
    }
}
