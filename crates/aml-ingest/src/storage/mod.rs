//! Object storage and blob transfer seams.
//!
//! The pipeline never talks to S3 directly for payloads: it asks an
//! [`ObjectStore`] for short-lived signed URLs and moves the bytes with a
//! [`BlobTransport`].

use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    presigning::PresigningConfig,
    Client,
};
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::error::{IngestError, Result};

pub mod config;
pub mod transport;

pub use config::StorageConfig;
pub use transport::HttpTransport;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Keys stored under `prefix`.
    async fn list_folder(&self, prefix: &str) -> Result<Vec<String>>;

    /// A GET URL for `key` valid for `ttl`.
    async fn signed_retrieval_url(&self, key: &str, ttl: Duration) -> Result<String>;

    /// A PUT URL for `key` valid for `ttl`.
    async fn signed_upload_url(&self, key: &str, ttl: Duration) -> Result<String>;
}

#[async_trait]
pub trait BlobTransport: Send + Sync {
    async fn get(&self, url: &str) -> Result<Vec<u8>>;

    async fn put(&self, url: &str, data: Vec<u8>, content_type: &str) -> Result<()>;
}

/// Join a folder and a file name into an object key.
pub fn object_key(folder: &str, file_name: &str) -> String {
    let folder = folder.trim_matches('/');
    let file_name = file_name.trim_start_matches('/');
    if folder.is_empty() {
        file_name.to_string()
    } else {
        format!("{}/{}", folder, file_name)
    }
}

#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(config: StorageConfig) -> Self {
        debug!(bucket = %config.bucket, endpoint = ?config.endpoint, "Initializing object store");

        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "aml-storage",
        );

        let mut builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(builder.build());

        info!(bucket = %config.bucket, "Object store initialized");

        Self {
            client,
            bucket: config.bucket,
        }
    }

    fn presigning(ttl: Duration) -> Result<PresigningConfig> {
        PresigningConfig::expires_in(ttl)
            .map_err(|e| IngestError::Storage(format!("Invalid presigning TTL {:?}: {}", ttl, e)))
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self))]
    async fn list_folder(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| IngestError::Storage(format!("Failed to list {}: {}", prefix, e)))?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                },
                _ => break,
            }
        }

        debug!(prefix = %prefix, count = keys.len(), "Listed storage folder");
        Ok(keys)
    }

    #[instrument(skip(self))]
    async fn signed_retrieval_url(&self, key: &str, ttl: Duration) -> Result<String> {
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(Self::presigning(ttl)?)
            .await
            .map_err(|e| IngestError::Storage(format!("Failed to sign GET for {}: {}", key, e)))?;

        Ok(presigned.uri().to_string())
    }

    #[instrument(skip(self))]
    async fn signed_upload_url(&self, key: &str, ttl: Duration) -> Result<String> {
        let presigned = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(Self::presigning(ttl)?)
            .await
            .map_err(|e| IngestError::Storage(format!("Failed to sign PUT for {}: {}", key, e)))?;

        Ok(presigned.uri().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_joins_without_double_slashes() {
        assert_eq!(object_key("upload/p1/", "batch.zip"), "upload/p1/batch.zip");
        assert_eq!(object_key("/template", "/template.zip"), "template/template.zip");
        assert_eq!(object_key("", "root.zip"), "root.zip");
    }

    #[tokio::test]
    async fn test_presigned_get_points_at_bucket_and_key() {
        let store = S3ObjectStore::new(StorageConfig::for_minio("http://localhost:9000", "uploads"));
        let url = store
            .signed_retrieval_url("upload/p1/batch.zip", Duration::from_secs(600))
            .await
            .unwrap();

        assert!(url.starts_with("http://localhost:9000/uploads/upload/p1/batch.zip?"));
        assert!(url.contains("X-Amz-Expires=600"));
    }
}
