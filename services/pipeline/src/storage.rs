//! Object storage collaborator.
//!
//! The pipeline needs four primitives: a bucket metadata read, a server-side
//! copy, a delete and a write. [`S3ObjectStore`] speaks the S3-compatible XML
//! API, which Cloud Storage exposes through its interoperability endpoint.

use crate::config::StorageConfig;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Storage operation errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("{operation} failed for {target}: {message}")]
    Request {
        operation: &'static str,
        target: String,
        message: String,
    },
}

impl StorageError {
    pub fn request(
        operation: &'static str,
        target: impl Into<String>,
        message: impl ToString,
    ) -> Self {
        StorageError::Request {
            operation,
            target: target.into(),
            message: message.to_string(),
        }
    }
}

/// Storage primitives used by the pipeline
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Metadata read on a bucket. `Ok(false)` when the bucket does not exist.
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError>;

    /// Server-side copy of `key` from `source_bucket` to the same key in
    /// `destination_bucket`. Returns once the copy is complete.
    async fn copy_object(
        &self,
        source_bucket: &str,
        key: &str,
        destination_bucket: &str,
    ) -> Result<(), StorageError>;

    /// Delete `key` from `bucket`
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError>;

    /// Create or overwrite `key` in `bucket`
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError>;
}

/// S3-compatible object store
#[derive(Clone)]
pub struct S3ObjectStore {
    client: S3Client,
}

impl S3ObjectStore {
    /// Create a new store from configuration and the ambient credentials chain
    pub async fn new(config: &StorageConfig) -> Result<Self, StorageError> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Cloud Storage interoperability, MinIO or LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            endpoint = ?config.endpoint_url,
            region = %config.region,
            "Object store initialized"
        );

        Ok(Self { client })
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self))]
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false)
                {
                    Ok(false)
                } else {
                    Err(StorageError::request(
                        "head bucket",
                        bucket,
                        DisplayErrorContext(&e),
                    ))
                }
            }
        }
    }

    #[instrument(skip(self))]
    async fn copy_object(
        &self,
        source_bucket: &str,
        key: &str,
        destination_bucket: &str,
    ) -> Result<(), StorageError> {
        let copy_source = format!("{}/{}", source_bucket, urlencoding::encode(key));

        self.client
            .copy_object()
            .copy_source(copy_source)
            .bucket(destination_bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                StorageError::request(
                    "copy object",
                    format!("{}/{}", source_bucket, key),
                    DisplayErrorContext(&e),
                )
            })?;

        debug!("Object copied");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                StorageError::request(
                    "delete object",
                    format!("{}/{}", bucket, key),
                    DisplayErrorContext(&e),
                )
            })?;

        debug!("Object deleted");
        Ok(())
    }

    #[instrument(skip(self, data), fields(size_bytes = data.len()))]
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| {
                StorageError::request(
                    "put object",
                    format!("{}/{}", bucket, key),
                    DisplayErrorContext(&e),
                )
            })?;

        debug!("Object written");
        Ok(())
    }
}
