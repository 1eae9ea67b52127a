//! Test doubles for the collaborator traits.
//! This module is only available when the `test-utils` feature is enabled or during tests.

use crate::storage::{ObjectStore, StorageError};
use crate::vision::{ImageAnnotator, LikelihoodVector, TextAnnotation, VisionError};
use async_trait::async_trait;
use bytes::Bytes;
use mockall::mock;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

mock! {
    pub Annotator {}

    #[async_trait]
    impl ImageAnnotator for Annotator {
        async fn safe_search(&self, image_uri: &str) -> Result<LikelihoodVector, VisionError>;
        async fn detect_text(
            &self,
            image_uri: &str,
            max_results: u32,
        ) -> Result<Vec<TextAnnotation>, VisionError>;
    }
}

mock! {
    pub Store {}

    #[async_trait]
    impl ObjectStore for Store {
        async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError>;
        async fn copy_object(
            &self,
            source_bucket: &str,
            key: &str,
            destination_bucket: &str,
        ) -> Result<(), StorageError>;
        async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError>;
        async fn put_object(
            &self,
            bucket: &str,
            key: &str,
            data: Bytes,
            content_type: &str,
        ) -> Result<(), StorageError>;
    }
}

/// Storage operation that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    BucketExists,
    Copy,
    Delete,
    Put,
}

impl StoreOperation {
    fn as_str(&self) -> &'static str {
        match self {
            StoreOperation::BucketExists => "head bucket",
            StoreOperation::Copy => "copy object",
            StoreOperation::Delete => "delete object",
            StoreOperation::Put => "put object",
        }
    }
}

/// A stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub data: Bytes,
    pub content_type: Option<String>,
}

/// In-memory buckets with failure injection
#[derive(Debug, Default)]
pub struct MemoryStore {
    buckets: Mutex<HashMap<String, HashMap<String, StoredObject>>>,
    failures: Mutex<HashSet<StoreOperation>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an empty bucket
    pub fn with_bucket(self, bucket: &str) -> Self {
        self.buckets.lock().entry(bucket.to_string()).or_default();
        self
    }

    /// Add an object, creating its bucket if needed
    pub fn with_object(self, bucket: &str, key: &str, data: impl Into<Bytes>) -> Self {
        self.buckets.lock().entry(bucket.to_string()).or_default().insert(
            key.to_string(),
            StoredObject {
                data: data.into(),
                content_type: None,
            },
        );
        self
    }

    /// Make every later call of `operation` fail
    pub fn fail_on(&self, operation: StoreOperation) {
        self.failures.lock().insert(operation);
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.object(bucket, key).is_some()
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.buckets
            .lock()
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .cloned()
    }

    /// Number of objects in `bucket`
    pub fn object_count(&self, bucket: &str) -> usize {
        self.buckets.lock().get(bucket).map(HashMap::len).unwrap_or(0)
    }

    fn check(&self, operation: StoreOperation, target: &str) -> Result<(), StorageError> {
        if self.failures.lock().contains(&operation) {
            return Err(StorageError::request(
                operation.as_str(),
                target,
                "injected failure",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError> {
        self.check(StoreOperation::BucketExists, bucket)?;
        Ok(self.buckets.lock().contains_key(bucket))
    }

    async fn copy_object(
        &self,
        source_bucket: &str,
        key: &str,
        destination_bucket: &str,
    ) -> Result<(), StorageError> {
        let target = format!("{}/{}", source_bucket, key);
        self.check(StoreOperation::Copy, &target)?;

        let mut buckets = self.buckets.lock();
        let object = buckets
            .get(source_bucket)
            .and_then(|objects| objects.get(key))
            .cloned()
            .ok_or_else(|| StorageError::request("copy object", target.as_str(), "no such object"))?;

        buckets
            .get_mut(destination_bucket)
            .ok_or_else(|| {
                StorageError::request("copy object", destination_bucket, "no such bucket")
            })?
            .insert(key.to_string(), object);

        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        let target = format!("{}/{}", bucket, key);
        self.check(StoreOperation::Delete, &target)?;

        self.buckets
            .lock()
            .get_mut(bucket)
            .ok_or_else(|| StorageError::request("delete object", bucket, "no such bucket"))?
            .remove(key);

        Ok(())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let target = format!("{}/{}", bucket, key);
        self.check(StoreOperation::Put, &target)?;

        self.buckets
            .lock()
            .get_mut(bucket)
            .ok_or_else(|| StorageError::request("put object", bucket, "no such bucket"))?
            .insert(
                key.to_string(),
                StoredObject {
                    data,
                    content_type: Some(content_type.to_string()),
                },
            );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_copy_and_delete() {
        let store = MemoryStore::new()
            .with_object("incoming", "photo1.jpg", "jpeg")
            .with_bucket("quarantine");

        store
            .copy_object("incoming", "photo1.jpg", "quarantine")
            .await
            .unwrap();
        assert!(store.contains("incoming", "photo1.jpg"));
        assert!(store.contains("quarantine", "photo1.jpg"));

        store.delete_object("incoming", "photo1.jpg").await.unwrap();
        assert!(!store.contains("incoming", "photo1.jpg"));
        assert_eq!(store.object_count("quarantine"), 1);
    }

    #[tokio::test]
    async fn test_memory_store_failure_injection() {
        let store = MemoryStore::new().with_bucket("b1");
        store.fail_on(StoreOperation::Put);

        let result = store
            .put_object("b1", "sign.png.txt", Bytes::from_static(b"Hello"), "text/plain")
            .await;

        assert!(result.is_err());
        assert_eq!(store.object_count("b1"), 0);
    }

    #[tokio::test]
    async fn test_memory_store_missing_bucket() {
        let store = MemoryStore::new();

        assert!(!store.bucket_exists("incoming").await.unwrap());
        assert!(store
            .copy_object("incoming", "photo1.jpg", "quarantine")
            .await
            .is_err());
    }
}
