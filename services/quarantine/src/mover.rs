//! Copy-then-delete move of flagged objects into the quarantine bucket.
//!
//! The order is strict: source check, destination check, copy, delete. The
//! source is only deleted after the copy returned, so a failure leaves the
//! object in its source bucket or, if the delete fails, in both buckets.

use imgguard_pipeline::{HandlerError, ObjectRef, ObjectStore};
use metrics::counter;
use std::sync::Arc;
use tracing::{error, info, instrument};

/// Result of a quarantine request that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuarantineOutcome {
    /// Object moved to `destination`
    Moved { destination: ObjectRef },
    /// Object already lives in the quarantine bucket
    AlreadyQuarantined,
    /// Event was not flagged and the policy only moves flagged objects
    NotFlagged,
}

/// Moves objects into the quarantine bucket
pub struct QuarantineMover {
    store: Arc<dyn ObjectStore>,
    quarantine_bucket: String,
}

impl QuarantineMover {
    pub fn new(store: Arc<dyn ObjectStore>, quarantine_bucket: impl Into<String>) -> Self {
        Self {
            store,
            quarantine_bucket: quarantine_bucket.into(),
        }
    }

    /// True when the quarantine bucket can be reached and exists
    pub async fn destination_available(&self) -> bool {
        matches!(self.store.bucket_exists(&self.quarantine_bucket).await, Ok(true))
    }

    #[instrument(
        skip(self, object),
        fields(object = %object, quarantine = %self.quarantine_bucket)
    )]
    pub async fn quarantine(&self, object: &ObjectRef) -> Result<QuarantineOutcome, HandlerError> {
        // Copy onto itself followed by delete would destroy the object
        if object.bucket_id == self.quarantine_bucket {
            info!("Object already in quarantine bucket");
            return Ok(QuarantineOutcome::AlreadyQuarantined);
        }

        if let Err(reason) = self.check_bucket(&object.bucket_id).await {
            return Err(HandlerError::SourceBucketNotFound {
                bucket: object.bucket_id.clone(),
                reason,
            });
        }

        if let Err(reason) = self.check_bucket(&self.quarantine_bucket).await {
            return Err(HandlerError::DestinationBucketNotFound {
                bucket: self.quarantine_bucket.clone(),
                reason,
            });
        }

        self.store
            .copy_object(&object.bucket_id, &object.object_id, &self.quarantine_bucket)
            .await
            .map_err(|e| HandlerError::CopyFailed {
                source_bucket: object.bucket_id.clone(),
                destination_bucket: self.quarantine_bucket.clone(),
                object: object.object_id.clone(),
                reason: e.to_string(),
            })?;

        if let Err(e) = self
            .store
            .delete_object(&object.bucket_id, &object.object_id)
            .await
        {
            counter!("imgguard.quarantine.partial_failures").increment(1);
            error!(
                bucket = %object.bucket_id,
                object = %object.object_id,
                partial_failure = true,
                error = %e,
                "Object copied to quarantine but source delete failed"
            );

            return Err(HandlerError::DeleteFailed {
                source_bucket: object.bucket_id.clone(),
                destination_bucket: self.quarantine_bucket.clone(),
                object: object.object_id.clone(),
                reason: e.to_string(),
            });
        }

        counter!("imgguard.quarantine.moved").increment(1);
        info!(
            bucket = %object.bucket_id,
            object = %object.object_id,
            "Object moved to quarantine"
        );

        Ok(QuarantineOutcome::Moved {
            destination: object.in_bucket(self.quarantine_bucket.as_str()),
        })
    }

    /// Metadata read on `bucket`; the error carries the reason
    async fn check_bucket(&self, bucket: &str) -> Result<(), String> {
        match self.store.bucket_exists(bucket).await {
            Ok(true) => Ok(()),
            Ok(false) => Err("bucket does not exist".to_string()),
            Err(e) => Err(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgguard_pipeline::testing::{MemoryStore, MockStore, StoreOperation};
    use imgguard_pipeline::StorageError;
    use mockall::predicate;
    use mockall::Sequence;

    fn photo() -> ObjectRef {
        ObjectRef::new("incoming", "photo1.jpg")
    }

    fn seeded_store() -> Arc<MemoryStore> {
        Arc::new(
            MemoryStore::new()
                .with_object("incoming", "photo1.jpg", "jpeg bytes")
                .with_bucket("quarantine"),
        )
    }

    #[tokio::test]
    async fn test_move_to_quarantine() {
        let store = seeded_store();
        let mover = QuarantineMover::new(store.clone(), "quarantine");

        let outcome = mover.quarantine(&photo()).await.unwrap();

        assert_eq!(
            outcome,
            QuarantineOutcome::Moved {
                destination: ObjectRef::new("quarantine", "photo1.jpg")
            }
        );
        assert!(!store.contains("incoming", "photo1.jpg"));
        assert!(store.contains("quarantine", "photo1.jpg"));
    }

    #[tokio::test]
    async fn test_delete_failure_leaves_object_in_both_buckets() {
        let store = seeded_store();
        store.fail_on(StoreOperation::Delete);
        let mover = QuarantineMover::new(store.clone(), "quarantine");

        let error = mover.quarantine(&photo()).await.unwrap_err();

        assert!(error.is_partial_failure());
        assert_eq!(error.code(), "PARTIAL_FAILURE");
        assert!(store.contains("incoming", "photo1.jpg"));
        assert!(store.contains("quarantine", "photo1.jpg"));
    }

    #[tokio::test]
    async fn test_copy_failure_leaves_source_untouched() {
        let store = seeded_store();
        store.fail_on(StoreOperation::Copy);
        let mover = QuarantineMover::new(store.clone(), "quarantine");

        let error = mover.quarantine(&photo()).await.unwrap_err();

        assert!(matches!(error, HandlerError::CopyFailed { .. }));
        assert!(!error.is_partial_failure());
        assert!(store.contains("incoming", "photo1.jpg"));
        assert!(!store.contains("quarantine", "photo1.jpg"));
    }

    #[tokio::test]
    async fn test_copy_failure_never_deletes() {
        let mut store = MockStore::new();
        store.expect_bucket_exists().returning(|_| Ok(true));
        store.expect_copy_object().returning(|_, _, _| {
            Err(StorageError::request(
                "copy object",
                "incoming/photo1.jpg",
                "denied",
            ))
        });
        store.expect_delete_object().never();

        let mover = QuarantineMover::new(Arc::new(store), "quarantine");

        assert!(mover.quarantine(&photo()).await.is_err());
    }

    #[tokio::test]
    async fn test_checks_source_then_destination_then_copies_then_deletes() {
        let mut seq = Sequence::new();
        let mut store = MockStore::new();
        store
            .expect_bucket_exists()
            .with(predicate::eq("incoming"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(true));
        store
            .expect_bucket_exists()
            .with(predicate::eq("quarantine"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(true));
        store
            .expect_copy_object()
            .with(
                predicate::eq("incoming"),
                predicate::eq("photo1.jpg"),
                predicate::eq("quarantine"),
            )
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        store
            .expect_delete_object()
            .with(predicate::eq("incoming"), predicate::eq("photo1.jpg"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        let mover = QuarantineMover::new(Arc::new(store), "quarantine");

        assert!(mover.quarantine(&photo()).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_source_bucket() {
        let store = Arc::new(MemoryStore::new().with_bucket("quarantine"));
        let mover = QuarantineMover::new(store, "quarantine");

        match mover.quarantine(&photo()).await {
            Err(HandlerError::SourceBucketNotFound { bucket, .. }) => {
                assert_eq!(bucket, "incoming")
            }
            other => panic!("Expected SourceBucketNotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_destination_bucket() {
        let store = Arc::new(MemoryStore::new().with_object("incoming", "photo1.jpg", "jpeg"));
        let mover = QuarantineMover::new(store.clone(), "quarantine");

        match mover.quarantine(&photo()).await {
            Err(HandlerError::DestinationBucketNotFound { bucket, .. }) => {
                assert_eq!(bucket, "quarantine")
            }
            other => panic!("Expected DestinationBucketNotFound, got {:?}", other),
        }
        assert!(store.contains("incoming", "photo1.jpg"));
    }

    #[tokio::test]
    async fn test_bucket_check_error_reports_reason() {
        let store = seeded_store();
        store.fail_on(StoreOperation::BucketExists);
        let mover = QuarantineMover::new(store, "quarantine");

        match mover.quarantine(&photo()).await {
            Err(HandlerError::SourceBucketNotFound { reason, .. }) => {
                assert!(reason.contains("injected failure"))
            }
            other => panic!("Expected SourceBucketNotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_object_already_in_quarantine_is_kept() {
        let mut store = MockStore::new();
        store.expect_bucket_exists().never();
        store.expect_copy_object().never();
        store.expect_delete_object().never();

        let mover = QuarantineMover::new(Arc::new(store), "quarantine");
        let outcome = mover
            .quarantine(&ObjectRef::new("quarantine", "photo1.jpg"))
            .await
            .unwrap();

        assert_eq!(outcome, QuarantineOutcome::AlreadyQuarantined);
    }
}
