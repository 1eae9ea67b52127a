//! Text extraction stage: `custom.fileuploaded` in, `{object}.txt` written.

use bytes::Bytes;
use imgguard_pipeline::schema::FILE_UPLOADED_EVENT_TYPE;
use imgguard_pipeline::{
    async_trait, expect_type, CloudEvent, EventHandler, FileUploaded, HandlerError,
    ImageAnnotator, ObjectRef, ObjectStore,
};
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Content type of the written text object
pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Result of a successful extraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionOutcome {
    /// Detection found no text; nothing was written
    NoText,
    /// Text written to `target`
    Written { target: ObjectRef, bytes: usize },
}

/// Text extractor
pub struct TextExtractor {
    annotator: Arc<dyn ImageAnnotator>,
    store: Arc<dyn ObjectStore>,
    max_results: u32,
}

impl TextExtractor {
    pub fn new(
        annotator: Arc<dyn ImageAnnotator>,
        store: Arc<dyn ObjectStore>,
        max_results: u32,
    ) -> Self {
        Self {
            annotator,
            store,
            max_results,
        }
    }

    pub async fn process(&self, event: &CloudEvent) -> Result<ExtractionOutcome, HandlerError> {
        let context = expect_type(event, FILE_UPLOADED_EVENT_TYPE)?;
        let upload = FileUploaded::from_event(event)?;

        info!(
            event_id = %context.id,
            bucket = %upload.bucket_id,
            object = %upload.object_id,
            "Extracting text"
        );

        self.extract(&upload.object_ref()).await
    }

    #[instrument(skip(self, object), fields(object = %object))]
    async fn extract(&self, object: &ObjectRef) -> Result<ExtractionOutcome, HandlerError> {
        let annotations = self
            .annotator
            .detect_text(&object.uri(), self.max_results)
            .await
            .map_err(|e| HandlerError::ExtractionFailed(e.to_string()))?;

        // The first annotation holds the full text, the rest are per-word regions
        let text = annotations
            .into_iter()
            .next()
            .map(|annotation| annotation.description)
            .unwrap_or_default();

        if text.is_empty() {
            debug!("No text detected");
            return Ok(ExtractionOutcome::NoText);
        }

        let target = object.text_companion();
        let bytes = text.len();

        self.store
            .put_object(
                &target.bucket_id,
                &target.object_id,
                Bytes::from(text),
                TEXT_CONTENT_TYPE,
            )
            .await
            .map_err(|e| HandlerError::WriteFailed {
                bucket: target.bucket_id.clone(),
                object: target.object_id.clone(),
                reason: e.to_string(),
            })?;

        counter!("imgguard.text.written").increment(1);
        info!(text_object = %target, bytes, "Extracted text written");

        Ok(ExtractionOutcome::Written { target, bytes })
    }
}

#[async_trait]
impl EventHandler for TextExtractor {
    fn name(&self) -> &'static str {
        "text-extractor"
    }

    async fn handle(&self, event: CloudEvent) -> Result<Option<CloudEvent>, HandlerError> {
        self.process(&event).await?;
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgguard_pipeline::schema::{BUCKET_ID_ATTR, EXPLICIT_CONTENT_ATTR, OBJECT_ID_ATTR};
    use imgguard_pipeline::testing::{MemoryStore, MockAnnotator, MockStore, StoreOperation};
    use imgguard_pipeline::{
        EventContext, EventEncoding, TextAnnotation, ValidationError, VisionError,
    };
    use mockall::predicate;

    fn uploaded(bucket: &str, object: &str) -> CloudEvent {
        FileUploaded::new(ObjectRef::new(bucket, object), false)
            .into_event(
                EventContext::new(FILE_UPLOADED_EVENT_TYPE, "custom.explicit-content-detector"),
                EventEncoding::Body,
            )
            .unwrap()
    }

    fn annotations(texts: &[&str]) -> Vec<TextAnnotation> {
        texts
            .iter()
            .map(|text| TextAnnotation {
                description: text.to_string(),
                locale: None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_no_annotations_writes_nothing() {
        let mut annotator = MockAnnotator::new();
        annotator
            .expect_detect_text()
            .with(predicate::eq("gs://b1/blank.png"), predicate::eq(10))
            .times(1)
            .returning(|_, _| Ok(Vec::new()));
        let mut store = MockStore::new();
        store.expect_put_object().never();

        let extractor = TextExtractor::new(Arc::new(annotator), Arc::new(store), 10);
        let response = extractor.handle(uploaded("b1", "blank.png")).await.unwrap();

        assert!(response.is_none());
    }

    #[tokio::test]
    async fn test_first_annotation_is_written_beside_the_image() {
        let mut annotator = MockAnnotator::new();
        annotator
            .expect_detect_text()
            .returning(|_, _| Ok(annotations(&["Hello"])));
        let store = Arc::new(MemoryStore::new().with_object("b1", "sign.png", "png bytes"));

        let extractor = TextExtractor::new(Arc::new(annotator), store.clone(), 10);
        let outcome = extractor.process(&uploaded("b1", "sign.png")).await.unwrap();

        assert_eq!(
            outcome,
            ExtractionOutcome::Written {
                target: ObjectRef::new("b1", "sign.png.txt"),
                bytes: 5,
            }
        );
        let written = store.object("b1", "sign.png.txt").unwrap();
        assert_eq!(written.data, Bytes::from_static(b"Hello"));
        assert_eq!(written.content_type.as_deref(), Some(TEXT_CONTENT_TYPE));
    }

    #[tokio::test]
    async fn test_word_annotations_are_discarded() {
        let mut annotator = MockAnnotator::new();
        annotator
            .expect_detect_text()
            .returning(|_, _| Ok(annotations(&["STOP\nAHEAD\n", "STOP", "AHEAD"])));
        let store = Arc::new(MemoryStore::new().with_bucket("b1"));

        let extractor = TextExtractor::new(Arc::new(annotator), store.clone(), 10);
        extractor.process(&uploaded("b1", "road.jpg")).await.unwrap();

        assert_eq!(
            store.object("b1", "road.jpg.txt").unwrap().data,
            Bytes::from_static(b"STOP\nAHEAD\n")
        );
        assert_eq!(store.object_count("b1"), 1);
    }

    #[tokio::test]
    async fn test_existing_text_object_is_overwritten() {
        let mut annotator = MockAnnotator::new();
        annotator
            .expect_detect_text()
            .returning(|_, _| Ok(annotations(&["new"])));
        let store = Arc::new(MemoryStore::new().with_object("b1", "sign.png.txt", "old"));

        let extractor = TextExtractor::new(Arc::new(annotator), store.clone(), 10);
        extractor.process(&uploaded("b1", "sign.png")).await.unwrap();

        assert_eq!(
            store.object("b1", "sign.png.txt").unwrap().data,
            Bytes::from_static(b"new")
        );
    }

    #[tokio::test]
    async fn test_detection_failure() {
        let mut annotator = MockAnnotator::new();
        annotator
            .expect_detect_text()
            .returning(|_, _| Err(VisionError::Request("timeout".to_string())));
        let mut store = MockStore::new();
        store.expect_put_object().never();

        let extractor = TextExtractor::new(Arc::new(annotator), Arc::new(store), 10);
        let error = extractor.handle(uploaded("b1", "sign.png")).await.unwrap_err();

        assert_eq!(error.code(), "EXTRACTION_FAILED");
        assert_eq!(error.status().as_u16(), 500);
    }

    #[tokio::test]
    async fn test_write_failure() {
        let mut annotator = MockAnnotator::new();
        annotator
            .expect_detect_text()
            .returning(|_, _| Ok(annotations(&["Hello"])));
        let store = Arc::new(MemoryStore::new().with_bucket("b1"));
        store.fail_on(StoreOperation::Put);

        let extractor = TextExtractor::new(Arc::new(annotator), store, 10);
        let error = extractor.handle(uploaded("b1", "sign.png")).await.unwrap_err();

        match error {
            HandlerError::WriteFailed { bucket, object, .. } => {
                assert_eq!(bucket, "b1");
                assert_eq!(object, "sign.png.txt");
            }
            other => panic!("Expected WriteFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_wrong_event_type_makes_no_calls() {
        let mut annotator = MockAnnotator::new();
        annotator.expect_detect_text().never();
        let mut store = MockStore::new();
        store.expect_put_object().never();

        let extractor = TextExtractor::new(Arc::new(annotator), Arc::new(store), 10);
        let event = CloudEvent::new(EventContext::new("google.storage.object.finalize", "tests"));

        let error = extractor.handle(event).await.unwrap_err();

        assert_eq!(error.status().as_u16(), 400);
    }

    #[tokio::test]
    async fn test_extension_encoded_event_is_accepted() {
        let mut annotator = MockAnnotator::new();
        annotator
            .expect_detect_text()
            .with(predicate::eq("gs://b1/o1"), predicate::eq(3))
            .returning(|_, _| Ok(Vec::new()));
        let mut store = MockStore::new();
        store.expect_put_object().never();

        let extractor = TextExtractor::new(Arc::new(annotator), Arc::new(store), 3);
        let event = CloudEvent::new(
            EventContext::new(FILE_UPLOADED_EVENT_TYPE, "tests")
                .with_extension(BUCKET_ID_ATTR, "b1")
                .with_extension(OBJECT_ID_ATTR, "o1")
                .with_extension(EXPLICIT_CONTENT_ATTR, "true"),
        );

        assert_eq!(
            extractor.process(&event).await.unwrap(),
            ExtractionOutcome::NoText
        );
    }

    #[tokio::test]
    async fn test_empty_object_id_is_rejected() {
        let mut annotator = MockAnnotator::new();
        annotator.expect_detect_text().never();
        let store = Arc::new(MemoryStore::new());

        let extractor = TextExtractor::new(Arc::new(annotator), store, 10);
        let event = CloudEvent::new(EventContext::new(FILE_UPLOADED_EVENT_TYPE, "tests"))
            .with_data(
                "application/json",
                r#"{"bucketid": "b1", "objectid": "", "explicitcontent": false}"#,
            );

        assert!(matches!(
            extractor.process(&event).await,
            Err(HandlerError::Validation(ValidationError::MalformedPayload(_)))
        ));
    }
}
