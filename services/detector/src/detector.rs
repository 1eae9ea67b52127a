//! Detector stage: upload-finalize notification in, `custom.fileuploaded` out.

use crate::classifier::{ContentClassifier, Verdict};
use crate::config::DetectionConfig;
use imgguard_pipeline::schema::{FILE_UPLOADED_EVENT_TYPE, FINALIZE_EVENT_TYPE};
use imgguard_pipeline::{
    async_trait, expect_type, CloudEvent, EventContext, EventEncoding, EventHandler,
    FileUploaded, HandlerError, ImageAnnotator, LocatorSource, ObjectRef,
};
use metrics::counter;
use std::sync::Arc;
use tracing::info;

/// Explicit content detector
pub struct Detector {
    classifier: ContentClassifier,
    locator: LocatorSource,
    encoding: EventEncoding,
    source: String,
}

impl Detector {
    pub fn new(annotator: Arc<dyn ImageAnnotator>, config: &DetectionConfig) -> Self {
        Self {
            classifier: ContentClassifier::new(annotator),
            locator: config.locator,
            encoding: config.emit_encoding,
            source: config.source.clone(),
        }
    }

    /// Validate, classify and build the derived event.
    ///
    /// Nothing is deduplicated: the same notification delivered twice yields
    /// two events with fresh ids and identical payloads.
    pub async fn detect(&self, event: &CloudEvent) -> Result<CloudEvent, HandlerError> {
        let context = expect_type(event, FINALIZE_EVENT_TYPE)?;
        let object = self.locator.extract(event)?;

        let verdict = self.classifier.classify(&object).await?;

        counter!("imgguard.verdicts", "explicit" => verdict.explicit.to_string()).increment(1);
        info!(
            event_id = %context.id,
            bucket = %object.bucket_id,
            object = %object.object_id,
            verdict = verdict.explicit,
            flagged = ?verdict.flagged,
            "Image classified"
        );

        self.emit(context, object, &verdict)
    }

    fn emit(
        &self,
        inbound: &EventContext,
        object: ObjectRef,
        verdict: &Verdict,
    ) -> Result<CloudEvent, HandlerError> {
        let context = match self.encoding {
            EventEncoding::Body => {
                EventContext::new(FILE_UPLOADED_EVENT_TYPE, self.source.as_str())
            }
            EventEncoding::Extensions => inbound.derive(self.source.as_str()),
        }
        .with_subject(object.object_id.as_str());

        FileUploaded::new(object, verdict.explicit)
            .into_event(context, self.encoding)
            .map_err(|e| HandlerError::EmitFailed(e.to_string()))
    }
}

#[async_trait]
impl EventHandler for Detector {
    fn name(&self) -> &'static str {
        "detector"
    }

    async fn handle(&self, event: CloudEvent) -> Result<Option<CloudEvent>, HandlerError> {
        self.detect(&event).await.map(Some)
    }
}
