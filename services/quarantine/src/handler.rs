//! Quarantine stage: `custom.fileuploaded` in, object moved, nothing emitted.

use crate::config::QuarantinePolicy;
use crate::mover::{QuarantineMover, QuarantineOutcome};
use imgguard_pipeline::schema::FILE_UPLOADED_EVENT_TYPE;
use imgguard_pipeline::{
    async_trait, expect_type, CloudEvent, EventHandler, FileUploaded, HandlerError,
};
use tracing::info;

/// Quarantine handler
pub struct QuarantineHandler {
    mover: QuarantineMover,
    policy: QuarantinePolicy,
}

impl QuarantineHandler {
    pub fn new(mover: QuarantineMover, policy: QuarantinePolicy) -> Self {
        Self { mover, policy }
    }

    /// Validate the event and move the object when the policy asks for it
    pub async fn process(&self, event: &CloudEvent) -> Result<QuarantineOutcome, HandlerError> {
        let context = expect_type(event, FILE_UPLOADED_EVENT_TYPE)?;
        let upload = FileUploaded::from_event(event)?;

        if self.policy == QuarantinePolicy::FlaggedOnly && !upload.explicit_content {
            info!(
                event_id = %context.id,
                bucket = %upload.bucket_id,
                object = %upload.object_id,
                verdict = false,
                "Object not flagged, nothing to quarantine"
            );
            return Ok(QuarantineOutcome::NotFlagged);
        }

        info!(
            event_id = %context.id,
            bucket = %upload.bucket_id,
            object = %upload.object_id,
            verdict = upload.explicit_content,
            "Quarantining object"
        );

        self.mover.quarantine(&upload.object_ref()).await
    }
}

#[async_trait]
impl EventHandler for QuarantineHandler {
    fn name(&self) -> &'static str {
        "quarantine"
    }

    async fn handle(&self, event: CloudEvent) -> Result<Option<CloudEvent>, HandlerError> {
        self.process(&event).await?;
        Ok(None)
    }

    async fn ready(&self) -> bool {
        self.mover.destination_available().await
    }
}
