//! Error taxonomy shared by every pipeline stage.
//!
//! Validation failures reject the event before any collaborator is called and
//! map to `400 Bad Request`. Collaborator failures map to
//! `500 Internal Server Error`. A failed delete after a successful copy is the
//! one partial-failure state: the object then exists in both buckets.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Errors raised while validating and decoding an inbound event
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid event type {actual}. Supported event type: {expected}")]
    InvalidEventType { actual: String, expected: String },

    #[error("event has no context")]
    MissingContext,

    #[error("malformed event envelope: {0}")]
    MalformedEnvelope(String),

    #[error("malformed event payload: {0}")]
    MalformedPayload(String),

    #[error("missing extension attribute {0}")]
    MissingAttribute(String),

    #[error("extension attribute {key} must be a {expected}, got {actual}")]
    WrongAttributeType {
        key: String,
        expected: &'static str,
        actual: &'static str,
    },
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::InvalidEventType { .. } => "INVALID_EVENT_TYPE",
            ValidationError::MissingContext => "MISSING_CONTEXT",
            ValidationError::MalformedEnvelope(_) => "MALFORMED_ENVELOPE",
            ValidationError::MalformedPayload(_) => "MALFORMED_PAYLOAD",
            ValidationError::MissingAttribute(_) => "MISSING_ATTRIBUTE",
            ValidationError::WrongAttributeType { .. } => "WRONG_ATTRIBUTE_TYPE",
        }
    }
}

/// Errors a stage handler reports back to the transport runtime
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("classification unavailable: {0}")]
    ClassificationUnavailable(String),

    #[error("text extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("bucket {bucket} doesn't exist: {reason}")]
    SourceBucketNotFound { bucket: String, reason: String },

    #[error("quarantine bucket {bucket} doesn't exist: {reason}")]
    DestinationBucketNotFound { bucket: String, reason: String },

    #[error("failed to copy {object} from {source_bucket} to {destination_bucket}: {reason}")]
    CopyFailed {
        source_bucket: String,
        destination_bucket: String,
        object: String,
        reason: String,
    },

    #[error(
        "copied {object} to {destination_bucket} but failed to delete it from {source_bucket}; \
         object now exists in both buckets: {reason}"
    )]
    DeleteFailed {
        source_bucket: String,
        destination_bucket: String,
        object: String,
        reason: String,
    },

    #[error("failed to write {object} to bucket {bucket}: {reason}")]
    WriteFailed {
        bucket: String,
        object: String,
        reason: String,
    },

    #[error("failed to encode derived event: {0}")]
    EmitFailed(String),
}

impl HandlerError {
    /// Status class reported to the transport runtime
    pub fn status(&self) -> StatusCode {
        match self {
            HandlerError::Validation(_) => StatusCode::BAD_REQUEST,
            HandlerError::ClassificationUnavailable(_)
            | HandlerError::ExtractionFailed(_)
            | HandlerError::SourceBucketNotFound { .. }
            | HandlerError::DestinationBucketNotFound { .. }
            | HandlerError::CopyFailed { .. }
            | HandlerError::DeleteFailed { .. }
            | HandlerError::WriteFailed { .. }
            | HandlerError::EmitFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for error responses
    pub fn code(&self) -> &'static str {
        match self {
            HandlerError::Validation(e) => e.code(),
            HandlerError::ClassificationUnavailable(_) => "CLASSIFICATION_UNAVAILABLE",
            HandlerError::ExtractionFailed(_) => "EXTRACTION_FAILED",
            HandlerError::SourceBucketNotFound { .. } => "SOURCE_BUCKET_NOT_FOUND",
            HandlerError::DestinationBucketNotFound { .. } => "DESTINATION_BUCKET_NOT_FOUND",
            HandlerError::CopyFailed { .. } => "COPY_FAILED",
            HandlerError::DeleteFailed { .. } => "PARTIAL_FAILURE",
            HandlerError::WriteFailed { .. } => "WRITE_FAILED",
            HandlerError::EmitFailed(_) => "EMIT_FAILED",
        }
    }

    /// True when a side effect was applied before the failure
    pub fn is_partial_failure(&self) -> bool {
        matches!(self, HandlerError::DeleteFailed { .. })
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        (
            self.status(),
            Json(ErrorResponse {
                error: self.to_string(),
                code: self.code().to_string(),
            }),
        )
            .into_response()
    }
}

impl IntoResponse for ValidationError {
    fn into_response(self) -> Response {
        HandlerError::from(self).into_response()
    }
}
