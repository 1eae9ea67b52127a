//! imgguard Pipeline - event contract for the image moderation pipeline
//!
//! This library provides the pieces shared by the three pipeline stages:
//!
//! - CloudEvents envelope with typed extension lookups
//! - `custom.fileuploaded` schema and the upload-finalize notification
//! - HTTP binding that feeds events to a stage handler
//! - Image annotation and object storage clients
//!
//! # Example
//!
//! ```rust,no_run
//! use imgguard_pipeline::prelude::*;
//! use std::sync::Arc;
//!
//! struct Logger;
//!
//! #[async_trait]
//! impl EventHandler for Logger {
//!     fn name(&self) -> &'static str {
//!         "logger"
//!     }
//!
//!     async fn handle(&self, event: CloudEvent) -> Result<Option<CloudEvent>, HandlerError> {
//!         let upload = FileUploaded::from_event(&event)?;
//!         tracing::info!(object = %upload.object_ref(), "Received upload");
//!         Ok(None)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     serve(Arc::new(Logger), &HttpConfig::default()).await
//! }
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod extract;
pub mod schema;
pub mod storage;
pub mod telemetry;
pub mod transport;
pub mod vision;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-export main types
pub use config::{ConfigError, HttpConfig, ServiceConfig, StorageConfig, VisionConfig};
pub use error::{ErrorResponse, HandlerError, ValidationError};
pub use event::{CloudEvent, EventContext, ExtensionValue, Lookup};
pub use extract::{expect_type, LocatorSource};
pub use schema::{EventEncoding, FileUploaded, ObjectRef, StorageObject};
pub use storage::{ObjectStore, S3ObjectStore, StorageError};
pub use transport::{create_router, serve, EventHandler};
pub use vision::{
    Category, GoogleVisionClient, ImageAnnotator, Likelihood, LikelihoodVector, TextAnnotation,
    VisionError,
};

pub use async_trait::async_trait;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::HttpConfig;
    pub use crate::error::{HandlerError, ValidationError};
    pub use crate::event::{CloudEvent, EventContext};
    pub use crate::extract::expect_type;
    pub use crate::schema::{FileUploaded, ObjectRef};
    pub use crate::transport::{serve, EventHandler};
    pub use async_trait::async_trait;
}
