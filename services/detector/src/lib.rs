//! Explicit content detector for the imgguard pipeline
//!
//! Consumes `google.storage.object.finalize` notifications, rates the uploaded
//! image with safe search and answers with a `custom.fileuploaded` event that
//! carries the verdict.
//!
//! # Architecture
//!
//! ```text
//! finalize event -> LocatorSource -> ContentClassifier -> FileUploaded -> transport runtime
//! ```

pub mod classifier;
pub mod config;
pub mod detector;

pub use classifier::{ContentClassifier, Verdict, EXPLICIT_THRESHOLD};
pub use config::{DetectionConfig, DetectorConfig};
pub use detector::Detector;
