//! Text extractor for the imgguard pipeline
//!
//! Consumes `custom.fileuploaded` events, runs text detection on the image
//! and writes the detected text to `{object}.txt` in the same bucket.

pub mod config;
pub mod extractor;

pub use config::{ExtractorSettings, TextExtractorConfig};
pub use extractor::{ExtractionOutcome, TextExtractor, TEXT_CONTENT_TYPE};
