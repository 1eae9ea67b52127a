//! Quarantine handler for the imgguard pipeline
//!
//! Consumes `custom.fileuploaded` events and moves flagged objects from their
//! source bucket into the quarantine bucket by copy, then delete.

pub mod config;
pub mod handler;
pub mod mover;

pub use config::{QuarantineConfig, QuarantinePolicy, QuarantineSettings};
pub use handler::QuarantineHandler;
pub use mover::{QuarantineMover, QuarantineOutcome};
