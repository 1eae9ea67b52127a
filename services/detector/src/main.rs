//! Explicit content detector service
//!
//! Configuration is loaded from:
//! 1. Configuration files (config/detector, /etc/imgguard/detector)
//! 2. Environment variables (prefixed with DETECTOR__)
//! 3. `PORT` for the listener port
//!
//! See `config.rs` for detailed configuration options.

use anyhow::Context;
use imgguard_detector::{Detector, DetectorConfig};
use imgguard_pipeline::{telemetry, transport, GoogleVisionClient};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = DetectorConfig::load().context("Failed to load configuration")?;

    // Initialize logging and metrics
    telemetry::init(&config.service)?;

    info!(
        service = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        locator = config.detector.locator.as_str(),
        "Starting explicit content detector"
    );

    // Validate configuration
    config.validate().context("Invalid configuration")?;

    let annotator = Arc::new(
        GoogleVisionClient::new(&config.vision).context("Failed to create annotation client")?,
    );
    let detector = Arc::new(Detector::new(annotator, &config.detector));

    transport::serve(detector, &config.http).await
}
