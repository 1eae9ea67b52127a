use anyhow::Context;
use imgguard_pipeline::{telemetry, transport, S3ObjectStore};
use imgguard_quarantine::{QuarantineConfig, QuarantineHandler, QuarantineMover};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = QuarantineConfig::load().context("Failed to load configuration")?;

    // Initialize logging and metrics
    telemetry::init(&config.service)?;

    // The quarantine bucket is required
    config.validate().context("Invalid configuration")?;

    info!(
        service = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        quarantine_bucket = %config.quarantine.bucket_id,
        policy = ?config.quarantine.policy,
        "Starting quarantine handler"
    );

    let store = Arc::new(
        S3ObjectStore::new(&config.storage)
            .await
            .context("Failed to initialize object store")?,
    );

    let mover = QuarantineMover::new(store, config.quarantine.bucket_id.clone());
    let handler = Arc::new(QuarantineHandler::new(mover, config.quarantine.policy));

    transport::serve(handler, &config.http).await
}
