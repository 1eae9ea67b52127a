use anyhow::Context;
use imgguard_pipeline::{telemetry, transport, GoogleVisionClient, S3ObjectStore};
use imgguard_text_extractor::{TextExtractor, TextExtractorConfig};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = TextExtractorConfig::load().context("Failed to load configuration")?;

    telemetry::init(&config.service)?;
    config.validate().context("Invalid configuration")?;

    info!(
        service = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        max_results = config.extractor.max_results,
        "Starting text extractor"
    );

    let annotator = Arc::new(
        GoogleVisionClient::new(&config.vision).context("Failed to create annotation client")?,
    );
    let store = Arc::new(
        S3ObjectStore::new(&config.storage)
            .await
            .context("Failed to initialize object store")?,
    );

    let extractor = Arc::new(TextExtractor::new(
        annotator,
        store,
        config.extractor.max_results,
    ));

    transport::serve(extractor, &config.http).await
}
