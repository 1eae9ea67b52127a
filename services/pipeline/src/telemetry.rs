//! Logging and metrics setup shared by the service binaries.

use crate::config::ServiceConfig;
use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(config: &ServiceConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("Invalid log level")?;

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if config.log_format == "json" {
        subscriber
            .with(fmt::layer().json())
            .try_init()
            .context("Failed to install tracing subscriber")?;
    } else {
        subscriber
            .with(fmt::layer().pretty())
            .try_init()
            .context("Failed to install tracing subscriber")?;
    }

    Ok(())
}

/// Initialize Prometheus metrics exporter
pub fn init_metrics(port: u16) -> Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Install logging, then the metrics exporter when a port is configured
pub fn init(config: &ServiceConfig) -> Result<()> {
    init_tracing(config)?;

    if let Some(port) = config.metrics_port {
        init_metrics(port)?;
    }

    Ok(())
}
