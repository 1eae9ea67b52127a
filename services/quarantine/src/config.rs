use imgguard_pipeline::config::{layered_source, ConfigError};
use imgguard_pipeline::{HttpConfig, ServiceConfig, StorageConfig};
use serde::Deserialize;

/// Legacy variable naming the quarantine bucket
pub const QUARANTINE_BUCKET_ENV: &str = "QUARANTINE_BUCKET_ID";

/// Main configuration for the quarantine service
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuarantineConfig {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Event receiver configuration
    #[serde(default)]
    pub http: HttpConfig,
    /// Object storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Quarantine behaviour
    #[serde(default)]
    pub quarantine: QuarantineSettings,
}

/// Which events trigger a move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuarantinePolicy {
    /// Move only events with `explicitcontent = true`
    #[default]
    FlaggedOnly,
    /// Move every event; filtering happens at the broker
    All,
}

/// Quarantine configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuarantineSettings {
    /// Destination bucket for flagged objects
    #[serde(default)]
    pub bucket_id: String,
    #[serde(default)]
    pub policy: QuarantinePolicy,
}

impl QuarantineConfig {
    /// Load configuration from files and environment.
    ///
    /// `QUARANTINE__QUARANTINE__BUCKET_ID` or a config file take precedence
    /// over `QUARANTINE_BUCKET_ID`.
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = layered_source("quarantine", "QUARANTINE")?;

        if let Ok(bucket_id) = std::env::var(QUARANTINE_BUCKET_ENV) {
            builder = builder.set_default("quarantine.bucket_id", bucket_id)?;
        }

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Validate the configuration. The quarantine bucket is required.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.quarantine.bucket_id.trim().is_empty() {
            return Err(ConfigError::MissingRequired(format!(
                "quarantine.bucket_id (or {})",
                QUARANTINE_BUCKET_ENV
            )));
        }

        self.storage.validate()
    }
}
