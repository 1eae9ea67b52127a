//! Configuration management for the detector service.
//!
//! Loaded from `config/detector`, `/etc/imgguard/detector` and
//! `DETECTOR__SECTION__KEY` environment variables (e.g. `DETECTOR__VISION__API_KEY`).

use imgguard_pipeline::config::{layered_source, ConfigError};
use imgguard_pipeline::{EventEncoding, HttpConfig, LocatorSource, ServiceConfig, VisionConfig};
use serde::Deserialize;

/// Main configuration for the detector service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetectorConfig {
    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub http: HttpConfig,

    /// Image annotation API
    #[serde(default)]
    pub vision: VisionConfig,

    #[serde(default)]
    pub detector: DetectionConfig,
}

/// Detection behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    /// Where upload notifications carry the object locator
    #[serde(default)]
    pub locator: LocatorSource,

    /// Encoding of the emitted `custom.fileuploaded` event
    #[serde(default)]
    pub emit_encoding: EventEncoding,

    /// Source attribute of emitted events
    #[serde(default = "default_source")]
    pub source: String,
}

fn default_source() -> String {
    "custom.explicit-content-detector".to_string()
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            locator: LocatorSource::default(),
            emit_encoding: EventEncoding::default(),
            source: default_source(),
        }
    }
}

impl DetectorConfig {
    /// Load configuration from files and environment.
    pub fn load() -> Result<Self, ConfigError> {
        let config = layered_source("detector", "DETECTOR")?.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.vision.validate()?;

        if self.detector.source.trim().is_empty() {
            return Err(ConfigError::MissingRequired("detector.source".to_string()));
        }

        Ok(())
    }
}
