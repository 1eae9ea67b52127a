use imgguard_pipeline::config::{layered_source, ConfigError};
use imgguard_pipeline::{HttpConfig, ServiceConfig, StorageConfig, VisionConfig};
use serde::Deserialize;

/// Main configuration for the text extractor service
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TextExtractorConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub vision: VisionConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub extractor: ExtractorSettings,
}

/// Text detection settings
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractorSettings {
    /// Upper bound on annotations requested per image
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

fn default_max_results() -> u32 {
    10
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
        }
    }
}

impl TextExtractorConfig {
    /// Load configuration from files and environment.
    ///
    /// TEXT_EXTRACTOR__EXTRACTOR__MAX_RESULTS -> extractor.max_results
    pub fn load() -> Result<Self, ConfigError> {
        let config = layered_source("text-extractor", "TEXT_EXTRACTOR")?.build()?;
        Ok(config.try_deserialize()?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.extractor.max_results == 0 {
            return Err(ConfigError::InvalidValue {
                key: "extractor.max_results".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        self.vision.validate()?;
        self.storage.validate()
    }
}
