//! Configuration shared by the imgguard services.
//!
//! Each service deserializes its own top-level struct from a layered source:
//! built-in defaults, optional `config/<service>` and `/etc/imgguard/<service>`
//! files, `<PREFIX>__SECTION__KEY` environment variables and finally the
//! hosting runtime's `PORT` variable.

use config::builder::DefaultState;
use config::{ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log format (json or pretty)
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// Prometheus exporter port, disabled when unset
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

/// HTTP listener receiving events from the transport runtime
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
}

/// Image annotation service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct VisionConfig {
    /// Base URL of the annotation API
    #[serde(default = "default_vision_endpoint")]
    pub endpoint: String,
    /// API key appended to requests
    #[serde(default)]
    pub api_key: Option<String>,
    /// OAuth2 access token sent as `Authorization: Bearer`. Needed to read
    /// `gs://` objects in private buckets, which an API key cannot do.
    #[serde(default)]
    pub access_token: Option<String>,
    /// Request timeout in seconds
    #[serde(default = "default_vision_timeout_secs")]
    pub timeout_secs: u64,
}

/// Object storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Custom endpoint URL (Cloud Storage interoperability, MinIO, LocalStack)
    #[serde(default = "default_storage_endpoint")]
    pub endpoint_url: Option<String>,
    /// Region used for request signing
    #[serde(default = "default_region")]
    pub region: String,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
}

fn default_service_name() -> String {
    "imgguard".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_http_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_vision_endpoint() -> String {
    "https://vision.googleapis.com".to_string()
}

fn default_vision_timeout_secs() -> u64 {
    30
}

fn default_storage_endpoint() -> Option<String> {
    Some("https://storage.googleapis.com".to_string())
}

fn default_region() -> String {
    "auto".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            metrics_port: None,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_http_host(),
            port: default_http_port(),
        }
    }
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_vision_endpoint(),
            api_key: None,
            access_token: None,
            timeout_secs: default_vision_timeout_secs(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint_url: default_storage_endpoint(),
            region: default_region(),
            force_path_style: false,
        }
    }
}

impl HttpConfig {
    /// Socket address to bind
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl VisionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.is_empty() {
            return Err(ConfigError::MissingRequired("vision.endpoint".to_string()));
        }
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                key: "vision.endpoint".to_string(),
                message: "must be an http(s) URL".to_string(),
            });
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "vision.timeout_secs".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if matches!(self.access_token, Some(ref token) if token.trim().is_empty()) {
            return Err(ConfigError::InvalidValue {
                key: "vision.access_token".to_string(),
                message: "must not be blank".to_string(),
            });
        }
        Ok(())
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.region.is_empty() {
            return Err(ConfigError::MissingRequired("storage.region".to_string()));
        }
        Ok(())
    }
}

/// Layered configuration source for `service`.
///
/// `DETECTOR__VISION__API_KEY` -> `vision.api_key` for `env_prefix = "DETECTOR"`.
/// Callers may add further overrides before building.
pub fn layered_source(
    service: &str,
    env_prefix: &str,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let builder = config::Config::builder()
        .set_default("service.name", service)?
        .add_source(File::with_name(&format!("config/{}", service)).required(false))
        .add_source(File::with_name(&format!("/etc/imgguard/{}", service)).required(false))
        .add_source(
            Environment::with_prefix(env_prefix)
                .separator("__")
                .try_parsing(true),
        )
        .set_override_option("http.port", std::env::var("PORT").ok())?;

    Ok(builder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let http = HttpConfig::default();
        assert_eq!(http.bind_address(), "0.0.0.0:8080");

        let vision = VisionConfig::default();
        assert_eq!(vision.timeout(), Duration::from_secs(30));
        assert!(vision.validate().is_ok());

        assert!(StorageConfig::default().validate().is_ok());
        assert_eq!(ServiceConfig::default().log_format, "json");
    }

    #[test]
    fn test_invalid_vision_endpoint() {
        let vision = VisionConfig {
            endpoint: "vision.googleapis.com".to_string(),
            ..Default::default()
        };

        assert!(matches!(
            vision.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let vision = VisionConfig {
            timeout_secs: 0,
            ..Default::default()
        };

        assert!(vision.validate().is_err());
    }

    #[test]
    fn test_blank_access_token_rejected() {
        let vision = VisionConfig {
            access_token: Some("  ".to_string()),
            ..Default::default()
        };

        assert!(matches!(
            vision.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "vision.access_token"
        ));
    }
}
