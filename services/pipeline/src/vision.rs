//! Image annotation client.
//!
//! Wraps the `images:annotate` REST endpoint of the Cloud Vision API for the
//! two capabilities the pipeline needs: safe-search likelihoods and text
//! detection. Images are referenced by their `gs://` locator, never uploaded.

use crate::config::VisionConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use thiserror::Error;
use tracing::{debug, instrument};

/// Errors returned by the annotation service
#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Failed to create HTTP client: {0}")]
    Client(String),

    #[error("Annotation request failed: {0}")]
    Request(String),

    #[error("Annotation request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Annotation API error {code:?}: {message}")]
    Api { code: Option<i32>, message: String },

    #[error("Failed to parse annotation response: {0}")]
    Decode(String),

    #[error("Annotation response has no {0}")]
    MissingAnnotation(&'static str),
}

/// Ordinal likelihood rating, ordered by increasing certainty
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Likelihood {
    #[default]
    Unknown,
    VeryUnlikely,
    Unlikely,
    Possible,
    Likely,
    VeryLikely,
}

/// Content-safety category rated by safe search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Adult,
    Medical,
    Racy,
    Spoof,
    Violence,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Adult => "adult",
            Category::Medical => "medical",
            Category::Racy => "racy",
            Category::Spoof => "spoof",
            Category::Violence => "violence",
        }
    }
}

/// Safe-search ratings for one image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LikelihoodVector {
    #[serde(default)]
    pub adult: Likelihood,
    #[serde(default)]
    pub medical: Likelihood,
    #[serde(default)]
    pub racy: Likelihood,
    #[serde(default)]
    pub spoof: Likelihood,
    #[serde(default)]
    pub violence: Likelihood,
}

impl LikelihoodVector {
    /// Every category with its rating
    pub fn categories(&self) -> [(Category, Likelihood); 5] {
        [
            (Category::Adult, self.adult),
            (Category::Medical, self.medical),
            (Category::Racy, self.racy),
            (Category::Spoof, self.spoof),
            (Category::Violence, self.violence),
        ]
    }
}

/// Detected text region. The first annotation holds the full text.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TextAnnotation {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub locale: Option<String>,
}

/// Image annotation capabilities used by the pipeline
#[async_trait]
pub trait ImageAnnotator: Send + Sync {
    /// Safe-search likelihoods for the image at `image_uri`
    async fn safe_search(&self, image_uri: &str) -> Result<LikelihoodVector, VisionError>;

    /// Text annotations for the image at `image_uri`, at most `max_results`
    async fn detect_text(
        &self,
        image_uri: &str,
        max_results: u32,
    ) -> Result<Vec<TextAnnotation>, VisionError>;
}

#[derive(Debug, Deserialize)]
struct BatchAnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateImageResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateImageResponse {
    #[serde(default)]
    safe_search_annotation: Option<LikelihoodVector>,
    #[serde(default)]
    text_annotations: Vec<TextAnnotation>,
    #[serde(default)]
    error: Option<ApiStatus>,
}

#[derive(Debug, Deserialize)]
struct ApiStatus {
    code: Option<i32>,
    #[serde(default)]
    message: String,
}

/// Cloud Vision REST client.
///
/// Authenticates with an API key, a bearer access token, or both. Vision
/// fetches `gs://` images with the caller's identity, so objects in private
/// buckets need `access_token`; an API key alone only reaches public objects.
/// The token is not refreshed by the client.
pub struct GoogleVisionClient {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    access_token: Option<String>,
}

impl Debug for GoogleVisionClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("GoogleVisionClient")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl GoogleVisionClient {
    pub fn new(config: &VisionConfig) -> Result<Self, VisionError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| VisionError::Client(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            access_token: config.access_token.clone(),
        })
    }

    /// Attach the configured credentials to `request`
    fn authorize(&self, mut request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(ref key) = self.api_key {
            request = request.query(&[("key", key)]);
        }
        if let Some(ref token) = self.access_token {
            request = request.bearer_auth(token);
        }
        request
    }

    /// Run a single-feature annotation request for one image
    async fn annotate(
        &self,
        image_uri: &str,
        feature: &str,
        max_results: Option<u32>,
    ) -> Result<AnnotateImageResponse, VisionError> {
        let url = format!("{}/v1/images:annotate", self.endpoint);

        let mut feature_request = json!({ "type": feature });
        if let Some(max) = max_results {
            feature_request["maxResults"] = json!(max);
        }

        let request_body = json!({
            "requests": [{
                "image": { "source": { "imageUri": image_uri } },
                "features": [feature_request]
            }]
        });

        let response = self
            .authorize(self.http_client.post(&url).json(&request_body))
            .send()
            .await
            .map_err(|e| VisionError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(VisionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let batch: BatchAnnotateResponse = response
            .json()
            .await
            .map_err(|e| VisionError::Decode(e.to_string()))?;

        let image_response = batch
            .responses
            .into_iter()
            .next()
            .ok_or(VisionError::MissingAnnotation("image response"))?;

        if let Some(error) = image_response.error {
            return Err(VisionError::Api {
                code: error.code,
                message: error.message,
            });
        }

        Ok(image_response)
    }
}

#[async_trait]
impl ImageAnnotator for GoogleVisionClient {
    #[instrument(skip(self))]
    async fn safe_search(&self, image_uri: &str) -> Result<LikelihoodVector, VisionError> {
        let response = self
            .annotate(image_uri, "SAFE_SEARCH_DETECTION", None)
            .await?;

        let ratings = response
            .safe_search_annotation
            .ok_or(VisionError::MissingAnnotation("safe search annotation"))?;

        debug!(ratings = ?ratings, "Safe search completed");
        Ok(ratings)
    }

    #[instrument(skip(self))]
    async fn detect_text(
        &self,
        image_uri: &str,
        max_results: u32,
    ) -> Result<Vec<TextAnnotation>, VisionError> {
        let response = self
            .annotate(image_uri, "TEXT_DETECTION", Some(max_results))
            .await?;

        debug!(
            annotations = response.text_annotations.len(),
            "Text detection completed"
        );
        Ok(response.text_annotations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_likelihood_order() {
        assert!(Likelihood::Unknown < Likelihood::VeryUnlikely);
        assert!(Likelihood::VeryUnlikely < Likelihood::Unlikely);
        assert!(Likelihood::Unlikely < Likelihood::Possible);
        assert!(Likelihood::Possible < Likelihood::Likely);
        assert!(Likelihood::Likely < Likelihood::VeryLikely);
    }

    #[test]
    fn test_parse_safe_search_response() {
        let body = r#"{
            "responses": [{
                "safeSearchAnnotation": {
                    "adult": "VERY_UNLIKELY",
                    "spoof": "UNLIKELY",
                    "medical": "POSSIBLE",
                    "violence": "LIKELY",
                    "racy": "VERY_LIKELY",
                    "adultConfidence": 0.1
                }
            }]
        }"#;

        let batch: BatchAnnotateResponse = serde_json::from_str(body).unwrap();
        let ratings = batch.responses[0].safe_search_annotation.unwrap();

        assert_eq!(ratings.adult, Likelihood::VeryUnlikely);
        assert_eq!(ratings.medical, Likelihood::Possible);
        assert_eq!(ratings.violence, Likelihood::Likely);
        assert_eq!(ratings.racy, Likelihood::VeryLikely);
    }

    #[test]
    fn test_missing_category_defaults_to_unknown() {
        let ratings: LikelihoodVector = serde_json::from_str(r#"{"adult": "LIKELY"}"#).unwrap();

        assert_eq!(ratings.adult, Likelihood::Likely);
        assert_eq!(ratings.spoof, Likelihood::Unknown);
    }

    #[test]
    fn test_parse_text_response() {
        let body = r#"{
            "responses": [{
                "textAnnotations": [
                    {"locale": "en", "description": "Hello\nWorld\n"},
                    {"description": "Hello"},
                    {"description": "World"}
                ]
            }]
        }"#;

        let batch: BatchAnnotateResponse = serde_json::from_str(body).unwrap();
        let annotations = &batch.responses[0].text_annotations;

        assert_eq!(annotations.len(), 3);
        assert_eq!(annotations[0].description, "Hello\nWorld\n");
        assert_eq!(annotations[0].locale.as_deref(), Some("en"));
    }

    #[test]
    fn test_parse_error_response() {
        let body = r#"{"responses": [{"error": {"code": 7, "message": "permission denied"}}]}"#;

        let batch: BatchAnnotateResponse = serde_json::from_str(body).unwrap();
        let error = batch.responses[0].error.as_ref().unwrap();

        assert_eq!(error.code, Some(7));
        assert_eq!(error.message, "permission denied");
    }

    #[test]
    fn test_client_trims_endpoint() {
        let config = VisionConfig {
            endpoint: "http://localhost:9000/".to_string(),
            ..Default::default()
        };

        let client = GoogleVisionClient::new(&config).unwrap();
        assert_eq!(client.endpoint, "http://localhost:9000");
    }

    #[test]
    fn test_credentials_are_attached() {
        let config = VisionConfig {
            api_key: Some("k1".to_string()),
            access_token: Some("t1".to_string()),
            ..Default::default()
        };
        let client = GoogleVisionClient::new(&config).unwrap();

        let request = client
            .authorize(client.http_client.post("http://localhost/v1/images:annotate"))
            .build()
            .unwrap();

        assert_eq!(request.url().query(), Some("key=k1"));
        assert_eq!(
            request.headers().get(reqwest::header::AUTHORIZATION).unwrap(),
            "Bearer t1"
        );
    }

    #[test]
    fn test_no_credentials_by_default() {
        let client = GoogleVisionClient::new(&VisionConfig::default()).unwrap();

        let request = client
            .authorize(client.http_client.post("http://localhost/v1/images:annotate"))
            .build()
            .unwrap();

        assert!(request.url().query().is_none());
        assert!(request.headers().get(reqwest::header::AUTHORIZATION).is_none());
    }

    #[test]
    fn test_categories_cover_all_five() {
        let ratings = LikelihoodVector::default();
        let names: Vec<_> = ratings.categories().iter().map(|(c, _)| c.as_str()).collect();

        assert_eq!(names, vec!["adult", "medical", "racy", "spoof", "violence"]);
    }
}
