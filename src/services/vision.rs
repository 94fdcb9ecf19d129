//! Google Cloud Vision client - SafeSearch and label detection over REST.
//!
//! Each detection is a separate `images:annotate` call carrying one feature.
//! Authentication is either an API key (`x-goog-api-key` header) or a bearer
//! token minted from a service account (see `google_auth`).

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::{Config, VisionCredentials};
use crate::services::google_auth::{AuthError, ServiceAccountAuth};

const API_KEY_HEADER: &str = "x-goog-api-key";

/// SafeSearch likelihood, ordered from `Unknown` (0) to `VeryLikely` (5)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(from = "String")]
pub enum Likelihood {
    #[default]
    Unknown = 0,
    VeryUnlikely = 1,
    Unlikely = 2,
    Possible = 3,
    Likely = 4,
    VeryLikely = 5,
}

impl Likelihood {
    pub fn ordinal(self) -> u8 {
        self as u8
    }
}

impl From<String> for Likelihood {
    fn from(name: String) -> Self {
        match name.as_str() {
            "VERY_UNLIKELY" => Likelihood::VeryUnlikely,
            "UNLIKELY" => Likelihood::Unlikely,
            "POSSIBLE" => Likelihood::Possible,
            "LIKELY" => Likelihood::Likely,
            "VERY_LIKELY" => Likelihood::VeryLikely,
            _ => Likelihood::Unknown,
        }
    }
}

/// SafeSearch annotation. Missing fields are `Unknown`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SafetyScores {
    pub adult: Likelihood,
    pub violence: Likelihood,
    pub racy: Likelihood,
    #[allow(dead_code)] // Returned by SafeSearch but not part of the policy
    pub spoof: Likelihood,
    #[allow(dead_code)]
    pub medical: Likelihood,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LabelAnnotation {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub score: f32,
}

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),
    #[error("Vision API returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("Vision API error {code}: {message}")]
    Api { code: i32, message: String },
    #[error("Vision API returned no responses")]
    EmptyResponse,
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),
}

// Request URLs are dropped so errors never carry endpoint details into logs
impl From<reqwest::Error> for VisionError {
    fn from(e: reqwest::Error) -> Self {
        VisionError::Http(e.without_url())
    }
}

/// The two detections moderation needs
#[async_trait]
pub trait VisionClient: Send + Sync {
    async fn classify_safety(&self, image: &[u8]) -> Result<SafetyScores, VisionError>;

    async fn detect_labels(&self, image: &[u8]) -> Result<Vec<LabelAnnotation>, VisionError>;
}

// ============== REST wire types ==============

#[derive(Serialize)]
struct AnnotateRequest {
    requests: Vec<AnnotateImageRequest>,
}

#[derive(Serialize)]
struct AnnotateImageRequest {
    image: ImageContent,
    features: Vec<Feature>,
}

#[derive(Serialize)]
struct ImageContent {
    content: String,
}

#[derive(Serialize)]
struct Feature {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateImageResponse>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateImageResponse {
    safe_search_annotation: Option<SafetyScores>,
    #[serde(default)]
    label_annotations: Vec<LabelAnnotation>,
    error: Option<RpcStatus>,
}

#[derive(Deserialize)]
struct RpcStatus {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

const SAFE_SEARCH_DETECTION: &str = "SAFE_SEARCH_DETECTION";
const LABEL_DETECTION: &str = "LABEL_DETECTION";

enum VisionAuth {
    ApiKey(String),
    ServiceAccount(ServiceAccountAuth),
}

pub struct GoogleVisionClient {
    http: Client,
    endpoint: String,
    auth: VisionAuth,
}

impl GoogleVisionClient {
    /// Build the client from explicit configuration; reads the service account key if one is configured
    pub async fn from_config(config: &Config) -> Result<Self, VisionError> {
        let path = match &config.vision_credentials {
            VisionCredentials::ApiKey(key) => {
                return Self::with_api_key(&config.vision_endpoint, key, config.vision_timeout);
            }
            VisionCredentials::ServiceAccount(path) => path,
        };

        let http = Client::builder().timeout(config.vision_timeout).build()?;
        let auth = ServiceAccountAuth::from_file(path, http.clone()).await?;
        tracing::info!(credentials = %path.display(), "Vision client using service account");

        Ok(Self {
            http,
            endpoint: config.vision_endpoint.clone(),
            auth: VisionAuth::ServiceAccount(auth),
        })
    }

    pub fn with_api_key(endpoint: &str, api_key: &str, timeout: Duration) -> Result<Self, VisionError> {
        Ok(Self {
            http: Client::builder().timeout(timeout).build()?,
            endpoint: endpoint.to_string(),
            auth: VisionAuth::ApiKey(api_key.to_string()),
        })
    }

    async fn annotate(
        &self,
        image: &[u8],
        feature: &'static str,
    ) -> Result<AnnotateImageResponse, VisionError> {
        let url = format!("{}/v1/images:annotate", self.endpoint.trim_end_matches('/'));
        let body = AnnotateRequest {
            requests: vec![AnnotateImageRequest {
                image: ImageContent {
                    content: base64::engine::general_purpose::STANDARD.encode(image),
                },
                features: vec![Feature { kind: feature }],
            }],
        };

        let request = self.http.post(&url).json(&body);
        let request = match &self.auth {
            VisionAuth::ApiKey(key) => request.header(API_KEY_HEADER, key.as_str()),
            VisionAuth::ServiceAccount(auth) => request.bearer_auth(auth.access_token().await?),
        };

        let resp = request.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(VisionError::Status { status, body });
        }

        let parsed: AnnotateResponse = resp.json().await?;
        let response = parsed
            .responses
            .into_iter()
            .next()
            .ok_or(VisionError::EmptyResponse)?;

        if let Some(status) = response.error {
            return Err(VisionError::Api {
                code: status.code,
                message: status.message,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl VisionClient for GoogleVisionClient {
    async fn classify_safety(&self, image: &[u8]) -> Result<SafetyScores, VisionError> {
        let response = self.annotate(image, SAFE_SEARCH_DETECTION).await?;
        Ok(response.safe_search_annotation.unwrap_or_default())
    }

    async fn detect_labels(&self, image: &[u8]) -> Result<Vec<LabelAnnotation>, VisionError> {
        let response = self.annotate(image, LABEL_DETECTION).await?;
        Ok(response.label_annotations)
    }
}
