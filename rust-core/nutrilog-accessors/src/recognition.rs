// SPDX-License-Identifier: PMPL-1.0-or-later
//! Boundary to the image-recognition service.
//!
//! The service is a black box: image bytes in, a nutrition estimate out.
//! Responses are parsed strictly. A missing, mistyped or negative field is
//! [`RecognitionError::Malformed`]; nothing is defaulted or guessed.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum RecognitionError {
    /// The service answered with a non-success status.
    #[error("recognition service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("recognition transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body is not a complete, well-typed estimate.
    #[error("malformed recognition response: {0}")]
    Malformed(String),

    #[error("invalid recognizer configuration: {0}")]
    Config(String),
}

/// What the service thinks the photo shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NutritionEstimate {
    pub name: String,
    pub calories: f64,
    pub protein_grams: f64,
    pub carb_grams: f64,
    pub fat_grams: f64,
}

impl NutritionEstimate {
    /// Parse and validate a response body.
    pub fn from_json(body: &[u8]) -> Result<Self, RecognitionError> {
        let estimate: NutritionEstimate =
            serde_json::from_slice(body).map_err(|e| RecognitionError::Malformed(e.to_string()))?;

        if estimate.name.trim().is_empty() {
            return Err(RecognitionError::Malformed("empty name".to_string()));
        }
        let fields = [
            ("calories", estimate.calories),
            ("proteinGrams", estimate.protein_grams),
            ("carbGrams", estimate.carb_grams),
            ("fatGrams", estimate.fat_grams),
        ];
        for (field, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(RecognitionError::Malformed(format!(
                    "{field} must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(estimate)
    }
}

/// Anything that can turn a photo into a [`NutritionEstimate`].
#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn classify(&self, image: &[u8]) -> Result<NutritionEstimate, RecognitionError>;
}

/// Where and how to reach the HTTP recognition service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    /// Full URL the image is POSTed to.
    pub endpoint: String,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Sent as `X-API-Key` when set.
    pub api_key: Option<String>,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8080/classify".to_string(),
            timeout_ms: 30_000,
            api_key: None,
        }
    }
}

/// [`Recognizer`] that POSTs the raw image as `application/octet-stream`
/// and expects the estimate back as JSON.
pub struct HttpRecognizer {
    endpoint: Url,
    http: reqwest::Client,
    api_key: Option<String>,
}

impl HttpRecognizer {
    pub fn new(config: &RecognizerConfig) -> Result<Self, RecognitionError> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| RecognitionError::Config(format!("endpoint '{}': {e}", config.endpoint)))?;
        // reqwest ships without a TLS provider; later installs are no-ops.
        let _ = rustls::crypto::ring::default_provider().install_default();
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            endpoint,
            http,
            api_key: config.api_key.clone(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Recognizer for HttpRecognizer {
    async fn classify(&self, image: &[u8]) -> Result<NutritionEstimate, RecognitionError> {
        let mut request = self
            .http
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec());
        if let Some(key) = &self.api_key {
            request = request.header("X-API-Key", key.as_str());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "recognition service rejected image");
            return Err(RecognitionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await?;
        let estimate = NutritionEstimate::from_json(&body)?;
        debug!(name = %estimate.name, calories = estimate.calories, "image recognised");
        Ok(estimate)
    }
}
