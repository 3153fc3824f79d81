//! Image classifier
//!
//! Adapter for the external vision-classification service. The structured
//! response additionally carries OCR-extracted text; the pipeline re-runs
//! that text through the text layers and merges the verdicts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use trustline_core::{ClassifierConfig, Error, ImageSurface, Result};

use crate::semantic::{ClassifierVerdict, RawVerdict, CLASSIFY_INSTRUCTION};

/// Reference to an image to classify
#[derive(Debug, Clone)]
pub enum ImageRef {
    /// Publicly fetchable URL (already persisted media)
    Url(String),
    /// Raw bytes (upload path, before the media store assigns a URL)
    Bytes(Vec<u8>),
}

/// Verdict for an image, plus any text the service extracted from it
#[derive(Debug, Clone)]
pub struct ImageVerdict {
    /// The visual classification verdict
    pub verdict: ClassifierVerdict,

    /// OCR-extracted text, when the image contains any
    pub detected_text: Option<String>,
}

/// Raw wire shape for the vision service response
#[derive(Debug, Deserialize)]
struct RawImageVerdict {
    #[serde(flatten)]
    verdict: RawVerdict,

    #[serde(default)]
    detected_text: Option<String>,
}

/// Trait for the image classification seam
#[async_trait]
pub trait ImageClassifier: Send + Sync {
    /// Classify the given image
    async fn classify(&self, image: &ImageRef, surface: ImageSurface) -> Result<ImageVerdict>;

    /// Get the classifier name (for logging)
    fn name(&self) -> &str;
}

/// Production classifier calling the external vision service
pub struct HttpImageClassifier {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct ImageClassifyBody<'a> {
    model: &'a str,
    instruction: &'a str,
    surface: &'a str,
    image_url: &'a str,
}

impl HttpImageClassifier {
    /// Create a classifier from service configuration
    pub fn new(config: &ClassifierConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::classifier(format!("failed to build http client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.vision_model.clone(),
            timeout: config.timeout(),
        })
    }

    async fn call(&self, image: &ImageRef, surface: ImageSurface) -> Result<ImageVerdict> {
        let mut req = match image {
            ImageRef::Url(url) => {
                let body = ImageClassifyBody {
                    model: &self.model,
                    instruction: CLASSIFY_INSTRUCTION,
                    surface: surface.as_str(),
                    image_url: url,
                };
                self.client
                    .post(format!("{}/v1/classify/image", self.endpoint))
                    .json(&body)
            }
            ImageRef::Bytes(bytes) => self
                .client
                .post(format!("{}/v1/classify/image/raw", self.endpoint))
                .query(&[("model", self.model.as_str()), ("surface", surface.as_str())])
                .header("content-type", "application/octet-stream")
                .body(bytes.clone()),
        };

        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req
            .send()
            .await
            .map_err(|e| Error::classifier(format!("image classification failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::classifier(format!(
                "vision service returned {}",
                response.status()
            )));
        }

        let raw: RawImageVerdict = response
            .json()
            .await
            .map_err(|e| Error::classifier(format!("unparsable vision response: {}", e)))?;

        Ok(ImageVerdict {
            verdict: raw.verdict.into(),
            detected_text: raw.detected_text.filter(|t| !t.trim().is_empty()),
        })
    }
}

#[async_trait]
impl ImageClassifier for HttpImageClassifier {
    async fn classify(&self, image: &ImageRef, surface: ImageSurface) -> Result<ImageVerdict> {
        match tokio::time::timeout(self.timeout, self.call(image, surface)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout),
        }
    }

    fn name(&self) -> &str {
        "vision_http"
    }
}
