//! Semantic classifier (Layer 2)
//!
//! Adapter for the external text-classification service. The adapter owns
//! the request shape, the hard timeout, and parsing the structured verdict;
//! it reports every failure as an error so the pipeline can fail open and
//! log the outage.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use trustline_core::{Category, ClassifierConfig, Error, Result, Severity, Surface, Verdict};

/// Fixed instruction describing the banned categories to the service
pub const CLASSIFY_INSTRUCTION: &str = "You moderate content written on a social platform for \
children. Flag: profanity, bullying or harassment, violence, sexual content, personal-data \
disclosure, dangerous meeting requests, attempts to move contact off the platform, and spam. \
Respond only with JSON: {\"allowed\": bool, \"categories\": [string], \"severity\": \
\"low\"|\"medium\"|\"high\", \"reason\": string}.";

/// One text classification request
#[derive(Debug, Clone)]
pub struct TextClassifyRequest {
    /// The raw text to classify
    pub text: String,

    /// Surface the text was written on
    pub surface: Surface,

    /// Trailing conversation context, oldest first (chat surface only)
    pub context: Vec<String>,
}

impl TextClassifyRequest {
    /// Create a request without conversation context
    pub fn new(text: impl Into<String>, surface: Surface) -> Self {
        Self {
            text: text.into(),
            surface,
            context: Vec::new(),
        }
    }

    /// Attach trailing conversation context
    pub fn with_context(mut self, context: Vec<String>) -> Self {
        self.context = context;
        self
    }
}

/// Validated verdict parsed from the external service
#[derive(Debug, Clone)]
pub struct ClassifierVerdict {
    /// Whether the content is allowed
    pub allowed: bool,

    /// Recognized flagged categories
    pub categories: Vec<Category>,

    /// Severity; defaults to medium on a block that omitted it
    pub severity: Severity,

    /// Reason string from the service
    pub reason: String,
}

impl ClassifierVerdict {
    /// Convert into a pipeline verdict
    pub fn into_verdict(self) -> Verdict {
        Verdict {
            allowed: self.allowed,
            categories: self.categories,
            severity: self.severity,
            reason: self.reason,
            fallback: false,
        }
    }
}

/// Raw wire shape with explicit defaults; anything that does not parse
/// into this is treated as a classifier failure upstream.
#[derive(Debug, Deserialize)]
pub(crate) struct RawVerdict {
    pub allowed: bool,

    #[serde(default)]
    pub categories: Vec<String>,

    #[serde(default)]
    pub severity: Option<String>,

    #[serde(default)]
    pub reason: String,
}

impl From<RawVerdict> for ClassifierVerdict {
    fn from(raw: RawVerdict) -> Self {
        let categories: Vec<Category> = raw
            .categories
            .iter()
            .filter_map(|label| {
                let parsed = Category::parse(label);
                if parsed.is_none() {
                    debug!(label = %label, "skipping unknown category label from classifier");
                }
                parsed
            })
            .collect();

        // Missing or unrecognized severity takes an explicit default.
        let severity = raw
            .severity
            .as_deref()
            .and_then(Severity::parse)
            .unwrap_or(if raw.allowed {
                Severity::None
            } else {
                Severity::Medium
            });

        Self {
            allowed: raw.allowed,
            categories,
            severity,
            reason: raw.reason,
        }
    }
}

/// Trait for the semantic classification seam
#[async_trait]
pub trait TextClassifier: Send + Sync {
    /// Classify the given text with its conversation context
    async fn classify(&self, request: &TextClassifyRequest) -> Result<ClassifierVerdict>;

    /// Get the classifier name (for logging)
    fn name(&self) -> &str;
}

/// Production classifier calling the external classification service
pub struct HttpTextClassifier {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct TextClassifyBody<'a> {
    model: &'a str,
    instruction: &'a str,
    surface: &'a str,
    text: &'a str,
    context: &'a [String],
}

impl HttpTextClassifier {
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
            model: config.text_model.clone(),
            timeout: config.timeout(),
        })
    }

    async fn call(&self, request: &TextClassifyRequest) -> Result<ClassifierVerdict> {
        let url = format!("{}/v1/classify/text", self.endpoint);
        let body = TextClassifyBody {
            model: &self.model,
            instruction: CLASSIFY_INSTRUCTION,
            surface: request.surface.as_str(),
            text: &request.text,
            context: &request.context,
        };

        let mut req = self.client.post(&url).json(&body);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req
            .send()
            .await
            .map_err(|e| Error::classifier(format!("classification request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::classifier(format!(
                "classification service returned {}",
                response.status()
            )));
        }

        let raw: RawVerdict = response
            .json()
            .await
            .map_err(|e| Error::classifier(format!("unparsable classifier response: {}", e)))?;

        Ok(raw.into())
    }
}

#[async_trait]
impl TextClassifier for HttpTextClassifier {
    async fn classify(&self, request: &TextClassifyRequest) -> Result<ClassifierVerdict> {
        // The reqwest client timeout covers the transfer; this guard holds
        // even if the service dribbles bytes forever.
        match tokio::time::timeout(self.timeout, self.call(request)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout),
        }
    }

    fn name(&self) -> &str {
        "semantic_http"
    }
}
