//! Evaluate orchestration
//!
//! One `evaluate` call is a stateless unit of work: suspension gate →
//! normalize → pattern filter → semantic classifier → behavioral detector
//! → ledger. The gate runs before everything so a suspended user neither
//! pays classifier latency nor inflates their own strike count.

use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use trustline_core::{
    Category, ImageSurface, ModerationResult, Result, Severity, Surface, TrustConfig, Verdict,
};

use trustline_classifiers::{
    normalize, ImageClassifier, ImageRef, PatternFilter, TextClassifier, TextClassifyRequest,
};
use trustline_ledger::{ModerationEvent, TrustEngine, TrustStore, UserRef};

use crate::detector::PatternDetector;

/// One text evaluation request
#[derive(Debug, Clone)]
pub struct EvaluateRequest {
    /// The author of the content
    pub user: UserRef,

    /// Raw text as submitted
    pub text: String,

    /// Surface the text was written on
    pub surface: Surface,

    /// Trailing conversation context, oldest first (chat surface)
    pub context: Vec<String>,

    /// Conversation counterpart, when known (chat surface)
    pub target_user_id: Option<String>,
}

impl EvaluateRequest {
    /// Create a request with no context or target
    pub fn new(user: UserRef, text: impl Into<String>, surface: Surface) -> Self {
        Self {
            user,
            text: text.into(),
            surface,
            context: Vec::new(),
            target_user_id: None,
        }
    }

    /// Attach trailing conversation context
    pub fn with_context(mut self, context: Vec<String>) -> Self {
        self.context = context;
        self
    }

    /// Attach the conversation counterpart
    pub fn with_target(mut self, target_user_id: impl Into<String>) -> Self {
        self.target_user_id = Some(target_user_id.into());
        self
    }
}

/// One image evaluation request
#[derive(Debug, Clone)]
pub struct ImageEvaluateRequest {
    /// The uploader
    pub user: UserRef,

    /// The image to classify
    pub image: ImageRef,

    /// Surface the image was submitted from
    pub surface: ImageSurface,

    /// Whether OCR-extracted text should be re-run through the text layers
    pub check_text: bool,
}

/// The content trust pipeline
pub struct TrustPipeline {
    filter: PatternFilter,
    classifier: Arc<dyn TextClassifier>,
    image_classifier: Arc<dyn ImageClassifier>,
    detector: PatternDetector,
    engine: Arc<TrustEngine>,
    store: Arc<dyn TrustStore>,
    config: TrustConfig,
}

impl TrustPipeline {
    /// Assemble the pipeline
    pub fn new(
        classifier: Arc<dyn TextClassifier>,
        image_classifier: Arc<dyn ImageClassifier>,
        store: Arc<dyn TrustStore>,
        engine: Arc<TrustEngine>,
        config: TrustConfig,
    ) -> Result<Self> {
        Ok(Self {
            filter: PatternFilter::new()?,
            classifier,
            image_classifier,
            detector: PatternDetector::new(store.clone(), config.bullying),
            engine,
            store,
            config,
        })
    }

    /// Evaluate one piece of text content.
    ///
    /// Always appends one moderation event, except when the suspension
    /// gate short-circuits.
    pub async fn evaluate(&self, request: EvaluateRequest) -> Result<ModerationResult> {
        let started = Instant::now();
        let now = Utc::now();

        let profile = self.store.profile(&request.user.id).await?;
        if let Some(until) = profile.suspended_until {
            if until > now {
                debug!(user = %request.user.id, "rejecting write from suspended account");
                metrics::counter!("trustline_evaluations_total",
                    "surface" => request.surface.as_str(), "outcome" => "suspended")
                .increment(1);
                return Ok(ModerationResult::suspended(until, now));
            }
        }

        let normalized = normalize(&request.text);
        let mut verdict = match self.filter.check(&normalized) {
            Some(verdict) => {
                metrics::counter!("trustline_layer1_blocks_total").increment(1);
                verdict
            }
            None => self.classify_text(&request.text, request.surface, &request.context).await,
        };

        // Layers 1-2 passed; look backward for a slow-burn abuse pattern.
        if verdict.allowed && request.surface == Surface::Chat {
            if let Some(ref target) = request.target_user_id {
                if self.detector.detect(&request.user.id, target).await? {
                    verdict = Verdict::block(
                        Category::Bullying,
                        Severity::High,
                        "repeated harassment toward the same person",
                    );
                }
            }
        }

        let mut event = ModerationEvent::record(
            &request.user.id,
            request.surface.as_str(),
            &request.text,
            self.config.snippet_chars,
        )
        .with_verdict(&verdict);
        if let Some(ref target) = request.target_user_id {
            event = event.with_target(target);
        }

        let escalation = self.engine.record_verdict(event, &request.user).await?;

        let mut result = ModerationResult::from_verdict(&verdict);
        if let Some(strikes) = escalation.strikes {
            result = result.with_strikes(strikes);
        }
        if let Some(until) = escalation.suspended_until {
            result = result.with_suspension(until);
        }

        metrics::counter!("trustline_evaluations_total",
            "surface" => request.surface.as_str(),
            "outcome" => if result.allowed { "allowed" } else { "blocked" })
        .increment(1);
        metrics::histogram!("trustline_pipeline_latency_us")
            .record(started.elapsed().as_micros() as f64);

        Ok(result)
    }

    /// Evaluate one image.
    ///
    /// OCR-extracted text, when present and `check_text` is set, is re-run
    /// through the text layers and the verdicts are merged: blocked if
    /// either blocks, categories unioned, severity taking the higher.
    pub async fn evaluate_image(&self, request: ImageEvaluateRequest) -> Result<ModerationResult> {
        let started = Instant::now();
        let now = Utc::now();

        let profile = self.store.profile(&request.user.id).await?;
        if let Some(until) = profile.suspended_until {
            if until > now {
                metrics::counter!("trustline_evaluations_total",
                    "surface" => request.surface.as_str(), "outcome" => "suspended")
                .increment(1);
                return Ok(ModerationResult::suspended(until, now));
            }
        }

        let (mut verdict, detected_text) = match self
            .image_classifier
            .classify(&request.image, request.surface)
            .await
        {
            Ok(image_verdict) => (
                image_verdict.verdict.into_verdict(),
                image_verdict.detected_text,
            ),
            Err(e) => {
                warn!(surface = request.surface.as_str(),
                    "image classifier unavailable, failing open: {}", e);
                metrics::counter!("trustline_classifier_fallbacks_total").increment(1);
                (Verdict::fallback_allow("image classifier unavailable"), None)
            }
        };

        if request.check_text {
            if let Some(ref text) = detected_text {
                let text_verdict = match self.filter.check(&normalize(text)) {
                    Some(v) => {
                        metrics::counter!("trustline_layer1_blocks_total").increment(1);
                        v
                    }
                    None => {
                        self.classify_text(text, text_surface(request.surface), &[])
                            .await
                    }
                };
                verdict = verdict.merge(text_verdict);
            }
        }

        let snippet_source = match (&detected_text, &request.image) {
            (Some(text), _) => text.as_str(),
            (None, ImageRef::Url(url)) => url.as_str(),
            (None, ImageRef::Bytes(_)) => "[image bytes]",
        };
        let event = ModerationEvent::record(
            &request.user.id,
            request.surface.as_str(),
            snippet_source,
            self.config.snippet_chars,
        )
        .with_verdict(&verdict);
        let event_id = event.id.clone();

        let escalation = self.engine.record_verdict(event, &request.user).await?;

        // A flagged profile photo additionally goes to the guardian for review.
        if request.surface == ImageSurface::Profile && !verdict.allowed {
            let reason = if verdict.reason.is_empty() {
                "flagged profile image"
            } else {
                verdict.reason.as_str()
            };
            self.engine
                .request_approval(&request.user, reason, &event_id);
        }

        let mut result = ModerationResult::from_verdict(&verdict);
        if let Some(strikes) = escalation.strikes {
            result = result.with_strikes(strikes);
        }
        if let Some(until) = escalation.suspended_until {
            result = result.with_suspension(until);
        }
        if let Some(text) = detected_text {
            result = result.with_detected_text(text);
        }

        metrics::counter!("trustline_evaluations_total",
            "surface" => request.surface.as_str(),
            "outcome" => if result.allowed { "allowed" } else { "blocked" })
        .increment(1);
        metrics::histogram!("trustline_pipeline_latency_us")
            .record(started.elapsed().as_micros() as f64);

        Ok(result)
    }

    /// The trust engine, for administrative surfaces
    pub fn engine(&self) -> &Arc<TrustEngine> {
        &self.engine
    }

    /// The event store, for administrative queries
    pub fn store(&self) -> &Arc<dyn TrustStore> {
        &self.store
    }

    /// Layer 2 with fail-open: any adapter error becomes an allow that is
    /// marked as a fallback and visible in logs and metrics only.
    async fn classify_text(&self, text: &str, surface: Surface, context: &[String]) -> Verdict {
        let window = self.config.context_window;
        let tail = if context.len() > window {
            &context[context.len() - window..]
        } else {
            context
        };

        let request = TextClassifyRequest::new(text, surface).with_context(tail.to_vec());

        match self.classifier.classify(&request).await {
            Ok(verdict) => verdict.into_verdict(),
            Err(e) => {
                warn!(classifier = self.classifier.name(),
                    "classifier unavailable, failing open: {}", e);
                metrics::counter!("trustline_classifier_fallbacks_total").increment(1);
                Verdict::fallback_allow("classifier unavailable")
            }
        }
    }
}

/// Text surface the OCR re-run is attributed to
fn text_surface(surface: ImageSurface) -> Surface {
    match surface {
        ImageSurface::Chat => Surface::Chat,
        _ => Surface::Post,
    }
}
