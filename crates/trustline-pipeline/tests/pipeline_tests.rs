//! End-to-end pipeline tests with mock classifiers
//!
//! The mocks count their invocations so the short-circuit properties are
//! provable: Layer-1 hits and suspended accounts must never reach the
//! external classifier.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use trustline_classifiers::{
    ClassifierVerdict, ImageClassifier, ImageRef, ImageVerdict, TextClassifier,
    TextClassifyRequest,
};
use trustline_core::{
    Category, Error, ImageSurface, Result, Severity, StrikeConfig, Surface, TrustConfig,
};
use trustline_ledger::{
    EventQuery, MemoryTrustStore, NotificationQueue, NotificationType, TrustEngine, TrustStore,
    UserRef,
};
use trustline_pipeline::{
    AsyncCoordinator, ChatMessage, ChatMessageStore, EvaluateRequest, ImageEvaluateRequest,
    MemoryMessageStore, MessageStatus, NewChatMessage, TrustPipeline,
};

#[derive(Clone, Copy)]
enum TextScript {
    Allow,
    Block(Category, Severity),
    Fail,
    Timeout,
}

struct MockTextClassifier {
    script: TextScript,
    calls: AtomicUsize,
}

impl MockTextClassifier {
    fn new(script: TextScript) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextClassifier for MockTextClassifier {
    async fn classify(&self, _request: &TextClassifyRequest) -> Result<ClassifierVerdict> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script {
            TextScript::Allow => Ok(ClassifierVerdict {
                allowed: true,
                categories: Vec::new(),
                severity: Severity::None,
                reason: String::new(),
            }),
            TextScript::Block(category, severity) => Ok(ClassifierVerdict {
                allowed: false,
                categories: vec![category],
                severity,
                reason: "flagged by classifier".to_string(),
            }),
            TextScript::Fail => Err(Error::classifier("service unreachable")),
            TextScript::Timeout => Err(Error::Timeout),
        }
    }

    fn name(&self) -> &str {
        "mock_text"
    }
}

#[derive(Clone)]
enum ImageScript {
    Allow { detected_text: Option<String> },
    Block(Category, Severity),
    Fail,
}

struct MockImageClassifier {
    script: ImageScript,
    calls: AtomicUsize,
}

impl MockImageClassifier {
    fn new(script: ImageScript) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ImageClassifier for MockImageClassifier {
    async fn classify(&self, _image: &ImageRef, _surface: ImageSurface) -> Result<ImageVerdict> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            ImageScript::Allow { detected_text } => Ok(ImageVerdict {
                verdict: ClassifierVerdict {
                    allowed: true,
                    categories: Vec::new(),
                    severity: Severity::None,
                    reason: String::new(),
                },
                detected_text: detected_text.clone(),
            }),
            ImageScript::Block(category, severity) => Ok(ImageVerdict {
                verdict: ClassifierVerdict {
                    allowed: false,
                    categories: vec![*category],
                    severity: *severity,
                    reason: "flagged visual content".to_string(),
                },
                detected_text: None,
            }),
            ImageScript::Fail => Err(Error::classifier("vision service unreachable")),
        }
    }

    fn name(&self) -> &str {
        "mock_vision"
    }
}

struct Harness {
    pipeline: Arc<TrustPipeline>,
    store: Arc<MemoryTrustStore>,
    queue: Arc<NotificationQueue>,
    text: Arc<MockTextClassifier>,
}

fn harness(text_script: TextScript, image_script: ImageScript) -> Harness {
    let store = Arc::new(MemoryTrustStore::new());
    let queue = Arc::new(NotificationQueue::new());
    let engine = Arc::new(TrustEngine::new(
        store.clone(),
        queue.clone(),
        StrikeConfig::default(),
    ));
    let text = Arc::new(MockTextClassifier::new(text_script));
    let image = Arc::new(MockImageClassifier::new(image_script));

    let pipeline = Arc::new(
        TrustPipeline::new(
            text.clone(),
            image,
            store.clone() as Arc<dyn TrustStore>,
            engine,
            TrustConfig::default(),
        )
        .unwrap(),
    );

    Harness {
        pipeline,
        store,
        queue,
        text,
    }
}

fn user() -> UserRef {
    UserRef::new("u123", "dani", "tutor@example.com")
}

#[tokio::test]
async fn layer1_match_never_calls_the_classifier() {
    let h = harness(TextScript::Allow, ImageScript::Allow { detected_text: None });

    let result = h
        .pipeline
        .evaluate(EvaluateRequest::new(user(), "te voy a matar", Surface::Chat))
        .await
        .unwrap();

    assert!(!result.allowed);
    assert_eq!(result.categories, vec![Category::Violence]);
    assert_eq!(result.severity, Severity::High);
    assert_eq!(h.text.calls(), 0);
}

#[tokio::test]
async fn clean_text_reaches_layer2_and_allows() {
    let h = harness(TextScript::Allow, ImageScript::Allow { detected_text: None });

    let result = h
        .pipeline
        .evaluate(EvaluateRequest::new(
            user(),
            "quieres jugar al nuevo nivel?",
            Surface::Chat,
        ))
        .await
        .unwrap();

    assert!(result.allowed);
    assert_eq!(h.text.calls(), 1);

    let events = h.store.events(&EventQuery::new()).await.unwrap();
    assert_eq!(events.len(), 1);
    assert!(events[0].allowed);
    assert!(!events[0].fallback);
}

#[tokio::test]
async fn suspended_account_short_circuits_without_recording() {
    let h = harness(TextScript::Allow, ImageScript::Allow { detected_text: None });

    let now = Utc::now();
    h.store
        .begin_suspension("u123", now + Duration::hours(24), now)
        .await
        .unwrap();

    let result = h
        .pipeline
        .evaluate(EvaluateRequest::new(user(), "hola", Surface::Chat))
        .await
        .unwrap();

    assert!(!result.allowed);
    assert!(result.suspended);
    assert!(result.suspended_until.is_some());
    assert!(result.reason.unwrap().contains("remaining"));

    // No classifier latency, no new event.
    assert_eq!(h.text.calls(), 0);
    let events = h.store.events(&EventQuery::new()).await.unwrap();
    assert!(events.is_empty());
}

#[tokio::test]
async fn third_strike_suspends_and_notifies_exactly_once() {
    let h = harness(TextScript::Allow, ImageScript::Allow { detected_text: None });

    for i in 0..2 {
        let result = h
            .pipeline
            .evaluate(EvaluateRequest::new(user(), "eres un idiota", Surface::Chat))
            .await
            .unwrap();
        assert!(!result.allowed);
        assert!(!result.suspended, "strike {} must not suspend", i + 1);
    }

    let result = h
        .pipeline
        .evaluate(EvaluateRequest::new(user(), "eres un idiota", Surface::Chat))
        .await
        .unwrap();

    assert!(!result.allowed);
    assert!(result.suspended);
    assert_eq!(result.strikes, Some(3));
    let until = result.suspended_until.unwrap();
    assert!(until > Utc::now() + Duration::hours(23));

    let suspensions: Vec<_> = h
        .queue
        .list(None)
        .into_iter()
        .filter(|n| n.kind == NotificationType::Suspension)
        .collect();
    assert_eq!(suspensions.len(), 1);
    assert_eq!(suspensions[0].tutor_email, "tutor@example.com");

    // Further attempts hit the gate and stop inflating the count.
    let result = h
        .pipeline
        .evaluate(EvaluateRequest::new(user(), "eres un idiota", Surface::Chat))
        .await
        .unwrap();
    assert!(result.suspended);

    let events = h.store.events(&EventQuery::new()).await.unwrap();
    assert_eq!(events.len(), 3);
}

#[tokio::test]
async fn classifier_outage_fails_open_with_fallback_marker() {
    let h = harness(TextScript::Fail, ImageScript::Allow { detected_text: None });

    let result = h
        .pipeline
        .evaluate(EvaluateRequest::new(user(), "texto normal", Surface::Post))
        .await
        .unwrap();

    // Fail-open: allowed, and the failure is observable only on the event.
    assert!(result.allowed);
    assert!(!result.suspended);

    let events = h.store.events(&EventQuery::new()).await.unwrap();
    assert_eq!(events.len(), 1);
    assert!(events[0].allowed);
    assert!(events[0].fallback);
}

#[tokio::test]
async fn classifier_timeout_is_treated_like_an_outage() {
    let h = harness(TextScript::Timeout, ImageScript::Allow { detected_text: None });

    let result = h
        .pipeline
        .evaluate(EvaluateRequest::new(user(), "texto normal", Surface::Post))
        .await
        .unwrap();

    assert!(result.allowed);
    let events = h.store.events(&EventQuery::new()).await.unwrap();
    assert!(events[0].fallback);
}

#[tokio::test]
async fn repeated_abuse_pattern_blocks_a_clean_message() {
    let h = harness(TextScript::Allow, ImageScript::Allow { detected_text: None });

    // Three blocked insults toward the same person within the window.
    for _ in 0..3 {
        h.pipeline
            .evaluate(
                EvaluateRequest::new(user(), "eres un idiota", Surface::Chat)
                    .with_target("victim"),
            )
            .await
            .unwrap();
    }
    // The third strike suspended the account; lift so the next message is
    // gated only by the detector.
    h.pipeline.engine().lift("u123").await.unwrap();

    let result = h
        .pipeline
        .evaluate(
            EvaluateRequest::new(user(), "hola, sigues ahi?", Surface::Chat)
                .with_target("victim"),
        )
        .await
        .unwrap();

    assert!(!result.allowed);
    assert_eq!(result.categories, vec![Category::Bullying]);
    assert_eq!(result.severity, Severity::High);
}

#[tokio::test]
async fn ocr_text_is_rerun_and_merged() {
    let h = harness(
        TextScript::Allow,
        ImageScript::Allow {
            detected_text: Some("puta".to_string()),
        },
    );

    let result = h
        .pipeline
        .evaluate_image(ImageEvaluateRequest {
            user: user(),
            image: ImageRef::Url("https://cdn.example.com/sticker.png".to_string()),
            surface: ImageSurface::Sticker,
            check_text: true,
        })
        .await
        .unwrap();

    // Visual verdict allowed, OCR text blocks on profanity; merged blocks.
    assert!(!result.allowed);
    assert!(result.categories.contains(&Category::Profanity));
    assert_eq!(result.detected_text.as_deref(), Some("puta"));

    let events = h.store.events(&EventQuery::new()).await.unwrap();
    assert_eq!(events[0].surface, "image_sticker");
    assert!(!events[0].allowed);
}

#[tokio::test]
async fn ocr_rerun_can_be_disabled() {
    let h = harness(
        TextScript::Allow,
        ImageScript::Allow {
            detected_text: Some("puta".to_string()),
        },
    );

    let result = h
        .pipeline
        .evaluate_image(ImageEvaluateRequest {
            user: user(),
            image: ImageRef::Url("https://cdn.example.com/photo.png".to_string()),
            surface: ImageSurface::Post,
            check_text: false,
        })
        .await
        .unwrap();

    assert!(result.allowed);
}

#[tokio::test]
async fn vision_outage_fails_open() {
    let h = harness(TextScript::Allow, ImageScript::Fail);

    let result = h
        .pipeline
        .evaluate_image(ImageEvaluateRequest {
            user: user(),
            image: ImageRef::Bytes(vec![0xff, 0xd8, 0xff]),
            surface: ImageSurface::Post,
            check_text: true,
        })
        .await
        .unwrap();

    assert!(result.allowed);
    let events = h.store.events(&EventQuery::new()).await.unwrap();
    assert!(events[0].fallback);
}

#[tokio::test]
async fn flagged_profile_image_requests_guardian_approval() {
    let h = harness(
        TextScript::Allow,
        ImageScript::Block(Category::Sexual, Severity::High),
    );

    let result = h
        .pipeline
        .evaluate_image(ImageEvaluateRequest {
            user: user(),
            image: ImageRef::Url("https://cdn.example.com/selfie.png".to_string()),
            surface: ImageSurface::Profile,
            check_text: false,
        })
        .await
        .unwrap();

    assert!(!result.allowed);

    let approvals: Vec<_> = h
        .queue
        .list(None)
        .into_iter()
        .filter(|n| n.kind == NotificationType::ApprovalRequest)
        .collect();
    assert_eq!(approvals.len(), 1);
    assert_eq!(approvals[0].user_id, "u123");
}

#[tokio::test]
async fn sent_message_is_retroactively_blocked() {
    let h = harness(
        TextScript::Block(Category::Bullying, Severity::High),
        ImageScript::Allow { detected_text: None },
    );
    let messages = Arc::new(MemoryMessageStore::new());
    let coordinator = AsyncCoordinator::new(h.pipeline.clone(), messages.clone());

    let receipt = coordinator
        .send_then_verify(NewChatMessage {
            sender: user(),
            target_user_id: Some("friend".to_string()),
            text: "nadie te quiere aqui".to_string(),
            context: vec!["hola".to_string()],
        })
        .await
        .unwrap();

    // The send already succeeded; the row exists as `sent`.
    let before = messages.get(&receipt.message_id).await.unwrap().unwrap();
    let sent_at = before.sent_at;

    receipt.verification.await.unwrap();

    let after = messages.get(&receipt.message_id).await.unwrap().unwrap();
    assert_eq!(after.status, MessageStatus::Blocked);
    assert!(after.is_blocked);
    assert!(!after.moderation_reason.as_deref().unwrap_or("").is_empty());
    assert_eq!(after.sent_at, sent_at);
}

#[tokio::test]
async fn clean_message_is_stamped_checked() {
    let h = harness(TextScript::Allow, ImageScript::Allow { detected_text: None });
    let messages = Arc::new(MemoryMessageStore::new());
    let coordinator = AsyncCoordinator::new(h.pipeline.clone(), messages.clone());

    let receipt = coordinator
        .send_then_verify(NewChatMessage {
            sender: user(),
            target_user_id: None,
            text: "que bien jugaste hoy".to_string(),
            context: Vec::new(),
        })
        .await
        .unwrap();

    receipt.verification.await.unwrap();

    let message = messages.get(&receipt.message_id).await.unwrap().unwrap();
    assert_eq!(message.status, MessageStatus::Sent);
    assert!(!message.is_blocked);
    assert!(message.moderation_checked_at.is_some());
}

/// Store whose moderation patches always fail, to prove the verification
/// error boundary swallows them.
struct BrokenPatchStore {
    inner: MemoryMessageStore,
}

#[async_trait]
impl ChatMessageStore for BrokenPatchStore {
    async fn insert(&self, message: ChatMessage) -> Result<()> {
        self.inner.insert(message).await
    }

    async fn mark_blocked(&self, _id: &str, _reason: &str) -> Result<()> {
        Err(Error::store("messages table unavailable"))
    }

    async fn mark_checked(&self, _id: &str) -> Result<()> {
        Err(Error::store("messages table unavailable"))
    }

    async fn get(&self, id: &str) -> Result<Option<ChatMessage>> {
        self.inner.get(id).await
    }
}

#[tokio::test]
async fn verification_failure_is_swallowed_and_message_stays_sent() {
    let h = harness(TextScript::Allow, ImageScript::Allow { detected_text: None });
    let messages = Arc::new(BrokenPatchStore {
        inner: MemoryMessageStore::new(),
    });
    let coordinator = AsyncCoordinator::new(h.pipeline.clone(), messages.clone());

    let receipt = coordinator
        .send_then_verify(NewChatMessage {
            sender: user(),
            target_user_id: None,
            text: "hola".to_string(),
            context: Vec::new(),
        })
        .await
        .unwrap();

    // The verification task fails internally; it must not panic or
    // propagate, and the message remains sent and unstamped.
    receipt.verification.await.unwrap();

    let message = messages.get(&receipt.message_id).await.unwrap().unwrap();
    assert_eq!(message.status, MessageStatus::Sent);
    assert!(message.moderation_checked_at.is_none());
}
