//! Async execution coordinator (chat surface)
//!
//! Chat sends must feel instantaneous, so moderation is not on the write's
//! critical path: the message persists as `sent` and returns immediately;
//! verification runs in a detached task that may retroactively mark the
//! row blocked. A client reading between the send and the verdict sees the
//! message as allowed — an accepted product trade-off, not a bug. The
//! verification task has its own error boundary: a classifier outage never
//! surfaces as a send failure.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::warn;
use trustline_core::{Result, Surface};

use trustline_ledger::UserRef;

use crate::pipeline::{EvaluateRequest, TrustPipeline};

/// Message delivery status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Blocked,
}

/// A persisted chat message, as the pipeline sees it.
///
/// The surrounding CRUD layer owns the real table; the coordinator only
/// patches the moderation-outcome fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique message ID
    pub id: String,

    /// Sender account
    pub sender_id: String,

    /// Conversation counterpart
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_user_id: Option<String>,

    /// Message text
    pub text: String,

    /// When the message was sent; never touched by verification
    pub sent_at: DateTime<Utc>,

    /// Delivery status
    pub status: MessageStatus,

    /// Set when verification retroactively blocked the message
    pub is_blocked: bool,

    /// Why the message was blocked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moderation_reason: Option<String>,

    /// When verification completed with an allow
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moderation_checked_at: Option<DateTime<Utc>>,
}

/// Store seam for the message rows the coordinator patches
#[async_trait]
pub trait ChatMessageStore: Send + Sync {
    /// Persist a new message
    async fn insert(&self, message: ChatMessage) -> Result<()>;

    /// Retroactively mark a message blocked
    async fn mark_blocked(&self, id: &str, reason: &str) -> Result<()>;

    /// Stamp a completed verification that allowed the message
    async fn mark_checked(&self, id: &str) -> Result<()>;

    /// Fetch a message
    async fn get(&self, id: &str) -> Result<Option<ChatMessage>>;
}

/// In-memory message store
pub struct MemoryMessageStore {
    inner: RwLock<Vec<ChatMessage>>,
}

impl MemoryMessageStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Vec::new()),
        }
    }
}

impl Default for MemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatMessageStore for MemoryMessageStore {
    async fn insert(&self, message: ChatMessage) -> Result<()> {
        self.inner.write().push(message);
        Ok(())
    }

    async fn mark_blocked(&self, id: &str, reason: &str) -> Result<()> {
        let mut inner = self.inner.write();
        if let Some(message) = inner.iter_mut().find(|m| m.id == id) {
            message.status = MessageStatus::Blocked;
            message.is_blocked = true;
            message.moderation_reason = Some(reason.to_string());
        }
        Ok(())
    }

    async fn mark_checked(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.write();
        if let Some(message) = inner.iter_mut().find(|m| m.id == id) {
            message.moderation_checked_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<ChatMessage>> {
        Ok(self.inner.read().iter().find(|m| m.id == id).cloned())
    }
}

/// A new chat message to send
#[derive(Debug, Clone)]
pub struct NewChatMessage {
    /// The sender
    pub sender: UserRef,

    /// Conversation counterpart
    pub target_user_id: Option<String>,

    /// Message text
    pub text: String,

    /// Trailing conversation context for the classifier, oldest first
    pub context: Vec<String>,
}

/// Receipt for a sent message.
///
/// Dropping `verification` detaches the task (the production path); tests
/// await it to observe the verdict.
pub struct SendReceipt {
    /// The persisted message's ID
    pub message_id: String,

    /// Handle to the detached verification task
    pub verification: JoinHandle<()>,
}

/// Decouples "persist the message" from "verify the message"
pub struct AsyncCoordinator {
    pipeline: Arc<TrustPipeline>,
    messages: Arc<dyn ChatMessageStore>,
}

impl AsyncCoordinator {
    /// Create a coordinator over the pipeline and message store
    pub fn new(pipeline: Arc<TrustPipeline>, messages: Arc<dyn ChatMessageStore>) -> Self {
        Self { pipeline, messages }
    }

    /// Persist the message as `sent`, return immediately, and verify in a
    /// detached task. Only the insert itself can fail the send; everything
    /// inside verification is swallowed after logging.
    pub async fn send_then_verify(&self, new: NewChatMessage) -> Result<SendReceipt> {
        let message = ChatMessage {
            id: format!("msg_{}", uuid::Uuid::new_v4()),
            sender_id: new.sender.id.clone(),
            target_user_id: new.target_user_id.clone(),
            text: new.text.clone(),
            sent_at: Utc::now(),
            status: MessageStatus::Sent,
            is_blocked: false,
            moderation_reason: None,
            moderation_checked_at: None,
        };
        let message_id = message.id.clone();

        self.messages.insert(message).await?;

        let pipeline = self.pipeline.clone();
        let messages = self.messages.clone();
        let id = message_id.clone();

        let verification = tokio::spawn(async move {
            if let Err(e) = verify(pipeline, messages, &id, new).await {
                warn!(message = %id, "chat verification failed, message stays sent: {}", e);
                metrics::counter!("trustline_verify_failures_total").increment(1);
            }
        });

        Ok(SendReceipt {
            message_id,
            verification,
        })
    }
}

async fn verify(
    pipeline: Arc<TrustPipeline>,
    messages: Arc<dyn ChatMessageStore>,
    id: &str,
    new: NewChatMessage,
) -> Result<()> {
    let mut request = EvaluateRequest::new(new.sender, new.text, Surface::Chat)
        .with_context(new.context);
    if let Some(target) = new.target_user_id {
        request = request.with_target(target);
    }

    let result = pipeline.evaluate(request).await?;

    if result.allowed {
        messages.mark_checked(id).await
    } else {
        let reason = result.reason.as_deref().unwrap_or("blocked by moderation");
        messages.mark_blocked(id, reason).await
    }
}
