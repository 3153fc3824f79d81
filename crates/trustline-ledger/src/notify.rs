//! Guardian notification queue
//!
//! Durable, idempotent record of tutor-facing alerts. Creation is
//! append-only and guarded by a dedup key so one escalation yields exactly
//! one record; status transitions are the only mutation. Actual delivery
//! is an external collaborator behind the `NotificationDispatcher` trait —
//! a failed delivery is retriable without duplicating the record.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::warn;
use trustline_core::Result;

/// What kind of guardian alert this is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    /// Informational warning about a blocked item
    Warning,
    /// The user is one strike away from suspension
    StrikeLimit,
    /// The user has been suspended
    Suspension,
    /// A flagged profile image awaits guardian review
    ApprovalRequest,
}

/// Delivery lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Queued,
    Sent,
    Failed,
    Dismissed,
}

/// Structured snapshot delivered to the guardian verbatim
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPayload {
    /// The child's display name
    pub nick: String,

    /// Blocked events in the trust window at escalation time
    pub strike_count: u64,

    /// When the suspension lifts, for suspension alerts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suspended_until: Option<DateTime<Utc>>,

    /// The triggering reason
    pub reason: String,
}

/// One guardian-facing alert record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TutorNotification {
    /// Unique notification ID
    pub id: String,

    /// Guardian email address
    pub tutor_email: String,

    /// The child account this concerns
    pub user_id: String,

    /// Alert kind
    #[serde(rename = "type")]
    pub kind: NotificationType,

    /// Delivery lifecycle state
    pub status: NotificationStatus,

    /// Structured snapshot for the dispatcher
    pub payload: NotificationPayload,

    /// Creation guard: one record per escalation event
    pub dedup_key: String,

    /// When the record was created
    pub created_at: DateTime<Utc>,

    /// When delivery succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,

    /// Last delivery error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TutorNotification {
    /// Create a queued notification
    pub fn new(
        tutor_email: impl Into<String>,
        user_id: impl Into<String>,
        kind: NotificationType,
        payload: NotificationPayload,
        dedup_key: impl Into<String>,
    ) -> Self {
        Self {
            id: format!("ntf_{}", uuid::Uuid::new_v4()),
            tutor_email: tutor_email.into(),
            user_id: user_id.into(),
            kind,
            status: NotificationStatus::Queued,
            payload,
            dedup_key: dedup_key.into(),
            created_at: Utc::now(),
            sent_at: None,
            error: None,
        }
    }
}

/// Delivery collaborator (mail, pager, webhook)
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Deliver one notification to the guardian
    async fn deliver(&self, notification: &TutorNotification) -> Result<()>;
}

/// In-memory notification queue
pub struct NotificationQueue {
    inner: RwLock<Vec<TutorNotification>>,
}

impl NotificationQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Vec::new()),
        }
    }

    /// Enqueue a notification, guarded by its dedup key.
    ///
    /// Returns the id of the stored record: the new one, or the existing
    /// record's when this escalation was already enqueued.
    pub fn enqueue(&self, notification: TutorNotification) -> String {
        let mut inner = self.inner.write();
        if let Some(existing) = inner
            .iter()
            .find(|n| n.dedup_key == notification.dedup_key)
        {
            return existing.id.clone();
        }
        let id = notification.id.clone();
        inner.push(notification);
        id
    }

    /// Mark a notification as delivered
    pub fn mark_sent(&self, id: &str) -> bool {
        self.transition(id, |n| {
            n.status = NotificationStatus::Sent;
            n.sent_at = Some(Utc::now());
            n.error = None;
        })
    }

    /// Mark a delivery attempt as failed
    pub fn mark_failed(&self, id: &str, error: impl Into<String>) -> bool {
        let error = error.into();
        self.transition(id, move |n| {
            n.status = NotificationStatus::Failed;
            n.error = Some(error);
        })
    }

    /// Dismiss a notification (guardian/admin action)
    pub fn dismiss(&self, id: &str) -> bool {
        self.transition(id, |n| {
            n.status = NotificationStatus::Dismissed;
        })
    }

    /// Fetch one notification
    pub fn get(&self, id: &str) -> Option<TutorNotification> {
        self.inner.read().iter().find(|n| n.id == id).cloned()
    }

    /// List notifications, optionally by status
    pub fn list(&self, status: Option<NotificationStatus>) -> Vec<TutorNotification> {
        self.inner
            .read()
            .iter()
            .filter(|n| status.map_or(true, |s| n.status == s))
            .cloned()
            .collect()
    }

    /// Records awaiting delivery: queued, plus failed ones to retry
    pub fn deliverable(&self) -> Vec<TutorNotification> {
        self.inner
            .read()
            .iter()
            .filter(|n| {
                matches!(
                    n.status,
                    NotificationStatus::Queued | NotificationStatus::Failed
                )
            })
            .cloned()
            .collect()
    }

    fn transition(&self, id: &str, f: impl FnOnce(&mut TutorNotification)) -> bool {
        let mut inner = self.inner.write();
        match inner.iter_mut().find(|n| n.id == id) {
            Some(notification) => {
                f(notification);
                true
            }
            None => false,
        }
    }
}

impl Default for NotificationQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Attempt delivery for every deliverable record, transitioning each to
/// sent or failed. Returns how many were delivered.
pub async fn drain(queue: &NotificationQueue, dispatcher: &dyn NotificationDispatcher) -> usize {
    let mut delivered = 0;

    for notification in queue.deliverable() {
        match dispatcher.deliver(&notification).await {
            Ok(()) => {
                queue.mark_sent(&notification.id);
                metrics::counter!("trustline_notifications_total", "status" => "sent")
                    .increment(1);
                delivered += 1;
            }
            Err(e) => {
                warn!(id = %notification.id, "notification delivery failed: {}", e);
                queue.mark_failed(&notification.id, e.to_string());
                metrics::counter!("trustline_notifications_total", "status" => "failed")
                    .increment(1);
            }
        }
    }

    delivered
}
