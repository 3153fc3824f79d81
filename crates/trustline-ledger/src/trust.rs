//! Strike ledger and trust state machine
//!
//! Accounts are Active (suspended_until null or past) or Suspended
//! (suspended_until in the future). Recording a blocked event counts
//! strikes over the trailing trust window and, at the threshold, flips the
//! account to Suspended and enqueues exactly one guardian notification.
//! The blocked event is always recorded before the threshold check, so the
//! deciding count includes it.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use trustline_core::{Result, StrikeConfig};

use crate::event::ModerationEvent;
use crate::notify::{
    NotificationPayload, NotificationQueue, NotificationType, TutorNotification,
};
use crate::store::TrustStore;

/// The user context every surface passes alongside content
#[derive(Debug, Clone)]
pub struct UserRef {
    /// Account id
    pub id: String,

    /// Display name, snapshotted into notifications
    pub nick: String,

    /// Guardian email for escalation alerts
    pub tutor_email: String,
}

impl UserRef {
    /// Create a user reference
    pub fn new(
        id: impl Into<String>,
        nick: impl Into<String>,
        tutor_email: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            nick: nick.into(),
            tutor_email: tutor_email.into(),
        }
    }
}

/// Outcome of recording a verdict against the ledger
#[derive(Debug, Clone, Default)]
pub struct Escalation {
    /// Blocked events in the trust window, including this one
    pub strikes: Option<u64>,

    /// Set when this recording left the account suspended
    pub suspended_until: Option<DateTime<Utc>>,

    /// Whether a strike-limit warning was enqueued
    pub warned: bool,
}

/// Strike ledger + trust state machine
pub struct TrustEngine {
    store: Arc<dyn TrustStore>,
    queue: Arc<NotificationQueue>,
    config: StrikeConfig,
}

impl TrustEngine {
    /// Create an engine over a store and notification queue
    pub fn new(
        store: Arc<dyn TrustStore>,
        queue: Arc<NotificationQueue>,
        config: StrikeConfig,
    ) -> Self {
        Self {
            store,
            queue,
            config,
        }
    }

    /// Record one evaluation outcome.
    ///
    /// Allowed events are appended without strike accounting. Blocked
    /// events are recorded atomically with the windowed count; reaching
    /// the threshold suspends the account and enqueues one `suspension`
    /// notification, guarded so concurrent evaluations cannot double-fire.
    pub async fn record_verdict(
        &self,
        event: ModerationEvent,
        user: &UserRef,
    ) -> Result<Escalation> {
        if event.allowed {
            self.store.append_event(event).await?;
            return Ok(Escalation::default());
        }

        let now = Utc::now();
        let reason = event.reason.clone();
        let window_edge = now - Duration::hours(self.config.window_hours);

        let strikes = self.store.record_strike(event, window_edge).await?;
        metrics::counter!("trustline_strikes_total").increment(1);

        let mut escalation = Escalation {
            strikes: Some(strikes),
            ..Default::default()
        };

        if strikes >= self.config.threshold {
            let until = now + Duration::hours(self.config.suspension_hours);

            if self.store.begin_suspension(&user.id, until, now).await? {
                info!(user = %user.id, strikes, "strike threshold reached, suspending account");
                metrics::counter!("trustline_escalations_total").increment(1);

                self.queue.enqueue(TutorNotification::new(
                    &user.tutor_email,
                    &user.id,
                    NotificationType::Suspension,
                    NotificationPayload {
                        nick: user.nick.clone(),
                        strike_count: strikes,
                        suspended_until: Some(until),
                        reason,
                    },
                    format!("suspension:{}:{}", user.id, until.timestamp()),
                ));
                escalation.suspended_until = Some(until);
            } else {
                // A concurrent evaluation won the transition; report the
                // suspension it installed.
                let profile = self.store.profile(&user.id).await?;
                escalation.suspended_until = profile.suspended_until;
            }
        } else if strikes + 1 == self.config.threshold {
            self.queue.enqueue(TutorNotification::new(
                &user.tutor_email,
                &user.id,
                NotificationType::StrikeLimit,
                NotificationPayload {
                    nick: user.nick.clone(),
                    strike_count: strikes,
                    suspended_until: None,
                    reason,
                },
                format!("strike_limit:{}:{}", user.id, now.format("%Y-%m-%d")),
            ));
            escalation.warned = true;
        }

        Ok(escalation)
    }

    /// Administrative suspension, bypassing the strike count
    pub async fn suspend(&self, user: &UserRef, reason: impl Into<String>) -> Result<DateTime<Utc>> {
        let now = Utc::now();
        let until = now + Duration::hours(self.config.suspension_hours);
        let reason = reason.into();

        if self.store.begin_suspension(&user.id, until, now).await? {
            let profile = self.store.profile(&user.id).await?;
            self.queue.enqueue(TutorNotification::new(
                &user.tutor_email,
                &user.id,
                NotificationType::Suspension,
                NotificationPayload {
                    nick: user.nick.clone(),
                    strike_count: profile.infractions,
                    suspended_until: Some(until),
                    reason,
                },
                format!("suspension:{}:{}", user.id, until.timestamp()),
            ));
            Ok(until)
        } else {
            let profile = self.store.profile(&user.id).await?;
            warn!(user = %user.id, "suspend requested for already-suspended account");
            Ok(profile.suspended_until.unwrap_or(until))
        }
    }

    /// Lift a suspension. Idempotent: lifting an active user is a no-op
    /// that still resets the strike-window anchor and advisory counter.
    pub async fn lift(&self, user_id: &str) -> Result<()> {
        self.store.lift_suspension(user_id, Utc::now()).await?;
        info!(user = %user_id, "suspension lifted, strike window reset");
        Ok(())
    }

    /// Ask the guardian to review a flagged item (profile images).
    /// `reference` scopes the dedup guard to the triggering item.
    pub fn request_approval(
        &self,
        user: &UserRef,
        reason: impl Into<String>,
        reference: &str,
    ) -> String {
        self.queue.enqueue(TutorNotification::new(
            &user.tutor_email,
            &user.id,
            NotificationType::ApprovalRequest,
            NotificationPayload {
                nick: user.nick.clone(),
                strike_count: 0,
                suspended_until: None,
                reason: reason.into(),
            },
            format!("approval:{}:{}", user.id, reference),
        ))
    }
}
