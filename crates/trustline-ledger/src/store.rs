//! Trust store
//!
//! The datastore seam for events and trust profiles. `record_strike` and
//! `begin_suspension` are the two operations concurrent evaluations for
//! the same user contend over: the first serializes append+count under one
//! write guard, the second is a compare-and-set only one caller can win.
//! Together they close the read-then-decide race on the strike threshold.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use trustline_core::{Category, Error, Result};

use crate::event::{EventQuery, ModerationEvent};
use crate::journal::JournalWriter;

/// Trust-relevant subset of a user's account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustProfile {
    /// User this profile belongs to
    pub user_id: String,

    /// Sole authoritative gate for "is this user blocked from writing"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suspended_until: Option<DateTime<Utc>>,

    /// Advisory lifetime count of blocked events
    pub infractions: u64,

    /// Strike-window anchor; counting never reaches behind this
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strikes_reset_at: Option<DateTime<Utc>>,
}

impl TrustProfile {
    /// A fresh, active profile
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            suspended_until: None,
            infractions: 0,
            strikes_reset_at: None,
        }
    }

    /// Whether the account is suspended at `now`
    pub fn is_suspended(&self, now: DateTime<Utc>) -> bool {
        self.suspended_until.is_some_and(|until| until > now)
    }

    /// Effective start of the strike window: the later of the window edge
    /// and the last reset anchor.
    pub fn window_start(&self, window_edge: DateTime<Utc>) -> DateTime<Utc> {
        match self.strikes_reset_at {
            Some(reset) if reset > window_edge => reset,
            _ => window_edge,
        }
    }
}

/// Datastore contract for events and trust profiles
#[async_trait]
pub trait TrustStore: Send + Sync {
    /// Append an event (allowed outcomes; no strike accounting)
    async fn append_event(&self, event: ModerationEvent) -> Result<()>;

    /// Atomically append a blocked event and return the count of blocked
    /// events for that user since `window_edge` (anchored at the profile's
    /// reset point), including the event just appended.
    async fn record_strike(&self, event: ModerationEvent, window_edge: DateTime<Utc>)
        -> Result<u64>;

    /// Count blocked events for `user_id` since `since` whose categories
    /// intersect `categories`. When `target` is given, events carrying a
    /// target must match it; events without one still count.
    async fn count_blocked_matching(
        &self,
        user_id: &str,
        categories: &[Category],
        since: DateTime<Utc>,
        target: Option<&str>,
    ) -> Result<u64>;

    /// Query events (admin dashboard)
    async fn events(&self, query: &EventQuery) -> Result<Vec<ModerationEvent>>;

    /// Fetch the trust profile for a user (a fresh profile when unseen)
    async fn profile(&self, user_id: &str) -> Result<TrustProfile>;

    /// Compare-and-set the suspension gate. Returns `false` without
    /// changes when the user is already suspended at `now`.
    async fn begin_suspension(
        &self,
        user_id: &str,
        until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Clear the suspension gate, zero the advisory counter, and move the
    /// strike-window anchor to `now`. Idempotent: a no-op lift on an
    /// active user still resets the anchor.
    async fn lift_suspension(&self, user_id: &str, now: DateTime<Utc>) -> Result<()>;
}

#[derive(Default)]
struct Inner {
    events: Vec<ModerationEvent>,
    profiles: HashMap<String, TrustProfile>,
}

/// In-memory reference store, optionally teeing every event into the
/// durable journal.
pub struct MemoryTrustStore {
    inner: RwLock<Inner>,
    journal: Option<Mutex<JournalWriter>>,
}

impl MemoryTrustStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            journal: None,
        }
    }

    /// Tee every appended event into a durable journal
    pub fn with_journal(mut self, writer: JournalWriter) -> Self {
        self.journal = Some(Mutex::new(writer));
        self
    }

    fn persist(&self, event: &ModerationEvent) -> Result<()> {
        if let Some(ref journal) = self.journal {
            journal
                .lock()
                .write_event(event)
                .map_err(|e| Error::store(format!("journal write failed: {}", e)))?;
        }
        Ok(())
    }
}

impl Default for MemoryTrustStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TrustStore for MemoryTrustStore {
    async fn append_event(&self, event: ModerationEvent) -> Result<()> {
        self.persist(&event)?;
        self.inner.write().events.push(event);
        Ok(())
    }

    async fn record_strike(
        &self,
        event: ModerationEvent,
        window_edge: DateTime<Utc>,
    ) -> Result<u64> {
        self.persist(&event)?;

        let mut inner = self.inner.write();
        let user_id = event.user_id.clone();
        inner.events.push(event);

        let start = {
            let profile = inner
                .profiles
                .entry(user_id.clone())
                .or_insert_with(|| TrustProfile::new(&user_id));
            profile.infractions += 1;
            profile.window_start(window_edge)
        };

        let count = inner
            .events
            .iter()
            .filter(|e| e.user_id == user_id && !e.allowed && e.created_at >= start)
            .count() as u64;
        Ok(count)
    }

    async fn count_blocked_matching(
        &self,
        user_id: &str,
        categories: &[Category],
        since: DateTime<Utc>,
        target: Option<&str>,
    ) -> Result<u64> {
        let inner = self.inner.read();
        let count = inner
            .events
            .iter()
            .filter(|e| {
                e.user_id == user_id
                    && !e.allowed
                    && e.created_at >= since
                    && e.intersects(categories)
                    && match (target, e.target_user_id.as_deref()) {
                        (Some(t), Some(et)) => t == et,
                        _ => true,
                    }
            })
            .count() as u64;
        Ok(count)
    }

    async fn events(&self, query: &EventQuery) -> Result<Vec<ModerationEvent>> {
        let inner = self.inner.read();
        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(1000);

        Ok(inner
            .events
            .iter()
            .filter(|e| query.matches(e))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn profile(&self, user_id: &str) -> Result<TrustProfile> {
        let inner = self.inner.read();
        Ok(inner
            .profiles
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| TrustProfile::new(user_id)))
    }

    async fn begin_suspension(
        &self,
        user_id: &str,
        until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut inner = self.inner.write();
        let profile = inner
            .profiles
            .entry(user_id.to_string())
            .or_insert_with(|| TrustProfile::new(user_id));

        if profile.is_suspended(now) {
            return Ok(false);
        }
        profile.suspended_until = Some(until);
        Ok(true)
    }

    async fn lift_suspension(&self, user_id: &str, now: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.write();
        let profile = inner
            .profiles
            .entry(user_id.to_string())
            .or_insert_with(|| TrustProfile::new(user_id));

        profile.suspended_until = None;
        profile.infractions = 0;
        profile.strikes_reset_at = Some(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use trustline_core::{Severity, Verdict};

    fn blocked_event(user: &str, category: Category) -> ModerationEvent {
        ModerationEvent::record(user, "chat", "bad content", 120)
            .with_verdict(&Verdict::block(category, Severity::Medium, "test"))
    }

    #[tokio::test]
    async fn record_strike_counts_include_new_event() {
        let store = MemoryTrustStore::new();
        let edge = Utc::now() - Duration::hours(24);

        let first = store
            .record_strike(blocked_event("u1", Category::Profanity), edge)
            .await
            .unwrap();
        let second = store
            .record_strike(blocked_event("u1", Category::Profanity), edge)
            .await
            .unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[tokio::test]
    async fn strikes_are_per_user() {
        let store = MemoryTrustStore::new();
        let edge = Utc::now() - Duration::hours(24);

        store
            .record_strike(blocked_event("u1", Category::Profanity), edge)
            .await
            .unwrap();
        let other = store
            .record_strike(blocked_event("u2", Category::Profanity), edge)
            .await
            .unwrap();

        assert_eq!(other, 1);
    }

    #[tokio::test]
    async fn lift_resets_window_anchor() {
        let store = MemoryTrustStore::new();
        let edge = Utc::now() - Duration::hours(24);

        for _ in 0..3 {
            store
                .record_strike(blocked_event("u1", Category::Profanity), edge)
                .await
                .unwrap();
        }

        store.lift_suspension("u1", Utc::now()).await.unwrap();

        // Stale history is behind the anchor; only the new strike counts.
        let count = store
            .record_strike(blocked_event("u1", Category::Profanity), edge)
            .await
            .unwrap();
        assert_eq!(count, 1);

        let profile = store.profile("u1").await.unwrap();
        assert_eq!(profile.infractions, 1);
        assert!(profile.strikes_reset_at.is_some());
    }

    #[tokio::test]
    async fn begin_suspension_is_a_one_winner_cas() {
        let store = MemoryTrustStore::new();
        let now = Utc::now();
        let until = now + Duration::hours(24);

        assert!(store.begin_suspension("u1", until, now).await.unwrap());
        assert!(!store.begin_suspension("u1", until, now).await.unwrap());
    }

    #[tokio::test]
    async fn expired_suspension_reads_as_active() {
        let store = MemoryTrustStore::new();
        let now = Utc::now();

        store
            .begin_suspension("u1", now - Duration::minutes(1), now - Duration::hours(25))
            .await
            .unwrap();

        let profile = store.profile("u1").await.unwrap();
        assert!(!profile.is_suspended(now));

        // The gate is passively open again, so a new suspension can begin.
        assert!(store
            .begin_suspension("u1", now + Duration::hours(24), now)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn target_filter_matches_or_untargeted() {
        let store = MemoryTrustStore::new();
        let since = Utc::now() - Duration::days(7);

        store
            .append_event(blocked_event("u1", Category::Profanity).with_target("victim"))
            .await
            .unwrap();
        store
            .append_event(blocked_event("u1", Category::Profanity))
            .await
            .unwrap();
        store
            .append_event(blocked_event("u1", Category::Profanity).with_target("other"))
            .await
            .unwrap();

        let count = store
            .count_blocked_matching(
                "u1",
                &[Category::Profanity, Category::Bullying],
                since,
                Some("victim"),
            )
            .await
            .unwrap();

        // The targeted match and the untargeted event count; "other" does not.
        assert_eq!(count, 2);
    }
}
