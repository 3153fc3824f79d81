//! Behavioral pattern detector
//!
//! The one place the pipeline looks backward in time: repeated blocked
//! profanity/bullying from the same sender toward the same target forces a
//! block even when the immediate message is individually clean.

use chrono::{Duration, Utc};
use std::sync::Arc;
use trustline_core::{BullyingConfig, Category, Result};

use trustline_ledger::TrustStore;

/// Detects slow-burn targeted abuse a single-message classifier cannot see
pub struct PatternDetector {
    store: Arc<dyn TrustStore>,
    config: BullyingConfig,
}

impl PatternDetector {
    /// Create a detector over the event store
    pub fn new(store: Arc<dyn TrustStore>, config: BullyingConfig) -> Self {
        Self { store, config }
    }

    /// Whether this sender has an abuse pattern toward this target.
    ///
    /// Counts blocked events in the lookback window whose categories
    /// intersect {profanity, bullying}; events that carry a target must
    /// match this one.
    pub async fn detect(&self, sender_id: &str, target_id: &str) -> Result<bool> {
        let since = Utc::now() - Duration::days(self.config.lookback_days);
        let count = self
            .store
            .count_blocked_matching(
                sender_id,
                &[Category::Profanity, Category::Bullying],
                since,
                Some(target_id),
            )
            .await?;

        Ok(count >= self.config.threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trustline_ledger::{MemoryTrustStore, ModerationEvent};
    use trustline_core::{Severity, Verdict};

    fn blocked(sender: &str, target: &str, category: Category) -> ModerationEvent {
        ModerationEvent::record(sender, "chat", "insult", 120)
            .with_verdict(&Verdict::block(category, Severity::Medium, "test"))
            .with_target(target)
    }

    #[tokio::test]
    async fn pattern_detected_at_threshold() {
        let store = Arc::new(MemoryTrustStore::new());
        let detector = PatternDetector::new(store.clone(), BullyingConfig::default());

        for _ in 0..2 {
            store
                .append_event(blocked("bully", "victim", Category::Profanity))
                .await
                .unwrap();
        }
        assert!(!detector.detect("bully", "victim").await.unwrap());

        store
            .append_event(blocked("bully", "victim", Category::Bullying))
            .await
            .unwrap();
        assert!(detector.detect("bully", "victim").await.unwrap());
    }

    #[tokio::test]
    async fn other_targets_do_not_count() {
        let store = Arc::new(MemoryTrustStore::new());
        let detector = PatternDetector::new(store.clone(), BullyingConfig::default());

        for _ in 0..3 {
            store
                .append_event(blocked("bully", "someone_else", Category::Profanity))
                .await
                .unwrap();
        }

        assert!(!detector.detect("bully", "victim").await.unwrap());
    }

    #[tokio::test]
    async fn unrelated_categories_do_not_count() {
        let store = Arc::new(MemoryTrustStore::new());
        let detector = PatternDetector::new(store.clone(), BullyingConfig::default());

        for _ in 0..3 {
            store
                .append_event(blocked("bully", "victim", Category::PersonalData))
                .await
                .unwrap();
        }

        assert!(!detector.detect("bully", "victim").await.unwrap());
    }
}
