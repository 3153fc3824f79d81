//! Moderation event records
//!
//! One immutable `ModerationEvent` is appended per evaluation, allow or
//! block. The full history is the input to both the strike ledger and the
//! behavioral pattern detector; it is never mutated or deleted by normal
//! flow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use trustline_core::{Category, Severity};

/// Immutable audit record for one evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationEvent {
    /// Unique event ID
    pub id: String,

    /// User whose content was evaluated
    pub user_id: String,

    /// Surface label (`chat`, `post`, `comment`, `image_*`)
    pub surface: String,

    /// Counterpart user, when the surface has one (chat)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_user_id: Option<String>,

    /// Truncated content snippet
    pub snippet: String,

    /// Whether the content was allowed
    pub allowed: bool,

    /// Flagged categories
    #[serde(default)]
    pub categories: Vec<Category>,

    /// Decision severity
    pub severity: Severity,

    /// Short human-readable reason
    pub reason: String,

    /// Whether the allow came from failing open after a classifier outage
    #[serde(default)]
    pub fallback: bool,

    /// When the evaluation happened
    pub created_at: DateTime<Utc>,
}

impl ModerationEvent {
    /// Create an event for an evaluation outcome
    pub fn record(
        user_id: impl Into<String>,
        surface: impl Into<String>,
        content: &str,
        snippet_chars: usize,
    ) -> Self {
        Self {
            id: format!("mev_{}", uuid::Uuid::new_v4()),
            user_id: user_id.into(),
            surface: surface.into(),
            target_user_id: None,
            snippet: truncate_chars(content, snippet_chars),
            allowed: true,
            categories: Vec::new(),
            severity: Severity::None,
            reason: String::new(),
            fallback: false,
            created_at: Utc::now(),
        }
    }

    /// Set the decision fields from a verdict
    pub fn with_verdict(mut self, verdict: &trustline_core::Verdict) -> Self {
        self.allowed = verdict.allowed;
        self.categories = verdict.categories.clone();
        self.severity = verdict.severity;
        self.reason = verdict.reason.clone();
        self.fallback = verdict.fallback;
        self
    }

    /// Set the counterpart user
    pub fn with_target(mut self, target_user_id: impl Into<String>) -> Self {
        self.target_user_id = Some(target_user_id.into());
        self
    }

    /// Whether any of this event's categories appear in `categories`
    pub fn intersects(&self, categories: &[Category]) -> bool {
        self.categories.iter().any(|c| categories.contains(c))
    }
}

/// Char-boundary-safe truncation for content snippets
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Query filter for moderation events (admin review dashboard contract)
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    /// Filter by user
    pub user_id: Option<String>,

    /// Filter by flagged category
    pub category: Option<Category>,

    /// Filter by outcome
    pub allowed: Option<bool>,

    /// Filter by minimum severity
    pub min_severity: Option<Severity>,

    /// Start of the time range (inclusive)
    pub since: Option<DateTime<Utc>>,

    /// End of the time range (inclusive)
    pub until: Option<DateTime<Utc>>,

    /// Maximum results to return
    pub limit: Option<usize>,

    /// Offset for pagination
    pub offset: Option<usize>,
}

impl EventQuery {
    /// Create a new empty query
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by user
    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Filter by flagged category
    pub fn category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    /// Filter by outcome
    pub fn allowed(mut self, allowed: bool) -> Self {
        self.allowed = Some(allowed);
        self
    }

    /// Filter by minimum severity
    pub fn min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = Some(severity);
        self
    }

    /// Set the time range
    pub fn time_range(mut self, since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self.until = Some(until);
        self
    }

    /// Set limit and offset
    pub fn paginate(mut self, limit: usize, offset: usize) -> Self {
        self.limit = Some(limit);
        self.offset = Some(offset);
        self
    }

    /// Whether an event passes every set filter
    pub fn matches(&self, event: &ModerationEvent) -> bool {
        if let Some(ref user_id) = self.user_id {
            if &event.user_id != user_id {
                return false;
            }
        }
        if let Some(category) = self.category {
            if !event.categories.contains(&category) {
                return false;
            }
        }
        if let Some(allowed) = self.allowed {
            if event.allowed != allowed {
                return false;
            }
        }
        if let Some(min_severity) = self.min_severity {
            if event.severity < min_severity {
                return false;
            }
        }
        if let Some(since) = self.since {
            if event.created_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if event.created_at > until {
                return false;
            }
        }
        true
    }
}
