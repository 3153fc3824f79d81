//! Core types for Trustline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Content category a verdict can flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Profanity and slurs
    Profanity,
    /// Violence and threats
    Violence,
    /// Sexual content
    Sexual,
    /// Personal data disclosure (phone, email, URLs, social handles)
    PersonalData,
    /// Off-platform meeting solicitation
    MeetingRequest,
    /// Repeated targeted abuse
    Bullying,
    /// Attempts to evade moderation or move off platform
    Evasion,
    /// Spam
    Spam,
}

impl Category {
    /// Stable string form used in events and wire payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Profanity => "profanity",
            Self::Violence => "violence",
            Self::Sexual => "sexual",
            Self::PersonalData => "personal_data",
            Self::MeetingRequest => "meeting_request",
            Self::Bullying => "bullying",
            Self::Evasion => "evasion",
            Self::Spam => "spam",
        }
    }

    /// Parse a category label from an external classifier response.
    ///
    /// Unknown labels return `None`; the caller decides whether to skip
    /// them. Accepts a few aliases the classification service is known to
    /// emit.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "profanity" => Some(Self::Profanity),
            "violence" | "threat" | "threats" => Some(Self::Violence),
            "sexual" | "sexual_content" => Some(Self::Sexual),
            "personal_data" | "pii" => Some(Self::PersonalData),
            "meeting_request" | "dangerous_meeting" => Some(Self::MeetingRequest),
            "bullying" | "harassment" => Some(Self::Bullying),
            "evasion" | "platform_evasion" => Some(Self::Evasion),
            "spam" => Some(Self::Spam),
            _ => None,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict severity, ordered so merged verdicts can take the higher level
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// No violation
    #[default]
    None,
    Low,
    Medium,
    High,
}

impl Severity {
    /// Stable string form used in events and wire payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Parse a severity label; unknown labels return `None`
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "none" => Some(Self::None),
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// Text surface a piece of content was submitted from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Surface {
    Chat,
    Post,
    Comment,
}

impl Surface {
    /// Label recorded on moderation events
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Post => "post",
            Self::Comment => "comment",
        }
    }
}

/// Image surface a picture was submitted from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSurface {
    Chat,
    Post,
    Profile,
    Sticker,
}

impl ImageSurface {
    /// Label recorded on moderation events (`image_` prefixed)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "image_chat",
            Self::Post => "image_post",
            Self::Profile => "image_profile",
            Self::Sticker => "image_sticker",
        }
    }
}

/// The structured allow/block decision produced by the pipeline layers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    /// Whether the content is allowed
    pub allowed: bool,

    /// Categories that were flagged (empty when allowed)
    pub categories: Vec<Category>,

    /// Severity of the worst flagged category
    pub severity: Severity,

    /// Short human-readable reason
    pub reason: String,

    /// Set when this verdict was produced by failing open after a
    /// classifier outage, so it is distinguishable from a genuine pass
    #[serde(default)]
    pub fallback: bool,
}

impl Verdict {
    /// A clean pass
    pub fn allow() -> Self {
        Self {
            allowed: true,
            categories: Vec::new(),
            severity: Severity::None,
            reason: String::new(),
            fallback: false,
        }
    }

    /// A block for a single category
    pub fn block(category: Category, severity: Severity, reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            categories: vec![category],
            severity,
            reason: reason.into(),
            fallback: false,
        }
    }

    /// An allow produced by failing open after a classifier failure
    pub fn fallback_allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            categories: Vec::new(),
            severity: Severity::None,
            reason: reason.into(),
            fallback: true,
        }
    }

    /// Merge two verdicts: blocked if either blocks, categories unioned,
    /// severity takes the higher of the two.
    pub fn merge(mut self, other: Verdict) -> Self {
        self.allowed = self.allowed && other.allowed;
        for category in other.categories {
            if !self.categories.contains(&category) {
                self.categories.push(category);
            }
        }
        self.severity = self.severity.max(other.severity);
        if self.reason.is_empty() {
            self.reason = other.reason;
        }
        self.fallback = self.fallback || other.fallback;
        self
    }
}

/// Result returned to every calling surface from `Evaluate`/`EvaluateImage`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationResult {
    /// Whether the content may be shown
    pub allowed: bool,

    /// Whether the account is suspended (either already, or as a result of
    /// this very evaluation)
    pub suspended: bool,

    /// When the suspension lifts, if suspended
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suspended_until: Option<DateTime<Utc>>,

    /// Short user-facing reason for a rejection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Flagged categories
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<Category>,

    /// Severity of the decision
    pub severity: Severity,

    /// Blocked events for this user in the trailing trust window,
    /// including this one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strikes: Option<u64>,

    /// OCR text extracted from an image, when image evaluation ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_text: Option<String>,
}

impl ModerationResult {
    /// Result for content that passed every layer
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            suspended: false,
            suspended_until: None,
            reason: None,
            categories: Vec::new(),
            severity: Severity::None,
            strikes: None,
            detected_text: None,
        }
    }

    /// Result for a suspended account short-circuit
    pub fn suspended(until: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            allowed: false,
            suspended: true,
            suspended_until: Some(until),
            reason: Some(remaining_message(until, now)),
            categories: Vec::new(),
            severity: Severity::None,
            strikes: None,
            detected_text: None,
        }
    }

    /// Result derived from a pipeline verdict
    pub fn from_verdict(verdict: &Verdict) -> Self {
        Self {
            allowed: verdict.allowed,
            suspended: false,
            suspended_until: None,
            reason: if verdict.reason.is_empty() {
                None
            } else {
                Some(verdict.reason.clone())
            },
            categories: verdict.categories.clone(),
            severity: verdict.severity,
            strikes: None,
            detected_text: None,
        }
    }

    /// Attach the post-evaluation strike count
    pub fn with_strikes(mut self, strikes: u64) -> Self {
        self.strikes = Some(strikes);
        self
    }

    /// Mark the account as suspended as of this evaluation
    pub fn with_suspension(mut self, until: DateTime<Utc>) -> Self {
        self.suspended = true;
        self.suspended_until = Some(until);
        self
    }

    /// Attach OCR-extracted text
    pub fn with_detected_text(mut self, text: impl Into<String>) -> Self {
        self.detected_text = Some(text.into());
        self
    }
}

/// Human-readable remaining-suspension-time message
pub fn remaining_message(until: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let remaining = (until - now).num_minutes().max(0);
    let hours = remaining / 60;
    let minutes = remaining % 60;
    if hours > 0 {
        format!("account suspended, {}h {}m remaining", hours, minutes)
    } else {
        format!("account suspended, {}m remaining", minutes.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn severity_ordering() {
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert!(Severity::Low > Severity::None);
    }

    #[test]
    fn category_parse_aliases() {
        assert_eq!(Category::parse("harassment"), Some(Category::Bullying));
        assert_eq!(Category::parse("PII"), Some(Category::PersonalData));
        assert_eq!(Category::parse("threats"), Some(Category::Violence));
        assert_eq!(Category::parse("something_else"), None);
    }

    #[test]
    fn merge_takes_worst_of_both() {
        let visual = Verdict::block(Category::Violence, Severity::Medium, "graphic content");
        let text = Verdict::block(Category::Profanity, Severity::High, "profanity in overlay");

        let merged = visual.merge(text);
        assert!(!merged.allowed);
        assert_eq!(merged.severity, Severity::High);
        assert!(merged.categories.contains(&Category::Violence));
        assert!(merged.categories.contains(&Category::Profanity));
    }

    #[test]
    fn merge_with_allow_keeps_block() {
        let merged = Verdict::allow().merge(Verdict::block(
            Category::Profanity,
            Severity::Medium,
            "profanity",
        ));
        assert!(!merged.allowed);
        assert_eq!(merged.categories, vec![Category::Profanity]);
    }

    #[test]
    fn remaining_message_counts_down() {
        let now = Utc::now();
        let msg = remaining_message(now + Duration::hours(3) + Duration::minutes(5), now);
        assert!(msg.contains("3h"), "{}", msg);
    }
}
