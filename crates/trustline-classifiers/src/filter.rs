//! Pattern filter (Layer 1)
//!
//! Deterministic, zero-latency category matcher over normalized text.
//! Groups are tested in order and the first matching group is the only one
//! reported. A miss means "continue to the semantic classifier", not
//! "clean".

use aho_corasick::AhoCorasick;
use regex::Regex;
use trustline_core::{Category, Error, Result, Severity, Verdict};

/// Ordered category pattern groups
pub struct PatternFilter {
    groups: Vec<CategoryGroup>,
}

struct CategoryGroup {
    category: Category,
    severity: Severity,
    reason: &'static str,
    keywords: Option<AhoCorasick>,
    patterns: Vec<Regex>,
}

impl PatternFilter {
    /// Build the filter with the default category groups
    pub fn new() -> Result<Self> {
        let groups = vec![
            CategoryGroup {
                category: Category::Profanity,
                severity: Severity::Medium,
                reason: "offensive language",
                keywords: Some(keyword_set(PROFANITY)?),
                patterns: Vec::new(),
            },
            CategoryGroup {
                category: Category::Violence,
                severity: Severity::High,
                reason: "violent or threatening language",
                keywords: Some(keyword_set(VIOLENCE)?),
                patterns: Vec::new(),
            },
            CategoryGroup {
                category: Category::Sexual,
                severity: Severity::High,
                reason: "sexual content",
                keywords: Some(keyword_set(SEXUAL)?),
                patterns: Vec::new(),
            },
            CategoryGroup {
                category: Category::PersonalData,
                severity: Severity::High,
                reason: "sharing personal information",
                keywords: Some(keyword_set(SOCIAL_HANDLES)?),
                patterns: personal_data_patterns()?,
            },
            CategoryGroup {
                category: Category::MeetingRequest,
                severity: Severity::High,
                reason: "off-platform meeting request",
                keywords: Some(keyword_set(MEETING)?),
                patterns: Vec::new(),
            },
        ];

        Ok(Self { groups })
    }

    /// Test normalized text against each group until the first match.
    ///
    /// Returns a blocking verdict for the first matching group, or `None`
    /// when the pipeline should continue to Layer 2.
    pub fn check(&self, text: &str) -> Option<Verdict> {
        for group in &self.groups {
            if group.matches(text) {
                return Some(Verdict::block(group.category, group.severity, group.reason));
            }
        }
        None
    }
}

impl CategoryGroup {
    fn matches(&self, text: &str) -> bool {
        if let Some(ref keywords) = self.keywords {
            for hit in keywords.find_iter(text) {
                if is_word_match(text, hit.start(), hit.end()) {
                    return true;
                }
            }
        }
        self.patterns.iter().any(|p| p.is_match(text))
    }
}

/// Reject keyword hits embedded inside longer words ("matar" in
/// "rematarlo" is not a threat).
fn is_word_match(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.is_some_and(|c| c.is_alphanumeric()) && !after.is_some_and(|c| c.is_alphanumeric())
}

fn keyword_set(words: &[&str]) -> Result<AhoCorasick> {
    AhoCorasick::builder()
        .build(words)
        .map_err(|e| Error::classifier(format!("failed to build keyword matcher: {}", e)))
}

fn personal_data_patterns() -> Result<Vec<Regex>> {
    [
        // Phone shapes: 7+ digits with optional separators
        r"\b\+?\d[\d\-. ]{5,}\d\b",
        // Email shapes (text is already lowercased)
        r"\b[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,}\b",
        // URLs
        r"(?:https?://|www\.)[^\s]+",
    ]
    .iter()
    .map(|p| {
        Regex::new(p).map_err(|e| Error::classifier(format!("failed to compile pattern: {}", e)))
    })
    .collect()
}

// Keyword lists are matched against normalized text: lowercase, diacritics
// folded, leet substituted. Spanish first, the platform's largest market.

const PROFANITY: &[&str] = &[
    "puta", "puto", "mierda", "cabron", "pendejo", "gilipollas", "joder", "imbecil", "idiota",
    "estupida", "estupido", "fuck", "shit", "bitch", "asshole", "bastard", "dumbass",
];

const VIOLENCE: &[&str] = &[
    "te voy a matar",
    "voy a matarte",
    "te mato",
    "matarte",
    "te voy a pegar",
    "te voy a romper",
    "muerete",
    "ojala te mueras",
    "kill you",
    "i will kill",
    "gonna kill you",
    "beat you up",
    "hope you die",
    "kill yourself",
];

const SEXUAL: &[&str] = &[
    "sexo", "desnudo", "desnuda", "desnudos", "porno", "sex", "nude", "nudes", "naked", "porn",
];

const SOCIAL_HANDLES: &[&str] = &[
    "whatsapp",
    "instagram",
    "telegram",
    "snapchat",
    "tiktok",
    "discord",
    "mi numero es",
    "my number is",
    "mi direccion es",
    "my address is",
];

const MEETING: &[&str] = &[
    "nos vemos en",
    "quedamos en",
    "ven a mi casa",
    "vamos a vernos",
    "te espero en",
    "meet me at",
    "meet me after",
    "come to my house",
    "lets meet",
    "let's meet",
];
