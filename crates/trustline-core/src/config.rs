//! Pipeline configuration
//!
//! Every tunable the pipeline exposes (classifier endpoint, timeouts,
//! strike and suspension windows, detector thresholds) lives here so it
//! can be changed without a redeploy.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// Top-level Trustline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustConfig {
    /// External classifier service settings
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Strike counting and suspension settings
    #[serde(default)]
    pub strikes: StrikeConfig,

    /// Behavioral bullying-pattern detector settings
    #[serde(default)]
    pub bullying: BullyingConfig,

    /// Max prior chat messages forwarded as classification context
    #[serde(default = "default_context_window")]
    pub context_window: usize,

    /// Max characters of content kept on a moderation event
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,

    /// Webhook URL notifications are dispatched to, when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_webhook: Option<String>,
}

impl TrustConfig {
    /// Load configuration from a YAML file, falling back to defaults when
    /// the file does not exist, then apply environment overrides.
    pub fn load(config_path: &str) -> Result<Self> {
        let mut config: Self = if Path::new(config_path).exists() {
            let content = std::fs::read_to_string(config_path)?;
            serde_yaml::from_str(&content)
                .map_err(|e| Error::config(format!("failed to parse {}: {}", config_path, e)))?
        } else {
            Self::default()
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides for deployment-sensitive values
    pub fn apply_env(&mut self) {
        if let Ok(endpoint) = std::env::var("TRUSTLINE_CLASSIFIER_ENDPOINT") {
            self.classifier.endpoint = endpoint;
        }
        if let Ok(key) = std::env::var("TRUSTLINE_CLASSIFIER_API_KEY") {
            self.classifier.api_key = Some(key);
        }
        if let Ok(url) = std::env::var("TRUSTLINE_NOTIFICATION_WEBHOOK") {
            self.notification_webhook = Some(url);
        }
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.strikes.threshold == 0 {
            return Err(Error::config("strikes.threshold must be at least 1"));
        }
        if self.bullying.threshold == 0 {
            return Err(Error::config("bullying.threshold must be at least 1"));
        }
        if self.classifier.timeout_secs == 0 {
            return Err(Error::config("classifier.timeout_secs must be at least 1"));
        }
        Ok(())
    }
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            classifier: ClassifierConfig::default(),
            strikes: StrikeConfig::default(),
            bullying: BullyingConfig::default(),
            context_window: default_context_window(),
            snippet_chars: default_snippet_chars(),
            notification_webhook: None,
        }
    }
}

/// External classifier service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Classification service base URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Bearer credential for the classification service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model used for text classification
    #[serde(default = "default_text_model")]
    pub text_model: String,

    /// Model used for image classification
    #[serde(default = "default_vision_model")]
    pub vision_model: String,

    /// Hard timeout for one classification call, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ClassifierConfig {
    /// Timeout as a `Duration`
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: None,
            text_model: default_text_model(),
            vision_model: default_vision_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Strike counting and suspension settings
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StrikeConfig {
    /// Blocked events within the trust window that trigger suspension
    #[serde(default = "default_strike_threshold")]
    pub threshold: u64,

    /// Trailing window strikes are counted over, in hours
    #[serde(default = "default_window_hours")]
    pub window_hours: i64,

    /// How long a suspension lasts, in hours
    #[serde(default = "default_suspension_hours")]
    pub suspension_hours: i64,
}

impl Default for StrikeConfig {
    fn default() -> Self {
        Self {
            threshold: default_strike_threshold(),
            window_hours: default_window_hours(),
            suspension_hours: default_suspension_hours(),
        }
    }
}

/// Behavioral bullying-pattern detector settings
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BullyingConfig {
    /// Prior blocked events that constitute a pattern
    #[serde(default = "default_bullying_threshold")]
    pub threshold: u64,

    /// Lookback window, in days
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
}

impl Default for BullyingConfig {
    fn default() -> Self {
        Self {
            threshold: default_bullying_threshold(),
            lookback_days: default_lookback_days(),
        }
    }
}

fn default_endpoint() -> String {
    "https://classify.trustline.app".to_string()
}

fn default_text_model() -> String {
    "guard-text-1".to_string()
}

fn default_vision_model() -> String {
    "guard-vision-1".to_string()
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_strike_threshold() -> u64 {
    3
}

fn default_window_hours() -> i64 {
    24
}

fn default_suspension_hours() -> i64 {
    24
}

fn default_bullying_threshold() -> u64 {
    3
}

fn default_lookback_days() -> i64 {
    7
}

fn default_context_window() -> usize {
    5
}

fn default_snippet_chars() -> usize {
    120
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_policy() {
        let config = TrustConfig::default();
        assert_eq!(config.strikes.threshold, 3);
        assert_eq!(config.strikes.window_hours, 24);
        assert_eq!(config.strikes.suspension_hours, 24);
        assert_eq!(config.bullying.threshold, 3);
        assert_eq!(config.bullying.lookback_days, 7);
        assert_eq!(config.classifier.timeout_secs, 5);
        assert_eq!(config.context_window, 5);
        assert_eq!(config.snippet_chars, 120);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let yaml = r#"
classifier:
  endpoint: "https://classify.internal"
strikes:
  threshold: 5
"#;
        let config: TrustConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.classifier.endpoint, "https://classify.internal");
        assert_eq!(config.strikes.threshold, 5);
        assert_eq!(config.strikes.window_hours, 24);
        assert_eq!(config.bullying.lookback_days, 7);
    }

    #[test]
    fn zero_threshold_rejected() {
        let config = TrustConfig {
            strikes: StrikeConfig {
                threshold: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_missing_file_uses_defaults() {
        let config = TrustConfig::load("/nonexistent/trustline.yaml").unwrap();
        assert_eq!(config.strikes.threshold, 3);
    }

    #[test]
    fn load_reads_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "context_window: 8").unwrap();
        let config = TrustConfig::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.context_window, 8);
    }
}
