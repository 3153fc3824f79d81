//! Trustline Core
//!
//! Core types and utilities shared across Trustline components.
//!
//! This crate provides:
//! - Verdict, category, and severity types for moderation decisions
//! - The `ModerationResult` shape returned to every calling surface
//! - Error types and result handling
//! - Configuration loading with environment overrides

pub mod config;
pub mod error;
pub mod types;

pub use config::{BullyingConfig, ClassifierConfig, StrikeConfig, TrustConfig};
pub use error::{Error, Result};
pub use types::{Category, ImageSurface, ModerationResult, Severity, Surface, Verdict};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::TrustConfig;
    pub use crate::error::{Error, Result};
    pub use crate::types::{Category, ImageSurface, ModerationResult, Severity, Surface, Verdict};
}
