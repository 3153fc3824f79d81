//! Error types for Trustline

/// Result type alias using Trustline's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Trustline operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Classifier adapter errors (transport, bad status, unparsable verdict)
    #[error("classifier error: {0}")]
    Classifier(String),

    /// Datastore errors (event log, trust profiles, notifications)
    #[error("store error: {0}")]
    Store(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Network/IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Timeout errors
    #[error("operation timed out")]
    Timeout,

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new classifier error
    pub fn classifier(msg: impl Into<String>) -> Self {
        Self::Classifier(msg.into())
    }

    /// Create a new store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error came from the external classifier path and the
    /// pipeline should fail open instead of surfacing it.
    pub fn is_fail_open(&self) -> bool {
        matches!(self, Self::Classifier(_) | Self::Timeout)
    }
}
