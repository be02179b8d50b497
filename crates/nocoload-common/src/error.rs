//! Error types for nocoload

use thiserror::Error;

/// Result type alias for nocoload operations
pub type Result<T> = std::result::Result<T, NocoError>;

/// Main error type for nocoload
#[derive(Error, Debug)]
pub enum NocoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Missing or malformed configuration; always raised before any fetch
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),
}

impl NocoError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Whether this error must abort the run before any network activity
    pub fn is_fatal_config(&self) -> bool {
        matches!(self, NocoError::Config(_))
    }
}
