//! Error types for the policy module.

use thiserror::Error;

/// Errors that can occur while building or evaluating policies.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A path pattern could not be compiled.
    #[error("invalid path pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// The document could not be viewed as JSON.
    #[error("document serialization error: {0}")]
    Document(#[from] serde_json::Error),

    /// Sealing an operation token failed.
    #[error("encryption error: {0}")]
    Encryption(#[from] peerstate_core::CipherError),
}

/// Result type for policy operations.
pub type Result<T> = std::result::Result<T, PolicyError>;
