//! Error types for the mock broker and keychain.

use peerstate_core::{ShareError, TokenError};
use thiserror::Error;

/// Errors returned by the mock broker and mock keychain.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("user already exists: {0}")]
    UserExists(String),

    #[error("invalid user or password")]
    InvalidLogin,

    #[error("unknown or expired session")]
    UnknownSession,

    #[error("not logged in")]
    NotLoggedIn,

    #[error("{user} is not a member of {group}")]
    NotAMember { user: String, group: String },

    #[error("no public key registered for {0}")]
    NoShareKey(String),

    #[error("credential error: {0}")]
    Token(#[from] TokenError),

    #[error("secret sharing error: {0}")]
    Share(#[from] ShareError),

    #[error("invalid keychain snapshot: {0}")]
    Snapshot(String),
}

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;
