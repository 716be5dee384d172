//! Error types for peerstate core.

use thiserror::Error;

/// Errors raised while parsing a JSON pointer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PointerError {
    #[error("pointer must be empty or start with '/': {0:?}")]
    MissingLeadingSlash(String),

    #[error("invalid escape sequence in pointer {0:?}")]
    InvalidEscape(String),
}

/// Errors raised while applying a patch operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    #[error("invalid pointer: {0}")]
    InvalidPointer(#[from] PointerError),

    #[error("path not found: {0}")]
    PathNotFound(String),

    #[error("cannot address into a scalar at {0}")]
    NotAContainer(String),

    #[error("invalid array index {index:?} at {path}")]
    InvalidIndex { path: String, index: String },

    #[error("array index {index} out of bounds (len {len}) at {path}")]
    IndexOutOfBounds { path: String, index: usize, len: usize },

    #[error("test operation failed at {0}")]
    TestFailed(String),

    #[error("refusing to modify reserved slot {segment:?} in {path}")]
    ReservedSegment { path: String, segment: String },

    #[error("cannot move {from} into its own child {path}")]
    MoveIntoChild { from: String, path: String },

    #[error("document validation failed: {0}")]
    Validation(String),
}

/// Errors raised while issuing or verifying a signed token.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("token expired at {expired_at} (now {now})")]
    Expired { expired_at: i64, now: i64 },

    #[error("invalid token payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Errors raised by the operation token stream cipher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CipherError {
    #[error("invalid key or iv length")]
    InvalidLength,

    #[error("ciphertext is not valid hex: {0}")]
    InvalidHex(String),

    #[error("decrypted token is not valid UTF-8")]
    InvalidPlaintext,
}

/// Errors raised while sealing or opening a shared secret.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShareError {
    #[error("encryption error: {0}")]
    Encryption(String),

    #[error("decryption error: {0}")]
    Decryption(String),

    #[error("invalid secret length: expected 16, got {0}")]
    InvalidLength(usize),
}
