//! Error types for peer state transitions.

use peerstate_core::{CipherError, PatchError, TokenError};
use peerstate_policy::PolicyError;
use thiserror::Error;

/// Errors that can occur while ingesting or producing actions.
///
/// Authorization denials are not errors; they leave the state unchanged.
#[derive(Debug, Error)]
pub enum PeerStateError {
    /// The sender credential or operation signature did not verify.
    #[error("authentication failed: {0}")]
    Authentication(#[from] TokenError),

    /// A sealed operation token could not be decrypted.
    #[error("decryption failed: {0}")]
    Decryption(#[from] CipherError),

    /// The operation could not be applied to the document.
    #[error("patch application failed: {0}")]
    Patch(#[from] PatchError),

    /// Policy evaluation failed.
    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),

    /// The document does not round-trip through JSON.
    #[error("document error: {0}")]
    Document(#[from] serde_json::Error),

    /// The keychain has no server key to verify credentials against.
    #[error("server public key is not available")]
    ServerKeyUnavailable,

    /// The local keypair failed to produce an operation token.
    #[error("failed to sign operation: {0}")]
    Signing(TokenError),

    /// The keychain cannot sign yet (not logged in, or no keypair).
    #[error("signing unavailable: {0}")]
    SigningUnavailable(&'static str),

    /// A secret was still pending after every retry.
    #[error("max retries exceeded after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: usize, last_error: String },
}

/// Result type for peer state operations.
pub type Result<T> = std::result::Result<T, PeerStateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signing_failure_is_not_an_authentication_failure() {
        let cause = || TokenError::Malformed("not an object".into());
        let err = PeerStateError::Signing(cause());

        assert!(!matches!(err, PeerStateError::Authentication(_)));
        assert_eq!(
            err.to_string(),
            "failed to sign operation: malformed token: not an object"
        );
        assert!(matches!(
            PeerStateError::from(cause()),
            PeerStateError::Authentication(_)
        ));
    }
}
