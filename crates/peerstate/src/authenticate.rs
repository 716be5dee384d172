//! Verification and decryption of incoming actions.

use tracing::warn;

use peerstate_core::{
    open_token, verify_token, Action, IdentityInfo, Operation, PublicKey, RetryCondition,
    SecretResolution, SecretResolver, TokenError,
};

use crate::error::Result;

/// Outcome of authenticating an incoming action.
#[derive(Debug, Clone)]
pub enum Authentication {
    /// The action is genuine and readable.
    Authenticated {
        sender_id: String,
        operation: Operation,
    },
    /// The group secret is still being provisioned.
    Retry(RetryCondition),
    /// The local party may not read this action.
    Denied,
}

/// Authenticate `action` and recover the operation it carries.
///
/// The sender credential must be signed by `server_key`; the operation token
/// must be signed by the key that credential names. Sealed actions are
/// opened with the group secret from `resolver`.
///
/// # Errors
///
/// Bad credentials or signatures fail with
/// [`PeerStateError::Authentication`](crate::PeerStateError::Authentication);
/// ciphertext that cannot be opened fails with
/// [`PeerStateError::Decryption`](crate::PeerStateError::Decryption).
pub fn authenticate_action(
    action: &Action,
    server_key: &PublicKey,
    resolver: &dyn SecretResolver,
) -> Result<Authentication> {
    let identity: IdentityInfo = verify_token(&action.sender_token, server_key)?;
    let sender_key =
        PublicKey::from_hex(&identity.user.public_key).map_err(|_| TokenError::InvalidPublicKey)?;

    let operation_token = match &action.sealing {
        None => action.operation_token.clone(),
        Some(sealing) => {
            let resolution = resolver
                .resolve_secret(&sealing.encryption_group, sealing.secret_key_id.as_deref());
            let key = match resolution {
                SecretResolution::Key(key) => key,
                SecretResolution::Retry(condition) => return Ok(Authentication::Retry(condition)),
                SecretResolution::Denied => {
                    warn!(
                        sender = %identity.user.id,
                        group = %sealing.encryption_group,
                        "no secret for encryption group, ignoring action"
                    );
                    return Ok(Authentication::Denied);
                }
            };
            open_token(&action.operation_token, &key.secret, &sealing.iv)?
        }
    };

    let operation: Operation = verify_token(&operation_token, &sender_key)?;
    Ok(Authentication::Authenticated {
        sender_id: identity.user.id,
        operation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PeerStateError;
    use crate::testing::Identity;
    use peerstate_core::{CipherKey, EncryptionGroup, PendingOperation, SecretKey};
    use serde_json::json;

    fn no_secrets(_: &EncryptionGroup, _: Option<&str>) -> SecretResolution {
        SecretResolution::Denied
    }

    #[test]
    fn test_plain_action() {
        let bob = Identity::new("bob");
        let op = Operation::add("/public/bob", json!("hi"));
        let action = bob.plain_action(&op);

        match authenticate_action(&action, &bob.server_key(), &no_secrets).unwrap() {
            Authentication::Authenticated {
                sender_id,
                operation,
            } => {
                assert_eq!(sender_id, "bob");
                assert_eq!(operation, op);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_unknown_server_rejected() {
        let bob = Identity::new("bob");
        let other_server = Identity::new("x").server_key();
        let action = bob.plain_action(&Operation::remove("/a"));

        assert!(matches!(
            authenticate_action(&action, &other_server, &no_secrets),
            Err(PeerStateError::Authentication(TokenError::InvalidSignature))
        ));
    }

    #[test]
    fn test_operation_signed_by_someone_else_rejected() {
        let bob = Identity::new("bob");
        let mallory = Identity::with_server("mallory", bob.server.clone());
        let op = Operation::add("/public/bob", json!("forged"));

        // Bob's credential paired with an operation signed by mallory.
        let mut action = bob.plain_action(&op);
        action.operation_token = mallory.plain_action(&op).operation_token;

        assert!(matches!(
            authenticate_action(&action, &bob.server_key(), &no_secrets),
            Err(PeerStateError::Authentication(TokenError::InvalidSignature))
        ));
    }

    #[test]
    fn test_sealed_action_opened_with_group_secret() {
        let bob = Identity::new("bob");
        let secret = CipherKey::from_bytes([3; 16]);
        let op = Operation::add("/group/alice,bob", json!("shh"));
        let action = bob.sealed_action(&op, "alice,bob", &secret);

        let resolver = move |group: &EncryptionGroup, key_id: Option<&str>| {
            assert_eq!(group.as_str(), "alice,bob");
            assert_eq!(key_id, Some("bob"));
            SecretResolution::Key(SecretKey {
                id: "bob".into(),
                secret: secret.clone(),
            })
        };

        assert!(matches!(
            authenticate_action(&action, &bob.server_key(), &resolver).unwrap(),
            Authentication::Authenticated { operation, .. } if operation == op
        ));
    }

    #[test]
    fn test_sealed_action_without_secret_is_denied() {
        let bob = Identity::new("bob");
        let action = bob.sealed_action(
            &Operation::add("/group/alice,bob", json!("shh")),
            "alice,bob",
            &CipherKey::generate(),
        );

        assert!(matches!(
            authenticate_action(&action, &bob.server_key(), &no_secrets).unwrap(),
            Authentication::Denied
        ));
    }

    #[test]
    fn test_pending_secret_is_retry() {
        let bob = Identity::new("bob");
        let action = bob.sealed_action(
            &Operation::add("/group/alice,bob", json!("shh")),
            "alice,bob",
            &CipherKey::generate(),
        );
        let pending = |_: &EncryptionGroup, _: Option<&str>| {
            SecretResolution::Retry(RetryCondition::new(
                "not yet",
                PendingOperation::settled_now(),
            ))
        };

        assert!(matches!(
            authenticate_action(&action, &bob.server_key(), &pending).unwrap(),
            Authentication::Retry(c) if c.error == "not yet"
        ));
    }

    #[test]
    fn test_wrong_secret_fails() {
        let bob = Identity::new("bob");
        let action = bob.sealed_action(
            &Operation::add("/group/alice,bob", json!("shh")),
            "alice,bob",
            &CipherKey::from_bytes([1; 16]),
        );
        let wrong = |_: &EncryptionGroup, _: Option<&str>| {
            SecretResolution::Key(SecretKey {
                id: "bob".into(),
                secret: CipherKey::from_bytes([2; 16]),
            })
        };

        // Garbage plaintext is either non-UTF-8 or not a valid token.
        assert!(matches!(
            authenticate_action(&action, &bob.server_key(), &wrong),
            Err(PeerStateError::Decryption(_)) | Err(PeerStateError::Authentication(_))
        ));
    }
}
