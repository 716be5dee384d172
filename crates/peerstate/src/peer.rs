//! The peer state machine.
//!
//! [`PeerState`] composes authentication, authorization, patch application
//! and encryption into two synchronous entry points: [`PeerState::next_state`]
//! ingests an action and [`PeerState::sign`] produces one. Neither blocks;
//! a pending secret surfaces as a [`RetryCondition`] for
//! [`WithRetries`] to wait on.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use peerstate_core::{
    apply_operation_with, sign_token, Action, Operation, PatchError, RetryCondition, Validator,
};
use peerstate_policy::{Authorization, AuthorizationRules, EncryptionRules, SealOutcome};

use crate::authenticate::{authenticate_action, Authentication};
use crate::config::PeerStateConfig;
use crate::error::{PeerStateError, Result};
use crate::keychain::Keychain;
use crate::retry::WithRetries;

/// A document plus an optional in-flight retry marker.
#[derive(Debug, Clone)]
pub struct InternalState<T> {
    pub document: T,
    pub retry_condition: Option<RetryCondition>,
}

impl<T> InternalState<T> {
    pub fn new(document: T) -> Self {
        Self {
            document,
            retry_condition: None,
        }
    }

    /// Whether a decision is waiting on a secret.
    pub fn is_pending(&self) -> bool {
        self.retry_condition.is_some()
    }

    pub fn into_document(self) -> T {
        self.document
    }

    fn with_retry(&self, condition: RetryCondition) -> Self
    where
        T: Clone,
    {
        Self {
            document: self.document.clone(),
            retry_condition: Some(condition),
        }
    }

    /// The same document with any retry marker dropped.
    pub fn cleared(&self) -> Self
    where
        T: Clone,
    {
        Self::new(self.document.clone())
    }
}

/// Result of signing an outgoing operation.
#[derive(Debug, Clone)]
pub enum SignOutcome {
    /// The action to send, sealed if a rule asked for it.
    Action(Action),
    /// The group secret is still being provisioned.
    Retry(RetryCondition),
    /// The local party may not hold the group secret.
    Denied,
}

/// One peer's view of a shared document of type `T`.
pub struct PeerState<T, K> {
    authorization: AuthorizationRules<T>,
    encryption: EncryptionRules<T>,
    keychain: Arc<K>,
    config: PeerStateConfig,
    validator: Option<Box<Validator>>,
}

impl<T, K> PeerState<T, K>
where
    T: Serialize + DeserializeOwned + Clone,
    K: Keychain,
{
    /// Create a peer. `config.authorization` is the only mode a peer uses;
    /// a different mode set on `authorization` is replaced.
    pub fn new(
        authorization: AuthorizationRules<T>,
        encryption: EncryptionRules<T>,
        keychain: Arc<K>,
        config: PeerStateConfig,
    ) -> Self {
        if authorization.mode() != config.authorization {
            debug!(
                rules = ?authorization.mode(),
                config = ?config.authorization,
                "authorization mode replaced by peer config"
            );
        }
        Self {
            authorization: authorization.with_mode(config.authorization),
            encryption,
            keychain,
            config,
            validator: None,
        }
    }

    /// Check the raw document before every patch.
    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Value, &Operation) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        self.validator = Some(Box::new(validator));
        self
    }

    pub fn keychain(&self) -> &Arc<K> {
        &self.keychain
    }

    pub fn config(&self) -> &PeerStateConfig {
        &self.config
    }

    /// Wrap this peer so pending secrets are awaited instead of returned.
    pub fn with_retries(self) -> WithRetries<T, K> {
        WithRetries::new(self)
    }

    /// Ingest `action`, returning the next state.
    ///
    /// Unreadable and unauthorized actions leave the state unchanged. A
    /// pending secret attaches a retry condition; the caller must retry
    /// with the same input.
    pub fn next_state(
        &self,
        state: &InternalState<T>,
        action: Option<&Action>,
    ) -> Result<InternalState<T>> {
        let Some(action) = action else {
            return Ok(state.clone());
        };

        let server_key = self
            .keychain
            .server_public_key()
            .ok_or(PeerStateError::ServerKeyUnavailable)?;

        let (sender_id, operation) =
            match authenticate_action(action, &server_key, &*self.keychain)? {
                Authentication::Authenticated {
                    sender_id,
                    operation,
                } => (sender_id, operation),
                Authentication::Retry(condition) => return Ok(state.with_retry(condition)),
                Authentication::Denied => return Ok(state.clone()),
            };

        let operation = match self
            .authorization
            .authorize(&state.document, &sender_id, &operation)?
        {
            Authorization::Authorized(operation) => operation,
            Authorization::Denied(denial) => {
                warn!(
                    sender = %sender_id,
                    op = %operation.kind(),
                    path = operation.path(),
                    reason = %denial,
                    "rejected unauthorized action"
                );
                return Ok(state.clone());
            }
        };

        let current = serde_json::to_value(&state.document)?;
        let next = apply_operation_with(&current, &operation, self.validator.as_deref())?;
        // The typed document is the final shape check.
        let document =
            serde_json::from_value(next).map_err(|e| PatchError::Validation(e.to_string()))?;

        Ok(InternalState::new(document))
    }

    /// Sign `operation` as the local user, sealing it if a rule asks.
    pub fn sign(&self, state: &InternalState<T>, operation: &Operation) -> Result<SignOutcome> {
        let sender_token = self
            .keychain
            .signed_public_key()
            .ok_or(PeerStateError::SigningUnavailable("no identity credential"))?;
        let keypair = self
            .keychain
            .private_key()
            .ok_or(PeerStateError::SigningUnavailable("no private key"))?;
        let user = self
            .keychain
            .user_info()
            .ok_or(PeerStateError::SigningUnavailable("no user info"))?;

        let token = sign_token(operation, &keypair, None).map_err(PeerStateError::Signing)?;
        let action = Action::new(sender_token, token);

        let outcome = self.encryption.seal(
            &state.document,
            action,
            operation,
            &user.id,
            &*self.keychain,
        )?;
        Ok(match outcome {
            SealOutcome::Plain(action) | SealOutcome::Sealed(action) => SignOutcome::Action(action),
            SealOutcome::Retry(condition) => SignOutcome::Retry(condition),
            SealOutcome::Denied => {
                warn!(path = operation.path(), "no secret for encryption group, not signing");
                SignOutcome::Denied
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Identity, StaticKeychain};
    use peerstate_core::{
        CipherKey, EncryptionGroup, PendingOperation, SecretKey, SecretResolution, TokenError,
    };
    use peerstate_policy::AuthorizationMode;
    use serde::Deserialize;
    use serde_json::json;

    fn public_rules() -> AuthorizationRules<Value> {
        AuthorizationRules::new()
            .rule("/public/:userId/:rest*", |ctx| {
                ctx.params.get("userId") == Some(ctx.sender_id)
            })
            .unwrap()
    }

    fn group_rules() -> (AuthorizationRules<Value>, EncryptionRules<Value>) {
        let authorization = AuthorizationRules::new()
            .rule("/group/:groupId/:rest*", |ctx| {
                ctx.params
                    .get("groupId")
                    .is_some_and(|ids| ids.split(',').any(|id| id == ctx.sender_id))
            })
            .unwrap();
        let encryption = EncryptionRules::new()
            .rule("/group/:groupId/:rest*", |ctx| {
                ctx.params
                    .get("groupId")
                    .map(|ids| ids.split(',').map(str::to_string).collect())
            })
            .unwrap();
        (authorization, encryption)
    }

    fn shared_secret(
        secret: CipherKey,
        members: &'static [&'static str],
        me: &'static str,
    ) -> impl Fn(&EncryptionGroup, Option<&str>) -> SecretResolution + Send + Sync {
        move |group: &EncryptionGroup, key_id: Option<&str>| {
            if !group.contains(me) || members.iter().any(|m| !group.contains(m)) {
                return SecretResolution::Denied;
            }
            SecretResolution::Key(SecretKey {
                id: key_id.unwrap_or(me).to_string(),
                secret: secret.clone(),
            })
        }
    }

    fn deny_all(_: &EncryptionGroup, _: Option<&str>) -> SecretResolution {
        SecretResolution::Denied
    }

    fn sign_plain<K: Keychain>(peer: &PeerState<Value, K>, op: &Operation) -> Action {
        match peer.sign(&InternalState::new(json!({})), op).unwrap() {
            SignOutcome::Action(action) => action,
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_round_trip_public_write() {
        let bob = Identity::new("bob");
        let alice = Identity::with_server("alice", bob.server.clone());

        let bob_peer = PeerState::new(
            public_rules(),
            EncryptionRules::new(),
            bob.keychain(deny_all),
            PeerStateConfig::default(),
        );
        let alice_peer = PeerState::new(
            public_rules(),
            EncryptionRules::new(),
            alice.keychain(deny_all),
            PeerStateConfig::default(),
        );

        let op = Operation::add("/public/bob", json!("hello from bob"));
        let action = sign_plain(&bob_peer, &op);
        assert!(!action.is_sealed());

        let state = InternalState::new(json!({"public": {}}));
        let next = alice_peer.next_state(&state, Some(&action)).unwrap();
        assert_eq!(next.document, json!({"public": {"bob": "hello from bob"}}));
        assert!(!next.is_pending());
        // Input untouched.
        assert_eq!(state.document, json!({"public": {}}));
    }

    #[test]
    fn test_absent_action_is_noop() {
        let bob = Identity::new("bob");
        let peer = PeerState::new(
            public_rules(),
            EncryptionRules::new(),
            bob.keychain(deny_all),
            PeerStateConfig::default(),
        );
        let state = InternalState::new(json!({"a": 1}));
        assert_eq!(peer.next_state(&state, None).unwrap().document, state.document);
    }

    #[test]
    fn test_unauthorized_action_leaves_state() {
        let bob = Identity::new("bob");
        let eve = Identity::with_server("eve", bob.server.clone());
        let bob_peer = PeerState::new(
            public_rules(),
            EncryptionRules::new(),
            bob.keychain(deny_all),
            PeerStateConfig::default(),
        );
        let eve_peer = PeerState::new(
            public_rules(),
            EncryptionRules::new(),
            eve.keychain(deny_all),
            PeerStateConfig::default(),
        );

        let action = sign_plain(&eve_peer, &Operation::add("/public/bob", json!("pwned")));
        let state = InternalState::new(json!({"public": {"bob": "mine"}}));
        let next = bob_peer.next_state(&state, Some(&action)).unwrap();
        assert_eq!(next.document, state.document);
    }

    #[test]
    fn test_encrypted_group_write() {
        let secret = CipherKey::generate();
        let bob = Identity::new("bob");
        let alice = Identity::with_server("alice", bob.server.clone());
        let eve = Identity::with_server("eve", bob.server.clone());

        let peer = |identity: &Identity, me: &'static str| {
            let (authorization, encryption) = group_rules();
            PeerState::new(
                authorization,
                encryption,
                identity.keychain(shared_secret(secret.clone(), &["alice", "bob"], me)),
                PeerStateConfig::default(),
            )
        };
        let bob_peer = peer(&bob, "bob");
        let alice_peer = peer(&alice, "alice");
        let eve_peer = peer(&eve, "eve");

        let op = Operation::add("/group/alice,bob", json!("shh alice this is a secret"));
        let action = sign_plain(&bob_peer, &op);
        let sealing = action.sealing.as_ref().expect("action should be sealed");
        assert_eq!(sealing.encryption_group.as_str(), "alice,bob");
        assert_eq!(sealing.secret_key_id.as_deref(), Some("bob"));

        let state = InternalState::new(json!({"group": {}}));
        let expected = json!({"group": {"alice,bob": "shh alice this is a secret"}});
        assert_eq!(
            alice_peer.next_state(&state, Some(&action)).unwrap().document,
            expected
        );
        assert_eq!(
            bob_peer.next_state(&state, Some(&action)).unwrap().document,
            expected
        );
        assert_eq!(
            eve_peer.next_state(&state, Some(&action)).unwrap().document,
            json!({"group": {}})
        );
    }

    #[test]
    fn test_pending_secret_attaches_retry_condition() {
        let bob = Identity::new("bob");
        let (authorization, encryption) = group_rules();
        let keychain = bob.keychain(|_, _| {
            SecretResolution::Retry(RetryCondition::new(
                "provisioning",
                PendingOperation::settled_now(),
            ))
        });
        let peer = PeerState::new(authorization, encryption, keychain, PeerStateConfig::default());

        let op = Operation::add("/group/alice,bob", json!("x"));
        assert!(matches!(
            peer.sign(&InternalState::new(json!({"group": {}})), &op).unwrap(),
            SignOutcome::Retry(_)
        ));

        let action = bob.sealed_action(&op, "alice,bob", &CipherKey::generate());
        let next = peer
            .next_state(&InternalState::new(json!({"group": {}})), Some(&action))
            .unwrap();
        assert!(next.is_pending());
        assert_eq!(next.document, json!({"group": {}}));
    }

    #[test]
    fn test_success_clears_retry_condition() {
        let bob = Identity::new("bob");
        let peer = PeerState::new(
            public_rules(),
            EncryptionRules::new(),
            bob.keychain(deny_all),
            PeerStateConfig::default(),
        );
        let mut state = InternalState::new(json!({"public": {}}));
        state.retry_condition = Some(RetryCondition::new(
            "stale",
            PendingOperation::settled_now(),
        ));

        let action = sign_plain(&peer, &Operation::add("/public/bob", json!(1)));
        assert!(!peer.next_state(&state, Some(&action)).unwrap().is_pending());
    }

    #[test]
    fn test_signing_requires_login() {
        let bob = Identity::new("bob");
        let peer = PeerState::new(
            public_rules(),
            EncryptionRules::<Value>::new(),
            StaticKeychain::logged_out(bob.server_key()),
            PeerStateConfig::default(),
        );
        assert!(matches!(
            peer.sign(&InternalState::new(json!({})), &Operation::remove("/a")),
            Err(PeerStateError::SigningUnavailable(_))
        ));
    }

    #[test]
    fn test_group_secret_denied_on_sign() {
        let bob = Identity::new("bob");
        let (authorization, encryption) = group_rules();
        let peer = PeerState::new(
            authorization,
            encryption,
            bob.keychain(deny_all),
            PeerStateConfig::default(),
        );
        let op = Operation::add("/group/alice,bob", json!("x"));
        assert!(matches!(
            peer.sign(&InternalState::new(json!({"group": {}})), &op).unwrap(),
            SignOutcome::Denied
        ));
    }

    #[test]
    fn test_forged_credential_is_an_error() {
        let bob = Identity::new("bob");
        // Eve issues her own credential with a server key nobody trusts.
        let eve = Identity::new("eve");
        let peer = PeerState::new(
            public_rules(),
            EncryptionRules::new(),
            bob.keychain(deny_all),
            PeerStateConfig::default(),
        );

        let action = eve.plain_action(&Operation::add("/public/eve", json!(1)));
        assert!(matches!(
            peer.next_state(&InternalState::new(json!({"public": {}})), Some(&action)),
            Err(PeerStateError::Authentication(TokenError::InvalidSignature))
        ));
    }

    #[test]
    fn test_patch_errors_propagate() {
        let bob = Identity::new("bob");
        let peer = PeerState::new(
            public_rules(),
            EncryptionRules::new(),
            bob.keychain(deny_all),
            PeerStateConfig::default(),
        );
        let action = sign_plain(&peer, &Operation::replace("/public/bob", json!(1)));
        assert!(matches!(
            peer.next_state(&InternalState::new(json!({"public": {}})), Some(&action)),
            Err(PeerStateError::Patch(PatchError::PathNotFound(_)))
        ));
    }

    #[test]
    fn test_typed_document_shape_is_checked() {
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        struct Doc {
            count: u32,
        }

        let bob = Identity::new("bob");
        let rules = AuthorizationRules::<Doc>::new()
            .rule("/count", |_| true)
            .unwrap();
        let peer = PeerState::new(
            rules,
            EncryptionRules::new(),
            bob.keychain(deny_all),
            PeerStateConfig::default(),
        );
        let state = InternalState::new(Doc { count: 1 });

        let ok = bob.plain_action(&Operation::replace("/count", json!(2)));
        assert_eq!(
            peer.next_state(&state, Some(&ok)).unwrap().document,
            Doc { count: 2 }
        );

        let bad = bob.plain_action(&Operation::replace("/count", json!("two")));
        assert!(matches!(
            peer.next_state(&state, Some(&bad)),
            Err(PeerStateError::Patch(PatchError::Validation(_)))
        ));
    }

    #[test]
    fn test_validator_runs_before_apply() {
        let bob = Identity::new("bob");
        let peer = PeerState::new(
            public_rules(),
            EncryptionRules::new(),
            bob.keychain(deny_all),
            PeerStateConfig::default(),
        )
        .with_validator(|_, op| {
            if op.value().is_some_and(Value::is_null) {
                Err("null values are not allowed".into())
            } else {
                Ok(())
            }
        });

        let action = bob.plain_action(&Operation::add("/public/bob", Value::Null));
        assert!(matches!(
            peer.next_state(&InternalState::new(json!({"public": {}})), Some(&action)),
            Err(PeerStateError::Patch(PatchError::Validation(_)))
        ));
    }

    #[test]
    fn test_config_mode_overrides_rules() {
        let bob = Identity::new("bob");
        let rules = AuthorizationRules::<Value>::new()
            .rule("/notes/:id", |_| false)
            .unwrap()
            .rule("/notes/:id", |_| true)
            .unwrap();
        let peer = PeerState::new(
            rules,
            EncryptionRules::new(),
            bob.keychain(deny_all),
            PeerStateConfig::default().with_authorization(AuthorizationMode::Strict),
        );

        let action = bob.plain_action(&Operation::add("/notes/1", json!("x")));
        let state = InternalState::new(json!({"notes": {}}));
        assert_eq!(
            peer.next_state(&state, Some(&action)).unwrap().document,
            state.document
        );
    }

    #[test]
    fn test_rules_mode_yields_to_default_config() {
        let bob = Identity::new("bob");
        let rules = AuthorizationRules::<Value>::new()
            .with_mode(AuthorizationMode::Strict)
            .rule("/notes/:id", |_| false)
            .unwrap()
            .rule("/notes/:id", |_| true)
            .unwrap();
        let peer = PeerState::new(
            rules,
            EncryptionRules::new(),
            bob.keychain(deny_all),
            PeerStateConfig::default(),
        );
        assert_eq!(peer.config().authorization, AuthorizationMode::LastMatchWins);

        let action = bob.plain_action(&Operation::add("/notes/1", json!("x")));
        let state = InternalState::new(json!({"notes": {}}));
        assert_eq!(
            peer.next_state(&state, Some(&action)).unwrap().document,
            json!({"notes": {"1": "x"}})
        );
    }
}
