//! Test fixtures and helpers.
//!
//! A [`TestPeer`] is one user with a [`MockKeychain`] and a retrying
//! [`PeerState`] over a JSON document. Peers built from the same
//! [`MockBroker`] trust each other's credentials and share group secrets.

use std::sync::Arc;

use serde_json::Value;

use peerstate::{
    Action, AuthorizationRules, EncryptionRules, InternalState, Operation, PeerState,
    PeerStateConfig, WithRetries,
};

use crate::broker::MockBroker;
use crate::error::Result;
use crate::keychain::MockKeychain;

/// Password every fixture user signs up with.
pub const PASSWORD: &str = "correct horse battery staple";

/// One logged-in user and their view of the shared document.
pub struct TestPeer {
    pub id: String,
    pub keychain: Arc<MockKeychain>,
    pub peer: WithRetries<Value, MockKeychain>,
    pub state: InternalState<Value>,
}

impl TestPeer {
    /// Sign up, log in and register keys for `id`.
    pub async fn join(
        broker: &Arc<MockBroker>,
        id: &str,
        rules: (AuthorizationRules<Value>, EncryptionRules<Value>),
        document: Value,
    ) -> Result<Self> {
        Self::join_with(broker, id, rules, document, PeerStateConfig::default()).await
    }

    pub async fn join_with(
        broker: &Arc<MockBroker>,
        id: &str,
        (authorization, encryption): (AuthorizationRules<Value>, EncryptionRules<Value>),
        document: Value,
        config: PeerStateConfig,
    ) -> Result<Self> {
        let keychain = Arc::new(MockKeychain::new(broker.clone()));
        keychain.signup(id, PASSWORD).await?;
        keychain.login(id, PASSWORD).await?;
        keychain.new_keypair().await?;

        let peer = PeerState::new(authorization, encryption, keychain.clone(), config);
        Ok(Self {
            id: id.to_string(),
            keychain,
            peer: peer.with_retries(),
            state: InternalState::new(document),
        })
    }

    /// Sign `operation` against the current document.
    pub async fn sign(&self, operation: &Operation) -> peerstate::Result<Option<Action>> {
        self.peer.sign(&self.state, operation).await
    }

    /// Ingest `action` and keep the resulting state.
    pub async fn receive(&mut self, action: &Action) -> peerstate::Result<()> {
        self.state = self.peer.next_state(&self.state, action).await?;
        Ok(())
    }

    pub fn document(&self) -> &Value {
        &self.state.document
    }
}

/// Each user may write under `/public/<their id>`.
pub fn public_rules() -> AuthorizationRules<Value> {
    AuthorizationRules::new()
        .rule("/public/:userId/:rest*", |ctx| {
            ctx.params.get("userId") == Some(ctx.sender_id)
        })
        .expect("static pattern")
}

/// `/group/<a,b,...>` is writable by and encrypted to the listed members.
pub fn group_rules() -> (AuthorizationRules<Value>, EncryptionRules<Value>) {
    let authorization = AuthorizationRules::new()
        .rule("/group/:groupId/:rest*", |ctx| {
            ctx.params
                .get("groupId")
                .is_some_and(|ids| ids.split(',').any(|id| id == ctx.sender_id))
        })
        .expect("static pattern");
    let encryption = EncryptionRules::new()
        .rule("/group/:groupId/:rest*", |ctx| {
            ctx.params
                .get("groupId")
                .map(|ids| ids.split(',').map(str::to_string).collect())
        })
        .expect("static pattern");
    (authorization, encryption)
}

/// Public writes only, nothing encrypted.
pub fn public_only() -> (AuthorizationRules<Value>, EncryptionRules<Value>) {
    (public_rules(), EncryptionRules::new())
}

/// Join `ids` to `broker` with fresh rules from `rules` and the same
/// starting document.
pub async fn peers<F>(
    broker: &Arc<MockBroker>,
    ids: &[&str],
    rules: F,
    document: Value,
) -> Result<Vec<TestPeer>>
where
    F: Fn() -> (AuthorizationRules<Value>, EncryptionRules<Value>),
{
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        out.push(TestPeer::join(broker, id, rules(), document.clone()).await?);
    }
    Ok(out)
}
