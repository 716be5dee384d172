//! The credential and secret broker.
//!
//! The broker is the only server in a peerstate deployment. It issues
//! identity credentials binding a user id to a signing key, and it hands
//! out group secrets to group members. It never sees document contents.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use peerstate_core::{
    share_context, sign_token, token::now_secs, verify_token, CipherKey, EncryptionGroup,
    IdentityInfo, IdentityUser, Keypair, PublicKey, SealedSecret, X25519PublicKey,
};

use crate::error::{BrokerError, Result};

/// A logged-in session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub token: String,
}

/// Credential issuance options.
#[derive(Debug, Clone)]
pub struct TokenOptions {
    /// Lifetime of issued credentials. `None` issues credentials that
    /// never expire.
    pub ttl: Option<Duration>,
}

impl Default for TokenOptions {
    fn default() -> Self {
        Self {
            ttl: Some(Duration::from_secs(365 * 24 * 60 * 60)),
        }
    }
}

/// Server side of a keychain.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Broker: Send + Sync {
    /// Key that verifies every credential this broker issues.
    fn server_public_key(&self) -> PublicKey;

    /// Create an account.
    async fn signup(&self, user_id: &str, password: &str) -> Result<()>;

    /// Open a session.
    async fn login(&self, user_id: &str, password: &str) -> Result<Session>;

    /// Close a session.
    async fn logout(&self, session: &Session) -> Result<()>;

    /// Register the session user's keys and issue an identity credential
    /// for `signing_key`. Secrets are delivered sealed to `share_key`.
    async fn register_keys(
        &self,
        session: &Session,
        signing_key: PublicKey,
        share_key: X25519PublicKey,
    ) -> Result<String>;

    /// Fetch, or create on first request, the secret for `(group, key_id)`,
    /// sealed to the credential holder.
    async fn shared_secret(
        &self,
        credential: &str,
        group: &EncryptionGroup,
        key_id: &str,
    ) -> Result<SealedSecret>;
}

#[derive(Debug)]
struct UserRecord {
    password: String,
    share_key: Option<X25519PublicKey>,
}

/// An in-memory broker.
pub struct MockBroker {
    keypair: Keypair,
    options: TokenOptions,
    users: RwLock<HashMap<String, UserRecord>>,
    sessions: RwLock<HashMap<String, String>>,
    secrets: RwLock<HashMap<(String, String), CipherKey>>,
}

impl MockBroker {
    /// Create a broker with a fresh server key.
    pub fn new() -> Arc<Self> {
        Self::with_options(TokenOptions::default())
    }

    pub fn with_options(options: TokenOptions) -> Arc<Self> {
        Arc::new(Self {
            keypair: Keypair::generate(),
            options,
            users: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            secrets: RwLock::new(HashMap::new()),
        })
    }

    /// Sign an identity credential for `user`.
    pub fn issue_credential(&self, user: &IdentityUser, expires_at: Option<i64>) -> Result<String> {
        let info = IdentityInfo { user: user.clone() };
        Ok(sign_token(&info, &self.keypair, expires_at)?)
    }

    /// Number of group secrets created so far.
    pub async fn secret_count(&self) -> usize {
        self.secrets.read().await.len()
    }

    async fn session_user(&self, session: &Session) -> Result<String> {
        match self.sessions.read().await.get(&session.token) {
            Some(user_id) if *user_id == session.user_id => Ok(user_id.clone()),
            _ => Err(BrokerError::UnknownSession),
        }
    }
}

#[async_trait]
impl Broker for MockBroker {
    fn server_public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    async fn signup(&self, user_id: &str, password: &str) -> Result<()> {
        let mut users = self.users.write().await;
        if users.contains_key(user_id) {
            return Err(BrokerError::UserExists(user_id.to_string()));
        }
        users.insert(
            user_id.to_string(),
            UserRecord {
                password: password.to_string(),
                share_key: None,
            },
        );
        info!(user = user_id, "user signed up");
        Ok(())
    }

    async fn login(&self, user_id: &str, password: &str) -> Result<Session> {
        let valid = self
            .users
            .read()
            .await
            .get(user_id)
            .is_some_and(|user| user.password == password);
        if !valid {
            return Err(BrokerError::InvalidLogin);
        }

        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = hex::encode(bytes);
        self.sessions
            .write()
            .await
            .insert(token.clone(), user_id.to_string());

        Ok(Session {
            user_id: user_id.to_string(),
            token,
        })
    }

    async fn logout(&self, session: &Session) -> Result<()> {
        self.sessions.write().await.remove(&session.token);
        Ok(())
    }

    async fn register_keys(
        &self,
        session: &Session,
        signing_key: PublicKey,
        share_key: X25519PublicKey,
    ) -> Result<String> {
        let user_id = self.session_user(session).await?;

        self.users
            .write()
            .await
            .get_mut(&user_id)
            .ok_or(BrokerError::UnknownSession)?
            .share_key = Some(share_key);

        let expires_at = self
            .options
            .ttl
            .map(|ttl| now_secs().saturating_add(ttl.as_secs() as i64));
        let credential = self.issue_credential(
            &IdentityUser {
                id: user_id.clone(),
                public_key: signing_key.to_hex(),
            },
            expires_at,
        )?;

        info!(user = %user_id, key = %signing_key, "issued identity credential");
        Ok(credential)
    }

    async fn shared_secret(
        &self,
        credential: &str,
        group: &EncryptionGroup,
        key_id: &str,
    ) -> Result<SealedSecret> {
        let identity: IdentityInfo = verify_token(credential, &self.keypair.public_key())?;
        let user_id = identity.user.id;
        if !group.contains(&user_id) {
            return Err(BrokerError::NotAMember {
                user: user_id,
                group: group.to_string(),
            });
        }

        let share_key = self
            .users
            .read()
            .await
            .get(&user_id)
            .and_then(|user| user.share_key)
            .ok_or_else(|| BrokerError::NoShareKey(user_id.clone()))?;

        let secret = {
            let mut secrets = self.secrets.write().await;
            secrets
                .entry((group.as_str().to_string(), key_id.to_string()))
                .or_insert_with(|| {
                    info!(group = %group, key_id, "created group secret");
                    CipherKey::generate()
                })
                .clone()
        };

        Ok(SealedSecret::seal(
            &secret,
            &share_key,
            &share_context(group.as_str(), key_id),
        )?)
    }
}
