//! An in-memory keychain backed by a [`Broker`].
//!
//! Secret resolution is synchronous but fetching from the broker is not, so
//! a cache miss starts a fetch on the tokio runtime and answers with a
//! retry condition that settles when the fetch finishes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use peerstate::Keychain;
use peerstate_core::{
    decode_unverified, share_context, CipherKey, EncryptionGroup, IdentityInfo, IdentityUser,
    Keypair, PendingOperation, PublicKey, RetryCondition, SecretKey, SecretResolution,
    SecretResolver, X25519StaticSecret,
};

use crate::broker::{Broker, Session};
use crate::error::{BrokerError, Result};

type CacheKey = (String, String);

/// Opened group secrets, keyed by `(group, key id)`.
///
/// `epoch` advances on every [`clear`](Self::clear). A fetch started under
/// an older epoch may not write into the cache.
#[derive(Default)]
struct SecretCache {
    secrets: RwLock<HashMap<CacheKey, CipherKey>>,
    in_flight: Mutex<HashMap<CacheKey, PendingOperation>>,
    epoch: AtomicU64,
}

impl SecretCache {
    fn get(&self, key: &CacheKey) -> Option<CipherKey> {
        self.secrets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Store `secret` unless the cache was cleared after `epoch`.
    fn insert(&self, epoch: u64, key: CacheKey, secret: CipherKey) -> bool {
        let mut secrets = self.secrets.write().unwrap_or_else(PoisonError::into_inner);
        if self.epoch() != epoch {
            return false;
        }
        secrets.insert(key, secret);
        true
    }

    /// Forget a finished fetch, unless a clear already dropped it.
    fn finish(&self, epoch: u64, key: &CacheKey) {
        let mut in_flight = self.in_flight();
        if self.epoch() == epoch {
            in_flight.remove(key);
        }
    }

    /// Drop every secret and orphan every fetch in flight.
    fn clear(&self) {
        // Lock order: secrets, then in_flight.
        let mut secrets = self.secrets.write().unwrap_or_else(PoisonError::into_inner);
        let mut in_flight = self.in_flight();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        secrets.clear();
        in_flight.clear();
    }

    fn in_flight(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, PendingOperation>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct KeychainState {
    id: String,
    session: Option<Session>,
    keypair: Option<Keypair>,
    share: X25519StaticSecret,
    credential: Option<String>,
}

/// Serializable keychain contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeychainSnapshot {
    pub id: String,
    pub session: Option<Session>,
    /// Hex seed of the signing key.
    pub signing_seed: Option<String>,
    /// Hex bytes of the X25519 secret.
    pub share_secret: String,
    pub credential: Option<String>,
}

/// A keychain holding the local user's keys, credential and group secrets.
pub struct MockKeychain {
    broker: Arc<dyn Broker>,
    server_key: PublicKey,
    state: RwLock<KeychainState>,
    cache: Arc<SecretCache>,
}

impl MockKeychain {
    /// A logged-out keychain talking to `broker`.
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        let server_key = broker.server_public_key();
        Self {
            broker,
            server_key,
            state: RwLock::new(KeychainState {
                id: random_id(),
                session: None,
                keypair: None,
                share: X25519StaticSecret::generate(),
                credential: None,
            }),
            cache: Arc::new(SecretCache::default()),
        }
    }

    /// Identifier of this keychain's copy of every group secret.
    pub fn id(&self) -> String {
        self.read().id.clone()
    }

    pub fn is_logged_in(&self) -> bool {
        self.read().session.is_some()
    }

    pub async fn signup(&self, user_id: &str, password: &str) -> Result<()> {
        self.broker.signup(user_id, password).await
    }

    pub async fn login(&self, user_id: &str, password: &str) -> Result<()> {
        let session = self.broker.login(user_id, password).await?;
        self.write().session = Some(session);
        Ok(())
    }

    /// Drop the session, keys and every cached secret.
    ///
    /// Fetches still running complete their pending operations but discard
    /// what they fetched.
    pub async fn logout(&self) -> Result<()> {
        let session = {
            let mut state = self.write();
            state.keypair = None;
            state.credential = None;
            state.session.take()
        };
        self.cache.clear();
        match session {
            Some(session) => self.broker.logout(&session).await,
            None => Ok(()),
        }
    }

    /// Generate a signing key and have the broker certify it.
    pub async fn new_keypair(&self) -> Result<()> {
        let (session, share_key) = {
            let state = self.read();
            let session = state.session.clone().ok_or(BrokerError::NotLoggedIn)?;
            (session, state.share.public_key())
        };

        let keypair = Keypair::generate();
        let credential = self
            .broker
            .register_keys(&session, keypair.public_key(), share_key)
            .await?;

        let mut state = self.write();
        state.keypair = Some(keypair);
        state.credential = Some(credential);
        Ok(())
    }

    /// Start over with a new keychain id, share key and signing key.
    ///
    /// Secrets fetched under the old id stay cached so earlier actions can
    /// still be read.
    pub async fn rotate_keys(&self) -> Result<()> {
        {
            let mut state = self.write();
            state.id = random_id();
            state.share = X25519StaticSecret::generate();
        }
        self.new_keypair().await
    }

    /// Export everything except cached secrets.
    pub fn snapshot(&self) -> KeychainSnapshot {
        let state = self.read();
        KeychainSnapshot {
            id: state.id.clone(),
            session: state.session.clone(),
            signing_seed: state.keypair.as_ref().map(|k| hex::encode(k.seed())),
            share_secret: hex::encode(state.share.to_bytes()),
            credential: state.credential.clone(),
        }
    }

    /// Rebuild a keychain from a snapshot.
    pub fn restore(broker: Arc<dyn Broker>, snapshot: KeychainSnapshot) -> Result<Self> {
        let keypair = snapshot
            .signing_seed
            .as_deref()
            .map(|seed| decode_32(seed).map(|bytes| Keypair::from_seed(&bytes)))
            .transpose()?;
        let share = X25519StaticSecret::from_bytes(decode_32(&snapshot.share_secret)?);

        let keychain = Self::new(broker);
        *keychain.write() = KeychainState {
            id: snapshot.id,
            session: snapshot.session,
            keypair,
            share,
            credential: snapshot.credential,
        };
        Ok(keychain)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, KeychainState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, KeychainState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start fetching a secret, or join a fetch already in flight.
    fn fetch(&self, key: CacheKey, group: &EncryptionGroup) -> SecretResolution {
        let mut in_flight = self.cache.in_flight();
        if let Some(pending) = in_flight.get(&key) {
            return SecretResolution::Retry(RetryCondition::new(
                format!("secret for {} is being fetched", group),
                pending.clone(),
            ));
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(group = %group, "no async runtime to fetch secret on");
            return SecretResolution::Denied;
        };
        let (credential, share) = {
            let state = self.read();
            match &state.credential {
                Some(credential) => (credential.clone(), state.share.clone()),
                None => return SecretResolution::Denied,
            }
        };

        let (handle, pending) = PendingOperation::channel();
        in_flight.insert(key.clone(), pending.clone());
        let epoch = self.cache.epoch();
        drop(in_flight);

        debug!(group = %group, key_id = %key.1, "fetching group secret");
        let reason = format!("secret for {} is not available yet", group);
        let broker = Arc::clone(&self.broker);
        let cache = Arc::clone(&self.cache);
        let group = group.clone();
        runtime.spawn(async move {
            let fetched = broker
                .shared_secret(&credential, &group, &key.1)
                .await
                .and_then(|sealed| {
                    Ok(sealed.open(&share, &share_context(group.as_str(), &key.1))?)
                });
            match fetched {
                Ok(secret) => {
                    if !cache.insert(epoch, key.clone(), secret) {
                        debug!(group = %group, "discarding secret fetched before logout");
                    }
                }
                Err(e) => warn!(group = %group, error = %e, "failed to fetch group secret"),
            }
            cache.finish(epoch, &key);
            handle.complete();
        });

        SecretResolution::Retry(RetryCondition::new(reason, pending))
    }
}

impl SecretResolver for MockKeychain {
    fn resolve_secret(
        &self,
        group: &EncryptionGroup,
        secret_key_id: Option<&str>,
    ) -> SecretResolution {
        let Some(user) = self.user_info() else {
            return SecretResolution::Denied;
        };
        if !group.contains(&user.id) {
            return SecretResolution::Denied;
        }

        let id = secret_key_id.map_or_else(|| self.id(), str::to_string);
        let key = (group.as_str().to_string(), id.clone());
        match self.cache.get(&key) {
            Some(secret) => SecretResolution::Key(SecretKey { id, secret }),
            None => self.fetch(key, group),
        }
    }
}

impl Keychain for MockKeychain {
    fn server_public_key(&self) -> Option<PublicKey> {
        Some(self.server_key)
    }

    fn signed_public_key(&self) -> Option<String> {
        self.read().credential.clone()
    }

    fn private_key(&self) -> Option<Keypair> {
        self.read().keypair.clone()
    }

    fn user_info(&self) -> Option<IdentityUser> {
        let credential = self.signed_public_key()?;
        decode_unverified::<IdentityInfo>(&credential)
            .ok()
            .map(|info| info.user)
    }
}

fn random_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn decode_32(s: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(s).map_err(|e| BrokerError::Snapshot(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| BrokerError::Snapshot("expected 32 bytes".into()))
}
