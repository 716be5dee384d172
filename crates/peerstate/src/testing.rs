//! Unit-test identities and an in-place keychain.

use std::sync::Arc;

use peerstate_core::{
    seal_token, sign_token, Action, CipherKey, EncryptionGroup, IdentityInfo, IdentityUser, Iv,
    Keypair, Operation, PublicKey, Sealing, SecretResolution, SecretResolver,
};

use crate::keychain::Keychain;

type Resolve = dyn Fn(&EncryptionGroup, Option<&str>) -> SecretResolution + Send + Sync;

/// A user with a credential issued by `server`.
#[derive(Clone)]
pub struct Identity {
    pub id: String,
    pub server: Keypair,
    pub keypair: Keypair,
    pub credential: String,
}

impl Identity {
    pub fn new(id: &str) -> Self {
        Self::with_server(id, Keypair::generate())
    }

    pub fn with_server(id: &str, server: Keypair) -> Self {
        let keypair = Keypair::generate();
        let info = IdentityInfo {
            user: IdentityUser {
                id: id.to_string(),
                public_key: keypair.public_key().to_hex(),
            },
        };
        let credential = sign_token(&info, &server, None).unwrap();
        Self {
            id: id.to_string(),
            server,
            keypair,
            credential,
        }
    }

    pub fn server_key(&self) -> PublicKey {
        self.server.public_key()
    }

    pub fn plain_action(&self, operation: &Operation) -> Action {
        Action::new(
            self.credential.clone(),
            sign_token(operation, &self.keypair, None).unwrap(),
        )
    }

    pub fn sealed_action(&self, operation: &Operation, group: &str, secret: &CipherKey) -> Action {
        let iv = Iv::generate();
        let token = sign_token(operation, &self.keypair, None).unwrap();
        Action {
            sender_token: self.credential.clone(),
            operation_token: seal_token(&token, secret, &iv).unwrap(),
            sealing: Some(Sealing {
                encryption_group: EncryptionGroup::from_wire(group),
                iv,
                secret_key_id: Some(self.id.clone()),
            }),
        }
    }

    /// A keychain for this identity answering secrets with `resolve`.
    pub fn keychain<F>(&self, resolve: F) -> Arc<StaticKeychain>
    where
        F: Fn(&EncryptionGroup, Option<&str>) -> SecretResolution + Send + Sync + 'static,
    {
        Arc::new(StaticKeychain {
            identity: Some(self.clone()),
            server_key: self.server_key(),
            resolve: Box::new(resolve),
        })
    }
}

/// A keychain with fixed contents.
pub struct StaticKeychain {
    pub identity: Option<Identity>,
    pub server_key: PublicKey,
    resolve: Box<Resolve>,
}

impl StaticKeychain {
    /// A keychain that trusts `server_key` but is not logged in.
    pub fn logged_out(server_key: PublicKey) -> Arc<Self> {
        Arc::new(Self {
            identity: None,
            server_key,
            resolve: Box::new(|_, _| SecretResolution::Denied),
        })
    }
}

impl SecretResolver for StaticKeychain {
    fn resolve_secret(
        &self,
        group: &EncryptionGroup,
        secret_key_id: Option<&str>,
    ) -> SecretResolution {
        (self.resolve)(group, secret_key_id)
    }
}

impl Keychain for StaticKeychain {
    fn server_public_key(&self) -> Option<PublicKey> {
        Some(self.server_key)
    }

    fn signed_public_key(&self) -> Option<String> {
        self.identity.as_ref().map(|i| i.credential.clone())
    }

    fn private_key(&self) -> Option<Keypair> {
        self.identity.as_ref().map(|i| i.keypair.clone())
    }

    fn user_info(&self) -> Option<IdentityUser> {
        self.identity.as_ref().map(|i| IdentityUser {
            id: i.id.clone(),
            public_key: i.keypair.public_key().to_hex(),
        })
    }
}
