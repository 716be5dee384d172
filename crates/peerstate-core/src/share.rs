//! Sealed delivery of group secrets.
//!
//! A broker hands a group secret to a member by sealing it to the member's
//! X25519 key: an ephemeral ECDH agreement, a Blake3-derived wrap key bound
//! to the `(group, key id)` context, and ChaCha20-Poly1305 over the secret.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use crate::cipher::CipherKey;
use crate::error::ShareError;

/// An X25519 public key (32 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct X25519PublicKey(pub [u8; 32]);

impl X25519PublicKey {
    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    fn to_dalek(self) -> PublicKey {
        PublicKey::from(self.0)
    }
}

impl From<PublicKey> for X25519PublicKey {
    fn from(pk: PublicKey) -> Self {
        Self(*pk.as_bytes())
    }
}

/// An X25519 static secret held by a keychain.
#[derive(Clone)]
pub struct X25519StaticSecret(StaticSecret);

impl X25519StaticSecret {
    /// Generate a new random secret.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(StaticSecret::from(bytes))
    }

    /// Create from seed bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(StaticSecret::from(bytes))
    }

    /// Get the raw bytes.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Derive the public key.
    pub fn public_key(&self) -> X25519PublicKey {
        X25519PublicKey::from(PublicKey::from(&self.0))
    }
}

/// A group secret sealed to one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedSecret {
    /// Sender's side of the ECDH agreement.
    pub ephemeral_public: X25519PublicKey,

    /// ChaCha20-Poly1305 nonce.
    pub nonce: [u8; 12],

    /// The encrypted secret, including the authentication tag.
    pub ciphertext: Vec<u8>,
}

impl SealedSecret {
    /// Seal `secret` for `recipient`, bound to `context`.
    pub fn seal(
        secret: &CipherKey,
        recipient: &X25519PublicKey,
        context: &[u8],
    ) -> Result<Self, ShareError> {
        let ephemeral = EphemeralSecret::random_from_rng(rand::thread_rng());
        let ephemeral_public = X25519PublicKey::from(PublicKey::from(&ephemeral));
        let shared = ephemeral.diffie_hellman(&recipient.to_dalek());

        let mut nonce = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = wrap_cipher(shared.as_bytes(), context)
            .encrypt(Nonce::from_slice(&nonce), secret.as_bytes().as_slice())
            .map_err(|e| ShareError::Encryption(e.to_string()))?;

        Ok(Self {
            ephemeral_public,
            nonce,
            ciphertext,
        })
    }

    /// Open the sealed secret with the recipient's static secret.
    pub fn open(
        &self,
        recipient: &X25519StaticSecret,
        context: &[u8],
    ) -> Result<CipherKey, ShareError> {
        let shared = recipient.0.diffie_hellman(&self.ephemeral_public.to_dalek());

        let bytes = wrap_cipher(shared.as_bytes(), context)
            .decrypt(Nonce::from_slice(&self.nonce), self.ciphertext.as_slice())
            .map_err(|e| ShareError::Decryption(e.to_string()))?;

        let arr: [u8; 16] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| ShareError::InvalidLength(bytes.len()))?;
        Ok(CipherKey::from_bytes(arr))
    }
}

fn wrap_cipher(shared: &[u8; 32], context: &[u8]) -> ChaCha20Poly1305 {
    let mut hasher = blake3::Hasher::new_derive_key("peerstate-v0-secret-share");
    hasher.update(shared);
    hasher.update(context);
    ChaCha20Poly1305::new(hasher.finalize().as_bytes().into())
}

/// Context bytes binding a sealed secret to its group and key id.
pub fn share_context(group: &str, key_id: &str) -> Vec<u8> {
    let mut context = Vec::with_capacity(group.len() + key_id.len() + 1);
    context.extend_from_slice(group.as_bytes());
    context.push(0);
    context.extend_from_slice(key_id.as_bytes());
    context
}
