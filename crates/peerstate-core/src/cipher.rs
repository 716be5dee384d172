//! Operation token stream cipher.
//!
//! Sealed operation tokens use AES-128 in OFB mode with a fresh 128-bit
//! nonce per action. Ciphertext travels as lowercase hex. OFB carries no
//! authentication tag: integrity comes from the signature inside the token,
//! which is verified after opening.

use aes::Aes128;
use ofb::cipher::{KeyIvInit, StreamCipher};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CipherError;

type Aes128Ofb = ofb::Ofb<Aes128>;

/// A 128-bit group secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherKey(#[serde(with = "hex")] [u8; 16]);

impl CipherKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, CipherError> {
        decode_16(s).map(Self)
    }
}

impl fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CipherKey(..)")
    }
}

/// A 128-bit OFB nonce.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Iv([u8; 16]);

impl Iv {
    /// Generate a new random nonce.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, CipherError> {
        decode_16(s).map(Self)
    }
}

impl fmt::Debug for Iv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Iv({})", self.to_hex())
    }
}

/// Encrypt a token, returning hex ciphertext.
pub fn seal_token(token: &str, key: &CipherKey, iv: &Iv) -> Result<String, CipherError> {
    let mut buf = token.as_bytes().to_vec();
    keystream(key, iv)?.apply_keystream(&mut buf);
    Ok(hex::encode(buf))
}

/// Decrypt hex ciphertext back into a token.
pub fn open_token(ciphertext: &str, key: &CipherKey, iv: &Iv) -> Result<String, CipherError> {
    let mut buf = hex::decode(ciphertext).map_err(|e| CipherError::InvalidHex(e.to_string()))?;
    keystream(key, iv)?.apply_keystream(&mut buf);
    String::from_utf8(buf).map_err(|_| CipherError::InvalidPlaintext)
}

fn keystream(key: &CipherKey, iv: &Iv) -> Result<Aes128Ofb, CipherError> {
    Aes128Ofb::new_from_slices(&key.0, &iv.0).map_err(|_| CipherError::InvalidLength)
}

fn decode_16(s: &str) -> Result<[u8; 16], CipherError> {
    let bytes = hex::decode(s).map_err(|e| CipherError::InvalidHex(e.to_string()))?;
    bytes.try_into().map_err(|_| CipherError::InvalidLength)
}
