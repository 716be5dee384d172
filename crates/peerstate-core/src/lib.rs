//! # peerstate core
//!
//! Pure primitives shared by every peer: JSON patch application and
//! flattening, JSON pointers, signed tokens, and the ciphers that seal
//! operations and deliver group secrets.
//!
//! This crate performs no I/O. The only asynchronous piece is
//! [`PendingOperation`], the awaitable half of a [`RetryCondition`].
//!
//! ## Key Types
//!
//! - [`Action`] - The envelope peers exchange
//! - [`Operation`] - A JSON-Patch entry, signed into an action
//! - [`EncryptionGroup`] - Canonical key naming who may read a sealed action
//! - [`SecretResolver`] - The contract for obtaining group secrets
//!
//! ## Token Format
//!
//! Identity credentials and operation tokens are `<claims-hex>.<sig-hex>`
//! with an Ed25519 signature. See [`token`].

pub mod cipher;
pub mod crypto;
pub mod error;
pub mod patch;
pub mod pointer;
pub mod secret;
pub mod share;
pub mod token;
pub mod types;

pub use cipher::{open_token, seal_token, CipherKey, Iv};
pub use crypto::{Keypair, PublicKey, Signature};
pub use error::{CipherError, PatchError, PointerError, ShareError, TokenError};
pub use patch::{apply_operation, apply_operation_with, flatten, Validator};
pub use pointer::JsonPointer;
pub use secret::{
    PendingHandle, PendingOperation, RetryCondition, SecretKey, SecretResolution, SecretResolver,
};
pub use share::{share_context, SealedSecret, X25519PublicKey, X25519StaticSecret};
pub use token::{decode_unverified, sign_token, verify_token, verify_token_at};
pub use types::{Action, EncryptionGroup, IdentityInfo, IdentityUser, OpKind, Operation, Sealing};
