//! # peerstate
//!
//! Shared JSON state between mutually distrusting peers.
//!
//! ## Overview
//!
//! Peers exchange [`Action`]s: JSON-Patch operations signed by the sender,
//! wrapped with a server-issued identity credential, and sealed for an
//! encryption group when a policy asks for it. Every peer decides locally
//! whether to apply an action, from declarative per-path rules.
//!
//! - **Ingest**: [`PeerState::next_state`] authenticates, decrypts,
//!   authorizes and applies an action.
//! - **Produce**: [`PeerState::sign`] signs an operation and seals it if an
//!   encryption rule matches.
//! - **Waiting**: secrets are provisioned asynchronously. The synchronous
//!   calls answer with a [`RetryCondition`]; [`WithRetries`] awaits it.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use peerstate::{
//!     AuthorizationRules, EncryptionRules, InternalState, Keychain, Operation, PeerState,
//!     PeerStateConfig,
//! };
//! use serde_json::{json, Value};
//!
//! async fn example<K: Keychain>(keychain: Arc<K>) -> peerstate::Result<()> {
//!     let authorization = AuthorizationRules::<Value>::new()
//!         .rule("/public/:userId/:rest*", |ctx| {
//!             ctx.params.get("userId") == Some(ctx.sender_id)
//!         })?;
//!
//!     let peer = PeerState::new(
//!         authorization,
//!         EncryptionRules::new(),
//!         keychain,
//!         PeerStateConfig::default(),
//!     )
//!     .with_retries();
//!
//!     let state = InternalState::new(json!({"public": {}}));
//!     let op = Operation::add("/public/bob", json!("hello from bob"));
//!     if let Some(action) = peer.sign(&state, &op).await? {
//!         let state = peer.next_state(&state, &action).await?;
//!         assert_eq!(state.document["public"]["bob"], "hello from bob");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `peerstate::core` - Patches, pointers, tokens, ciphers
//! - `peerstate::policy` - Path patterns and rule tables

pub mod authenticate;
pub mod config;
pub mod error;
pub mod keychain;
pub mod peer;
pub mod retry;

#[cfg(test)]
mod testing;

// Re-export component crates
pub use peerstate_core as core;
pub use peerstate_policy as policy;

pub use authenticate::{authenticate_action, Authentication};
pub use config::{PeerStateConfig, RetryConfig};
pub use error::{PeerStateError, Result};
pub use keychain::Keychain;
pub use peer::{InternalState, PeerState, SignOutcome};
pub use retry::WithRetries;

// Re-export commonly used types
pub use peerstate_core::{
    Action, EncryptionGroup, IdentityInfo, IdentityUser, Keypair, OpKind, Operation, PublicKey,
    RetryCondition, SecretKey, SecretResolution, SecretResolver,
};
pub use peerstate_policy::{
    Authorization, AuthorizationMode, AuthorizationRules, Denial, EncryptionRules, PathMatch,
    SealOutcome, Verdict,
};
