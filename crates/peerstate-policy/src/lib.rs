//! # peerstate policy
//!
//! Declarative, per-path policy tables evaluated locally by every peer.
//!
//! ## Overview
//!
//! Peers never trust a server to validate writes. Instead each peer carries
//! two ordered tables keyed by [`PathPattern`]:
//!
//! - [`AuthorizationRules`] decide whether an incoming operation may be
//!   applied. Operations are checked leaf by leaf.
//! - [`EncryptionRules`] decide whether an outgoing operation must be sealed,
//!   and for which encryption group.
//!
//! ## Usage
//!
//! ```rust
//! use peerstate_policy::{AuthorizationRules, EncryptionRules};
//! use serde_json::Value;
//!
//! let authorization = AuthorizationRules::<Value>::new()
//!     .rule("/public/:userId/:rest*", |ctx| {
//!         ctx.params.get("userId") == Some(ctx.sender_id)
//!     })
//!     .unwrap();
//!
//! let encryption = EncryptionRules::<Value>::new()
//!     .rule("/group/:groupId/:rest*", |ctx| {
//!         ctx.params
//!             .get("groupId")
//!             .map(|ids| ids.split(',').map(str::to_string).collect())
//!     })
//!     .unwrap();
//! # let _ = (authorization, encryption);
//! ```

pub mod authorization;
pub mod encryption;
pub mod error;
pub mod pattern;

pub use authorization::{
    Authorization, AuthorizationMode, AuthorizationRules, Denial, RuleContext, Verdict,
};
pub use encryption::{EncryptionContext, EncryptionRules, SealOutcome};
pub use error::{PolicyError, Result};
pub use pattern::{ParamValue, PathMatch, PathPattern};
