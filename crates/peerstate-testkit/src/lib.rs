//! # peerstate testkit
//!
//! Testing utilities for peerstate.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Broker**: [`MockBroker`], an in-memory credential and group-secret
//!   server
//! - **Keychain**: [`MockKeychain`], a client keychain that fetches secrets
//!   from a broker in the background
//! - **Fixtures**: [`TestPeer`] and ready-made rule tables
//! - **Generators**: Proptest strategies for property-based testing
//!
//! ## Test Fixtures
//!
//! ```rust
//! use peerstate::Operation;
//! use peerstate_testkit::fixtures::{public_only, TestPeer};
//! use peerstate_testkit::MockBroker;
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let broker = MockBroker::new();
//! let bob = TestPeer::join(&broker, "bob", public_only(), json!({"public": {}})).await.unwrap();
//! let mut alice = TestPeer::join(&broker, "alice", public_only(), json!({"public": {}})).await.unwrap();
//!
//! let action = bob
//!     .sign(&Operation::add("/public/bob", json!("hi")))
//!     .await
//!     .unwrap()
//!     .unwrap();
//! alice.receive(&action).await.unwrap();
//! assert_eq!(alice.document()["public"]["bob"], "hi");
//! # }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use peerstate_testkit::generators::json_value;
//!
//! proptest! {
//!     #[test]
//!     fn serializes(value in json_value(3)) {
//!         prop_assert!(serde_json::to_string(&value).is_ok());
//!     }
//! }
//! ```

pub mod broker;
pub mod error;
pub mod fixtures;
pub mod generators;
pub mod keychain;

pub use broker::{Broker, MockBroker, Session, TokenOptions};
pub use error::{BrokerError, Result};
pub use fixtures::TestPeer;
pub use keychain::{KeychainSnapshot, MockKeychain};
