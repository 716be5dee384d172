//! Proptest generators for property-based testing.

use proptest::prelude::*;
use serde_json::{Map, Value};

use peerstate_core::{CipherKey, Iv, Keypair};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

pub fn cipher_key() -> impl Strategy<Value = CipherKey> {
    any::<[u8; 16]>().prop_map(CipherKey::from_bytes)
}

pub fn iv() -> impl Strategy<Value = Iv> {
    any::<[u8; 16]>().prop_map(Iv::from_bytes)
}

/// A user identifier. Never contains the `,` group separator.
pub fn user_id() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,15}".prop_map(String::from)
}

/// Between one and `max` user identifiers, possibly repeated.
pub fn user_ids(max: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(user_id(), 1..=max.max(1))
}

/// An object key, including characters that need pointer escaping.
pub fn object_key() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => "[a-z]{1,8}".prop_map(String::from),
        1 => "[a-z~/]{1,6}".prop_map(String::from),
        1 => Just(String::new()),
    ]
}

/// A terminal JSON value.
pub fn json_leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[ -~]{0,12}".prop_map(Value::String),
    ]
}

/// A JSON value nested up to `depth` levels, with empty containers.
pub fn json_value(depth: u32) -> impl Strategy<Value = Value> {
    json_leaf().prop_recursive(depth, 64, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map(object_key(), inner, 0..4)
                .prop_map(|entries| Value::Object(entries.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

/// A JSON object, the shape peer documents take.
pub fn json_object(depth: u32) -> impl Strategy<Value = Value> {
    prop::collection::btree_map(object_key(), json_value(depth), 0..4)
        .prop_map(|entries| Value::Object(entries.into_iter().collect()))
}
