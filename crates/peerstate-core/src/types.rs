//! Wire types shared by every peer.
//!
//! [`Action`] is the envelope peers exchange; [`Operation`] is the JSON
//! patch entry it carries (signed, and possibly sealed).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

use crate::cipher::Iv;

/// A JSON-Patch operation (RFC 6902 subset).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Operation {
    Add { path: String, value: Value },
    Remove { path: String },
    Replace { path: String, value: Value },
    Test { path: String, value: Value },
    Move { from: String, path: String },
    Copy { from: String, path: String },
}

/// Discriminator for [`Operation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Add,
    Remove,
    Replace,
    Test,
    Move,
    Copy,
}

impl OpKind {
    /// The wire name of this kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            OpKind::Add => "add",
            OpKind::Remove => "remove",
            OpKind::Replace => "replace",
            OpKind::Test => "test",
            OpKind::Move => "move",
            OpKind::Copy => "copy",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Operation {
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        Operation::Add {
            path: path.into(),
            value,
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Operation::Remove { path: path.into() }
    }

    pub fn replace(path: impl Into<String>, value: Value) -> Self {
        Operation::Replace {
            path: path.into(),
            value,
        }
    }

    pub fn test(path: impl Into<String>, value: Value) -> Self {
        Operation::Test {
            path: path.into(),
            value,
        }
    }

    /// The kind of this operation.
    pub fn kind(&self) -> OpKind {
        match self {
            Operation::Add { .. } => OpKind::Add,
            Operation::Remove { .. } => OpKind::Remove,
            Operation::Replace { .. } => OpKind::Replace,
            Operation::Test { .. } => OpKind::Test,
            Operation::Move { .. } => OpKind::Move,
            Operation::Copy { .. } => OpKind::Copy,
        }
    }

    /// The target path.
    pub fn path(&self) -> &str {
        match self {
            Operation::Add { path, .. }
            | Operation::Remove { path }
            | Operation::Replace { path, .. }
            | Operation::Test { path, .. }
            | Operation::Move { path, .. }
            | Operation::Copy { path, .. } => path,
        }
    }

    /// The carried value, for `add`, `replace` and `test`.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Operation::Add { value, .. }
            | Operation::Replace { value, .. }
            | Operation::Test { value, .. } => Some(value),
            _ => None,
        }
    }

    /// The source path, for `move` and `copy`.
    pub fn from(&self) -> Option<&str> {
        match self {
            Operation::Move { from, .. } | Operation::Copy { from, .. } => Some(from),
            _ => None,
        }
    }

    /// A copy of this operation aimed at `path`. `value` replaces the carried
    /// value for kinds that have one; other kinds ignore it.
    pub fn retarget(&self, path: String, value: Option<Value>) -> Operation {
        match self {
            Operation::Add { value: own, .. } => Operation::Add {
                path,
                value: value.unwrap_or_else(|| own.clone()),
            },
            Operation::Replace { value: own, .. } => Operation::Replace {
                path,
                value: value.unwrap_or_else(|| own.clone()),
            },
            Operation::Test { value: own, .. } => Operation::Test {
                path,
                value: value.unwrap_or_else(|| own.clone()),
            },
            Operation::Remove { .. } => Operation::Remove { path },
            Operation::Move { from, .. } => Operation::Move {
                from: from.clone(),
                path,
            },
            Operation::Copy { from, .. } => Operation::Copy {
                from: from.clone(),
                path,
            },
        }
    }
}

/// The canonical key of an encryption group.
///
/// Member identifiers, deduplicated and sorted, joined with `,`. Every
/// participant derives the same string independently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptionGroup(String);

impl EncryptionGroup {
    /// Derive the canonical group for `recipients`, always including `sender`.
    pub fn canonical<I, S>(recipients: I, sender: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut members: BTreeSet<String> = recipients
            .into_iter()
            .map(|id| id.as_ref().to_string())
            .collect();
        members.insert(sender.to_string());

        Self(members.into_iter().collect::<Vec<_>>().join(","))
    }

    /// Wrap a group key received on the wire as-is.
    pub fn from_wire(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The group key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterate over member identifiers.
    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.0.split(',').filter(|id| !id.is_empty())
    }

    /// Whether `id` is a member.
    pub fn contains(&self, id: &str) -> bool {
        self.members().any(|member| member == id)
    }
}

impl fmt::Display for EncryptionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Encryption metadata of a sealed [`Action`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealing {
    /// Canonical group whose secret sealed the token.
    pub encryption_group: EncryptionGroup,

    /// Nonce used for the stream cipher.
    pub iv: Iv,

    /// Which party's copy of the group secret to use.
    pub secret_key_id: Option<String>,
}

/// The wire envelope exchanged between peers.
///
/// `sealing` is present iff `operation_token` is ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ActionWire", into = "ActionWire")]
pub struct Action {
    /// Server-issued identity credential of the sender.
    pub sender_token: String,

    /// The signed operation, plaintext or hex ciphertext.
    pub operation_token: String,

    /// Encryption metadata, if sealed.
    pub sealing: Option<Sealing>,
}

impl Action {
    /// A plaintext action.
    pub fn new(sender_token: impl Into<String>, operation_token: impl Into<String>) -> Self {
        Self {
            sender_token: sender_token.into(),
            operation_token: operation_token.into(),
            sealing: None,
        }
    }

    /// Whether the operation token is ciphertext.
    pub fn is_sealed(&self) -> bool {
        self.sealing.is_some()
    }

    /// The encryption group, if sealed.
    pub fn encryption_group(&self) -> Option<&EncryptionGroup> {
        self.sealing.as_ref().map(|s| &s.encryption_group)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActionWire {
    sender_token: String,
    operation_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    encryption_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    secret_key_id: Option<String>,
}

impl TryFrom<ActionWire> for Action {
    type Error = String;

    fn try_from(wire: ActionWire) -> Result<Self, Self::Error> {
        let sealing = match (wire.encryption_group, wire.iv) {
            (Some(group), Some(iv)) => Some(Sealing {
                encryption_group: EncryptionGroup::from_wire(group),
                iv: Iv::from_hex(&iv).map_err(|e| format!("invalid iv: {e}"))?,
                secret_key_id: wire.secret_key_id,
            }),
            (None, None) => None,
            _ => return Err("encryptionGroup and iv must be present together".into()),
        };
        Ok(Action {
            sender_token: wire.sender_token,
            operation_token: wire.operation_token,
            sealing,
        })
    }
}

impl From<Action> for ActionWire {
    fn from(action: Action) -> Self {
        let (encryption_group, iv, secret_key_id) = match action.sealing {
            Some(s) => (
                Some(s.encryption_group.0),
                Some(s.iv.to_hex()),
                s.secret_key_id,
            ),
            None => (None, None, None),
        };
        ActionWire {
            sender_token: action.sender_token,
            operation_token: action.operation_token,
            encryption_group,
            iv,
            secret_key_id,
        }
    }
}

/// The user carried by an identity credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityUser {
    /// Stable user identifier.
    pub id: String,

    /// Hex Ed25519 key that signs this user's operations.
    pub public_key: String,
}

/// Payload of a server-issued identity credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityInfo {
    pub user: IdentityUser,
}
