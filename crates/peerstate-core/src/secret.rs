//! The secret-resolution contract and its retry sentinel.
//!
//! Decisions in peerstate are synchronous. When a group secret has not been
//! provisioned yet, a resolver answers with a [`RetryCondition`] carrying a
//! [`PendingOperation`]; the caller awaits it and repeats the whole call.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::cipher::CipherKey;
use crate::types::EncryptionGroup;

/// A symmetric key for one encryption group.
///
/// `id` names the party whose copy of the group secret this is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretKey {
    pub id: String,
    pub secret: CipherKey,
}

/// Outcome of asking for a group secret.
#[derive(Debug, Clone)]
pub enum SecretResolution {
    /// The secret is available.
    Key(SecretKey),
    /// Not yet; retry after the pending operation settles.
    Retry(RetryCondition),
    /// This party will never get the secret.
    Denied,
}

/// Resolves group secrets on behalf of the core.
///
/// Implementations must tolerate being called repeatedly for the same group
/// while a retry loop waits for provisioning.
pub trait SecretResolver: Send + Sync {
    /// Resolve the secret for `group`. `secret_key_id` selects another
    /// party's copy; `None` selects the caller's own.
    fn resolve_secret(
        &self,
        group: &EncryptionGroup,
        secret_key_id: Option<&str>,
    ) -> SecretResolution;
}

impl<F> SecretResolver for F
where
    F: Fn(&EncryptionGroup, Option<&str>) -> SecretResolution + Send + Sync,
{
    fn resolve_secret(
        &self,
        group: &EncryptionGroup,
        secret_key_id: Option<&str>,
    ) -> SecretResolution {
        self(group, secret_key_id)
    }
}

/// A decision that cannot be made until `pending` settles.
#[derive(Debug, Clone)]
pub struct RetryCondition {
    /// Why the decision is pending.
    pub error: String,
    /// Settles once the dependency is available (or has given up).
    pub pending: PendingOperation,
}

impl RetryCondition {
    pub fn new(error: impl Into<String>, pending: PendingOperation) -> Self {
        Self {
            error: error.into(),
            pending,
        }
    }
}

/// An awaitable handle on in-flight provisioning.
///
/// Cloneable; every clone settles together.
#[derive(Debug, Clone)]
pub struct PendingOperation {
    done: Option<watch::Receiver<bool>>,
}

/// Completes a [`PendingOperation`]. Dropping it also settles the operation.
#[derive(Debug)]
pub struct PendingHandle {
    done: watch::Sender<bool>,
}

impl PendingOperation {
    /// Create an unsettled operation and the handle that completes it.
    pub fn channel() -> (PendingHandle, PendingOperation) {
        let (tx, rx) = watch::channel(false);
        (PendingHandle { done: tx }, PendingOperation { done: Some(rx) })
    }

    /// An operation that is already settled.
    pub fn settled_now() -> Self {
        Self { done: None }
    }

    /// Whether the operation has settled.
    pub fn is_settled(&self) -> bool {
        match &self.done {
            None => true,
            Some(rx) => *rx.borrow() || rx.has_changed().is_err(),
        }
    }

    /// Wait until the operation settles.
    pub async fn settled(&self) {
        if let Some(rx) = &self.done {
            let mut rx = rx.clone();
            // A dropped handle counts as settled.
            let _ = rx.wait_for(|done| *done).await;
        }
    }
}

impl PendingHandle {
    /// Mark the operation as settled, waking every waiter.
    pub fn complete(self) {
        self.done.send_replace(true);
    }
}
