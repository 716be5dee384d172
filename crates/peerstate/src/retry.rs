//! Awaiting pending secrets around the synchronous peer state machine.
//!
//! [`WithRetries`] repeats a [`PeerState`] call while it answers with a
//! [`RetryCondition`], waiting for the condition's pending operation between
//! attempts. Each attempt starts again from the caller's original input.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error};

use peerstate_core::{Action, Operation, RetryCondition};

use crate::error::{PeerStateError, Result};
use crate::keychain::Keychain;
use crate::peer::{InternalState, PeerState, SignOutcome};

enum Attempt<O> {
    Done(O),
    Pending(RetryCondition),
}

/// A [`PeerState`] whose calls wait for secrets instead of returning
/// retry conditions.
pub struct WithRetries<T, K> {
    inner: PeerState<T, K>,
}

impl<T, K> WithRetries<T, K>
where
    T: Serialize + DeserializeOwned + Clone,
    K: Keychain,
{
    pub fn new(inner: PeerState<T, K>) -> Self {
        Self { inner }
    }

    /// The wrapped synchronous peer.
    pub fn inner(&self) -> &PeerState<T, K> {
        &self.inner
    }

    pub fn into_inner(self) -> PeerState<T, K> {
        self.inner
    }

    /// Ingest `action`, waiting for any secret it needs.
    ///
    /// # Errors
    ///
    /// Fails with [`PeerStateError::MaxRetriesExceeded`] if the secret is
    /// still pending after the last attempt, and with whatever
    /// [`PeerState::next_state`] raises otherwise.
    pub async fn next_state(
        &self,
        state: &InternalState<T>,
        action: &Action,
    ) -> Result<InternalState<T>> {
        let start = state.cleared();
        self.run(|| {
            let mut next = self.inner.next_state(&start, Some(action))?;
            Ok(match next.retry_condition.take() {
                Some(condition) => Attempt::Pending(condition),
                None => Attempt::Done(next),
            })
        })
        .await
    }

    /// Sign `operation`, waiting for any group secret it needs.
    ///
    /// Returns `None` if the local party may not hold the group secret.
    pub async fn sign(
        &self,
        state: &InternalState<T>,
        operation: &Operation,
    ) -> Result<Option<Action>> {
        self.run(|| {
            Ok(match self.inner.sign(state, operation)? {
                SignOutcome::Action(action) => Attempt::Done(Some(action)),
                SignOutcome::Denied => Attempt::Done(None),
                SignOutcome::Retry(condition) => Attempt::Pending(condition),
            })
        })
        .await
    }

    async fn run<O, F>(&self, mut attempt: F) -> Result<O>
    where
        F: FnMut() -> Result<Attempt<O>>,
    {
        let retry = &self.inner.config().retry;
        let attempts = retry.attempts();
        let mut last_error = String::new();

        for n in 1..=attempts {
            let condition = match attempt()? {
                Attempt::Done(out) => return Ok(out),
                Attempt::Pending(condition) => condition,
            };
            last_error = condition.error;

            if n < attempts {
                debug!(attempt = n, of = attempts, error = %last_error, "waiting for pending secret");
                condition.pending.settled().await;
                if !retry.retry_delay.is_zero() {
                    tokio::time::sleep(retry.retry_delay).await;
                }
            }
        }

        error!(attempts, error = %last_error, "max retries exceeded");
        Err(PeerStateError::MaxRetriesExceeded {
            attempts,
            last_error,
        })
    }
}
