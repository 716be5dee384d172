//! Peer configuration.

use std::time::Duration;

use peerstate_policy::AuthorizationMode;

/// Configuration for a [`PeerState`](crate::PeerState).
#[derive(Debug, Clone, Default)]
pub struct PeerStateConfig {
    /// How matching authorization rules are combined.
    pub authorization: AuthorizationMode,
    /// Retry behavior of [`WithRetries`](crate::WithRetries).
    pub retry: RetryConfig,
}

impl PeerStateConfig {
    pub fn with_authorization(mut self, mode: AuthorizationMode) -> Self {
        self.authorization = mode;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Bounds on waiting for secrets to be provisioned.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt. Total attempts are `max_retries + 1`.
    pub max_retries: usize,
    /// Extra pause after a pending operation settles.
    pub retry_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            retry_delay: Duration::ZERO,
        }
    }
}

impl RetryConfig {
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Total number of attempts the retry loop makes.
    pub fn attempts(&self) -> usize {
        self.max_retries.saturating_add(1)
    }
}
