//! Retry bookkeeping for the session loop.
//!
//! The hub is a single fixed endpoint on the local network, so retries use
//! a constant delay rather than backoff. An optional cap ends the loop
//! after that many consecutive failed connection attempts.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::types::ReconnectConfig;

/// Attempt counter for [`crate::SessionManager::run`].
#[derive(Debug)]
pub(crate) struct RetryState {
    config: ReconnectConfig,
    attempt: u32,
    failures: u32,
}

impl RetryState {
    pub(crate) fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt: 0,
            failures: 0,
        }
    }

    /// Number of the attempt about to start, counted since the last
    /// successful session.
    pub(crate) fn next_attempt(&mut self) -> u32 {
        self.attempt = self.attempt.saturating_add(1);
        self.attempt
    }

    pub(crate) fn record_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
    }

    /// Called once a session is established.
    pub(crate) fn reset(&mut self) {
        self.attempt = 0;
        self.failures = 0;
    }

    pub(crate) fn failures(&self) -> u32 {
        self.failures
    }

    pub(crate) fn exhausted(&self) -> bool {
        self.config
            .max_attempts
            .is_some_and(|max| self.failures >= max)
    }

    pub(crate) fn delay(&self) -> Duration {
        self.config.delay
    }
}

/// Sleeps for `delay`. Returns `false` if cancelled first.
pub(crate) async fn wait_before_retry(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => {
            debug!("reconnect wait cancelled");
            false
        }
        _ = tokio::time::sleep(delay) => true,
    }
}
