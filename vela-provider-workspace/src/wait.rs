//! Polling until a remote object reaches a target status

use std::future::Future;
use std::time::Duration;

use log::debug;
use serde_json::Value as JsonValue;
use tokio::time::Instant;
use vela_core::provider::{ErrorKind, ProviderError, ProviderResult};

use crate::config::ProviderConfig;

/// Result of one refresh: the latest object (if any) and its status
pub type Refresh = (Option<JsonValue>, String);

/// Polls a refresh function until it reports a target status.
#[derive(Debug, Clone)]
pub struct StateWaiter {
    pub pending: Vec<String>,
    pub target: Vec<String>,
    pub timeout: Duration,
    /// Sleep before the first refresh
    pub delay: Duration,
    pub poll_interval: Duration,
    /// Consecutive target observations required
    pub continuous_target_occurence: u32,
}

impl StateWaiter {
    pub fn new(pending: &[&str], target: &[&str], timeout: Duration) -> Self {
        Self {
            pending: pending.iter().map(|s| s.to_string()).collect(),
            target: target.iter().map(|s| s.to_string()).collect(),
            timeout,
            delay: Duration::ZERO,
            poll_interval: Duration::from_secs(10),
            continuous_target_occurence: 1,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_continuous_target(mut self, occurrences: u32) -> Self {
        self.continuous_target_occurence = occurrences.max(1);
        self
    }

    /// Apply the configured poll override to the delay and interval
    pub fn for_config(mut self, config: &ProviderConfig) -> Self {
        if let Some(poll) = config.poll_interval {
            self.delay = self.delay.min(poll);
            self.poll_interval = poll;
        }
        self
    }

    /// Run `refresh` until a target status is seen often enough.
    ///
    /// Fails on a status that is neither pending nor target, on a refresh
    /// error, or when the timeout elapses.
    pub async fn wait<F, Fut>(&self, mut refresh: F) -> ProviderResult<Option<JsonValue>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProviderResult<Refresh>>,
    {
        let deadline = Instant::now() + self.timeout;
        let mut seen_target = 0u32;

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        loop {
            let (object, status) = refresh().await?;
            debug!("waiter observed status '{}'", status);

            if self.target.iter().any(|t| *t == status) {
                seen_target += 1;
                if seen_target >= self.continuous_target_occurence {
                    return Ok(object);
                }
            } else if self.pending.iter().any(|p| *p == status) {
                seen_target = 0;
            } else {
                return Err(ProviderError::new(format!(
                    "unexpected state '{}', wanted target '{}'",
                    status,
                    self.target.join(", ")
                )));
            }

            if Instant::now() + self.poll_interval > deadline {
                return Err(ProviderError::new(format!(
                    "timeout while waiting for state to become '{}' (last state: '{}', timeout: {:?})",
                    self.target.join(", "),
                    status,
                    self.timeout
                ))
                .with_kind(ErrorKind::Timeout));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
