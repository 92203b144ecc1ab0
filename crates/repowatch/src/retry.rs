//! Bounded retry with a fixed delay between attempts.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Default number of additional attempts after the first failure.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default delay between attempts (in seconds).
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 5;

/// How many times an operation is retried and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first one. `3` means at most 4 calls.
    pub max_retries: u32,
    /// Fixed delay before each retry.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_RETRIES,
            Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
        )
    }
}

/// Runs fallible async operations under a [`RetryPolicy`].
///
/// The executor knows nothing about the operation it runs. On exhaustion
/// the last error is returned as-is so callers see the root cause.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Retries every failure until the budget is spent.
    pub async fn run<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.run_if(operation, |_| true).await
    }

    /// Retries only failures for which `should_retry` returns true.
    /// Any other failure is returned immediately.
    pub async fn run_if<T, E, F, Fut, P>(&self, mut operation: F, should_retry: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        P: Fn(&E) -> bool,
    {
        let mut retries = 0;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if retries < self.policy.max_retries && should_retry(&e) => {
                    retries += 1;
                    warn!(
                        "Operation failed, retry {}/{} in {:?}: {}",
                        retries, self.policy.max_retries, self.policy.delay, e
                    );
                    tokio::time::sleep(self.policy.delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
