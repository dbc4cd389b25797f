//! Bounded retry for transient request failures.

use crate::error::Result;
use log::warn;
use std::future::Future;
use std::time::Duration;

/// Fixed-bound, fixed-delay retry policy
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Single attempt, no retries
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

/// Run `operation` until it succeeds, fails with a non-transient error,
/// or the policy's attempts are spent. The last error is returned.
pub async fn retry_transient<F, Fut, T>(policy: &RetryPolicy, name: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                warn!(
                    "{} failed (attempt {}/{}), retrying in {:?}: {}",
                    name, attempt, policy.max_attempts, policy.delay, e
                );
                if !policy.delay.is_zero() {
                    tokio::time::sleep(policy.delay).await;
                }
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
