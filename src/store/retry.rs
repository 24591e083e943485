//! Two-tier retry for storage contention.
//!
//! A contended store call is retried at a short fixed interval a bounded
//! number of times, then at a long fixed interval a bounded number of times.
//! When both tiers are used up the failure becomes
//! [`ArbiterError::PersistenceExhausted`], which the process treats as fatal.
//!
//! Only [`StorageError::Contention`] is retried.

use std::future::Future;
use std::time::Duration;

use crate::error::ArbiterError;
use crate::store::StorageError;

/// Retry schedule for contended store calls.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use concent_arbiter::store::RetryPolicy;
///
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.delay_for(0), Some(Duration::from_millis(50)));
/// assert_eq!(policy.delay_for(10), Some(Duration::from_secs(1)));
/// assert_eq!(policy.delay_for(20), None);
/// assert_eq!(policy.max_attempts(), 21);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries in the short tier.
    pub short_retries: u32,
    /// Pause between short-tier retries.
    pub short_interval: Duration,
    /// Retries in the long tier.
    pub long_retries: u32,
    /// Pause between long-tier retries.
    pub long_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            short_retries: 10,
            short_interval: Duration::from_millis(50),
            long_retries: 10,
            long_interval: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            short_retries: 0,
            short_interval: Duration::ZERO,
            long_retries: 0,
            long_interval: Duration::ZERO,
        }
    }

    /// Pause before retry number `retry` (zero-based), or `None` once both
    /// tiers are exhausted.
    pub fn delay_for(&self, retry: u32) -> Option<Duration> {
        if retry < self.short_retries {
            Some(self.short_interval)
        } else if retry < self.short_retries.saturating_add(self.long_retries) {
            Some(self.long_interval)
        } else {
            None
        }
    }

    /// Total attempts including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.short_retries
            .saturating_add(self.long_retries)
            .saturating_add(1)
    }
}

/// Runs `attempt` until it succeeds, fails with a non-contention error, or
/// `policy` runs out of retries.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut attempt: F,
) -> Result<T, ArbiterError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StorageError>>,
{
    let mut retry = 0u32;
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(StorageError::Contention { message }) => match policy.delay_for(retry) {
                Some(delay) => {
                    tracing::warn!(
                        operation,
                        retry = retry + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %message,
                        "storage contention, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                },
                None => {
                    tracing::error!(
                        operation,
                        attempts = retry + 1,
                        error = %message,
                        "storage contention not resolved, giving up"
                    );
                    return Err(ArbiterError::PersistenceExhausted {
                        attempts: retry + 1,
                        message,
                    });
                },
            },
            Err(other) => return Err(other.into()),
        }
    }
}
