//! Bounded retry with exponential back-off.
//!
//! Every adapter call that crosses the network goes through [`retry`], so no
//! component ever retries forever. Errors opt in via [`Retryable`].

use std::future::Future;
use std::time::Duration;

use crate::ports::{InferenceError, OutreachSendError, PostSourceError, RepositoryError};

/// Bounded retry configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first one
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each subsequent retry
    pub base_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Retry immediately, without sleeping (tests, offline runs)
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Total attempts this policy allows
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Back-off before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32 << retry.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Errors that can tell whether another attempt may succeed
pub trait Retryable {
    fn is_transient(&self) -> bool;

    /// Server-provided wait hint, overriding the computed back-off
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl Retryable for PostSourceError {
    fn is_transient(&self) -> bool {
        PostSourceError::is_transient(self)
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            PostSourceError::RateLimited(hint) => *hint,
            _ => None,
        }
    }
}

impl Retryable for InferenceError {
    fn is_transient(&self) -> bool {
        InferenceError::is_transient(self)
    }
}

impl Retryable for RepositoryError {
    fn is_transient(&self) -> bool {
        RepositoryError::is_transient(self)
    }
}

/// Only rate limits are retried for replies; a network error may mean the
/// reply was already posted.
impl Retryable for OutreachSendError {
    fn is_transient(&self) -> bool {
        matches!(self, OutreachSendError::RateLimited(_))
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            OutreachSendError::RateLimited(hint) => *hint,
            _ => None,
        }
    }
}

/// Run `operation`, retrying transient failures up to `policy.max_retries` times.
///
/// Non-transient errors and the last transient error are returned as-is.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, label: &str, mut operation: F) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut retries = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_transient() || retries >= policy.max_retries {
                    return Err(err);
                }
                retries += 1;
                let delay = err
                    .retry_after()
                    .unwrap_or_else(|| policy.delay_for(retries));
                tracing::warn!(
                    operation = label,
                    attempt = retries,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient error, retrying"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(3),
        };
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(3));
        assert_eq!(policy.max_attempts(), 6);
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<u32, InferenceError> =
            retry(&RetryPolicy::immediate(3), "test", move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(InferenceError::Timeout)
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), InferenceError> =
            retry(&RetryPolicy::immediate(2), "test", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(InferenceError::RateLimited)
            })
            .await;

        assert!(matches!(result, Err(InferenceError::RateLimited)));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_transient_is_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), InferenceError> =
            retry(&RetryPolicy::immediate(5), "test", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(InferenceError::Api("bad request".to_string()))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_honors_retry_after_hint() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let start = tokio::time::Instant::now();
        let result: Result<(), OutreachSendError> =
            retry(&RetryPolicy::immediate(1), "reply", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(OutreachSendError::RateLimited(Some(Duration::from_secs(90))))
                } else {
                    Ok(())
                }
            })
            .await;

        assert!(result.is_ok());
        assert!(start.elapsed() >= Duration::from_secs(90));
    }
}
