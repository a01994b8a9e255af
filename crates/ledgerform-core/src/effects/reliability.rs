//! Bounded retry
//!
//! A fixed-delay retry loop for steps that fail while the network is "not yet
//! ready", such as joining a peer to a channel that was created moments ago.
//! Unlike a plain retry that surfaces only the final error, every attempt's
//! cause is kept so the operator can see the whole history of a failed step.
//!
//! Callers classify: `execute` retries whatever error the operation returns,
//! so operations that can fail on a permanent rejection go through
//! `execute_if` with a predicate that stops at the first such failure.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Fixed-delay retry policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 = single attempt)
    pub max_retries: u32,
    /// Delay after each failed attempt
    #[serde(with = "crate::config::duration_ms")]
    pub delay: Duration,
    /// Whether the delay is also awaited after the final failed attempt
    pub delay_after_final_attempt: bool,
}

impl RetryPolicy {
    /// Policy retrying `max_retries` times with a fixed `delay`
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            delay,
            delay_after_final_attempt: true,
        }
    }

    /// Policy making exactly one attempt
    pub fn no_retry() -> Self {
        Self::fixed(0, Duration::ZERO)
    }

    /// Set the number of retries
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the fixed delay
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Enable or disable the delay after the final failed attempt
    pub fn with_delay_after_final_attempt(mut self, enable: bool) -> Self {
        self.delay_after_final_attempt = enable;
        self
    }

    /// Total attempts this policy allows
    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Run `operation` until it succeeds or the attempt budget is spent
    ///
    /// Returns the first success immediately. When every attempt fails the
    /// error carries each cause in attempt order.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.execute_if(operation, |_| true).await
    }

    /// Like `execute`, but only failures accepted by `retryable` are repeated
    ///
    /// A failure `retryable` rejects ends the loop at once, without the
    /// delay, as `RetryError::Aborted`.
    pub async fn execute_if<F, Fut, T, E, P>(
        &self,
        mut operation: F,
        retryable: P,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
        P: Fn(&E) -> bool,
    {
        let attempts = self.total_attempts();
        let mut causes = Vec::new();

        for attempt in 1..=attempts {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if !retryable(&err) => {
                    warn!(attempt, error = %err, "attempt failed permanently");
                    causes.push(err);
                    return Err(RetryError::Aborted {
                        attempts: attempt,
                        causes,
                    });
                }
                Err(err) => {
                    warn!(attempt, attempts, error = %err, "attempt failed");
                    causes.push(err);
                    if attempt < attempts || self.delay_after_final_attempt {
                        tokio::time::sleep(self.delay).await;
                    }
                }
            }
        }

        Err(RetryError::Exhausted { attempts, causes })
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(5, Duration::from_secs(10))
    }
}

/// Failure of a retried operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    /// Every attempt failed
    Exhausted {
        /// Attempts made
        attempts: u32,
        /// Cause of each attempt, oldest first
        causes: Vec<E>,
    },
    /// An attempt failed in a way not worth repeating
    Aborted {
        /// Attempts made, the last being the permanent failure
        attempts: u32,
        /// Cause of each attempt, oldest first
        causes: Vec<E>,
    },
}

impl<E> RetryError<E> {
    /// Attempts made
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } | RetryError::Aborted { attempts, .. } => {
                *attempts
            }
        }
    }

    /// Causes, oldest first
    pub fn causes(&self) -> &[E] {
        match self {
            RetryError::Exhausted { causes, .. } | RetryError::Aborted { causes, .. } => causes,
        }
    }

    /// Whether the loop stopped on a non-retryable failure
    pub fn is_aborted(&self) -> bool {
        matches!(self, RetryError::Aborted { .. })
    }

    /// Cause of the final attempt
    pub fn last_cause(&self) -> Option<&E> {
        self.causes().last()
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Exhausted { attempts, .. } => {
                write!(f, "operation failed after {attempts} attempts")?;
            }
            RetryError::Aborted { attempts, .. } => {
                write!(f, "operation failed permanently on attempt {attempts}")?;
            }
        }
        for (index, cause) in self.causes().iter().enumerate() {
            write!(f, "; attempt {}: {cause}", index + 1)?;
        }
        Ok(())
    }
}

impl<E> Error for RetryError<E>
where
    E: Error + 'static,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.last_cause().map(|cause| cause as &(dyn Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::LedgerError;
    use std::cell::Cell;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_budget_keeps_every_cause() {
        let policy = RetryPolicy::fixed(3, Duration::from_secs(1));
        let calls = Cell::new(0u32);
        let started = Instant::now();

        let result: Result<(), _> = policy
            .execute(|| {
                let n = calls.get() + 1;
                calls.set(n);
                async move { Err(LedgerError::unreachable("peer0", format!("attempt {n}"))) }
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(calls.get(), 4);
        assert_eq!(err.attempts(), 4);
        assert_eq!(err.causes().len(), 4);
        assert_eq!(
            err.last_cause(),
            Some(&LedgerError::unreachable("peer0", "attempt 4"))
        );
        // one sleep per failed attempt, including the last
        assert_eq!(started.elapsed(), Duration::from_secs(4));
        assert!(err.source().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_trailing_delay_can_be_disabled() {
        let policy = RetryPolicy::fixed(2, Duration::from_secs(5)).with_delay_after_final_attempt(false);
        let started = Instant::now();

        let result: Result<(), RetryError<String>> =
            policy.execute(|| async { Err("not ready".to_string()) }).await;

        assert_eq!(result.unwrap_err().attempts(), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_returns_immediately() {
        let policy = RetryPolicy::fixed(5, Duration::from_secs(10));
        let calls = Cell::new(0u32);
        let started = Instant::now();

        let value = policy
            .execute(|| {
                calls.set(calls.get() + 1);
                let ready = calls.get() == 3;
                async move {
                    if ready {
                        Ok(42)
                    } else {
                        Err("channel not found".to_string())
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(calls.get(), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_failure_stops_immediately() {
        let policy = RetryPolicy::fixed(5, Duration::from_secs(10));
        let calls = Cell::new(0u32);
        let started = Instant::now();

        let err = policy
            .execute_if(
                || {
                    calls.set(calls.get() + 1);
                    let first = calls.get() == 1;
                    async move {
                        if first {
                            Err::<(), _>(LedgerError::unreachable("peer0", "not ready"))
                        } else {
                            Err(LedgerError::access_denied("peer0", "creator not in writers"))
                        }
                    }
                },
                |err: &LedgerError| !err.is_access_denied(),
            )
            .await
            .unwrap_err();

        assert!(err.is_aborted());
        assert_eq!(calls.get(), 2);
        assert_eq!(err.attempts(), 2);
        assert!(err.last_cause().is_some_and(LedgerError::is_access_denied));
        // only the retryable first failure was followed by the delay
        assert_eq!(started.elapsed(), Duration::from_secs(10));
        assert!(err
            .to_string()
            .starts_with("operation failed permanently on attempt 2; attempt 1:"));
    }

    #[tokio::test]
    async fn test_zero_retries_is_single_attempt() {
        let err = RetryPolicy::no_retry()
            .execute(|| async { Err::<(), _>("boom".to_string()) })
            .await
            .unwrap_err();
        assert_eq!(err.attempts(), 1);
        assert_eq!(err.to_string(), "operation failed after 1 attempts; attempt 1: boom");
    }
}
