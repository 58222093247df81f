//! # Retry policy
//!
//! Bounded retries with exponential backoff for item fetches. Absence of an
//! item is permanent and is never retried.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub delay_ceiling: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            delay_ceiling: Duration::from_secs(5),
        }
    }
}

/// How a retried operation settled.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome<T> {
    Loaded { value: T, attempts: u32 },
    /// The operation reported that nothing exists for the request.
    Absent { attempts: u32 },
    /// Every attempt failed; `error` is the last failure.
    Exhausted { attempts: u32, error: FetchError },
}

impl<T> RetryOutcome<T> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Loaded { attempts, .. }
            | RetryOutcome::Absent { attempts }
            | RetryOutcome::Exhausted { attempts, .. } => *attempts,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            RetryOutcome::Loaded { value, .. } => Some(value),
            _ => None,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, delay_ceiling: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            delay_ceiling,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1));
        factor
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.delay_ceiling, |delay| delay.min(self.delay_ceiling))
    }

    /// Run `operation` until it yields a value, reports absence, or the attempt
    /// budget is spent. The closure receives the 1-based attempt number.
    pub async fn attempt<T, F, Fut>(&self, mut operation: F) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Option<T>, FetchError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(Some(value)) => {
                    return RetryOutcome::Loaded {
                        value,
                        attempts: attempt,
                    };
                }
                Ok(None) => {
                    debug!(attempt, "Nothing to retry, item is absent");
                    return RetryOutcome::Absent { attempts: attempt };
                }
                Err(error) if attempt >= max_attempts => {
                    warn!(id = %error.id(), attempts = attempt, error = %error, "Retries exhausted");
                    return RetryOutcome::Exhausted {
                        attempts: attempt,
                        error,
                    };
                }
                Err(error) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        id = %error.id(),
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Fetch attempt failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn failure(id: &str) -> FetchError {
        FetchError::Failure {
            id: id.to_owned(),
            reason: "connection reset".into(),
        }
    }

    #[test]
    fn test_delay_sequence_is_bounded() {
        let policy = RetryPolicy::default();
        let delays: Vec<_> = (1..=6).map(|n| policy.delay_for(n)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(5),
                Duration::from_secs(5),
                Duration::from_secs(5),
            ]
        );
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        // Shift overflow falls back to the ceiling.
        assert_eq!(policy.delay_for(64), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_operation_uses_exact_budget() {
        let policy = RetryPolicy::default().with_max_attempts(3);
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let outcome: RetryOutcome<u32> = policy
            .attempt(|_| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(failure("7"))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.attempts(), 3);
        assert!(matches!(outcome, RetryOutcome::Exhausted { .. }));
        // 1s + 2s of backoff, none after the final attempt.
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_absent_is_not_retried() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let outcome: RetryOutcome<u32> = policy
            .attempt(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(None) }
            })
            .await;

        assert_eq!(outcome, RetryOutcome::Absent { attempts: 1 });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let policy = RetryPolicy::default();

        let outcome = policy
            .attempt(|attempt| async move {
                if attempt < 3 {
                    Err(FetchError::Timeout {
                        id: "7".into(),
                        after: Duration::from_secs(15),
                    })
                } else {
                    Ok(Some(attempt))
                }
            })
            .await;

        assert_eq!(
            outcome,
            RetryOutcome::Loaded {
                value: 3,
                attempts: 3
            }
        );
    }
}
