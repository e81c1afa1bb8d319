//! Bounded exponential backoff around fallible external calls.

use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }
}

#[derive(Error, Debug)]
pub enum RetryError<E>
where
    E: std::error::Error + 'static,
{
    #[error("gave up after {attempts} attempt(s): {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: E,
    },

    #[error("stopped after {attempts} attempt(s) on a non-retryable error: {source}")]
    Aborted { attempts: u32, source: E },
}

impl<E> RetryError<E>
where
    E: std::error::Error + 'static,
{
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } | RetryError::Aborted { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn inner(&self) -> &E {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Aborted { source, .. } => source,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        multiplier: f64,
        max_delay: Duration,
    ) -> Self {
        Self {
            max_attempts,
            initial_delay,
            multiplier,
            max_delay,
        }
    }

    /// Delay slept before attempt `attempt` (0-indexed). Attempt 0 runs immediately;
    /// attempt k waits `min(initial * multiplier^(k-1), max_delay)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_delay)
    }

    /// Total time spent sleeping if every attempt fails.
    pub fn worst_case_wait(&self) -> Duration {
        (1..self.max_attempts.max(1))
            .map(|attempt| self.delay_for_attempt(attempt))
            .sum()
    }

    /// Runs `op` until it succeeds or the attempt budget is spent. Every error
    /// is considered retryable.
    pub fn execute<T, E, F>(&self, op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Result<T, E>,
        E: std::error::Error + 'static,
    {
        self.execute_if(op, |_| true)
    }

    /// Runs `op` with backoff, retrying only errors accepted by `is_retryable`.
    /// `op` receives the 0-indexed attempt number.
    pub fn execute_if<T, E, F, P>(&self, mut op: F, is_retryable: P) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Result<T, E>,
        P: Fn(&E) -> bool,
        E: std::error::Error + 'static,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            if attempt > 0 {
                let delay = self.delay_for_attempt(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "Backing off before retry");
                thread::sleep(delay);
            }

            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    let attempts = attempt + 1;
                    if !is_retryable(&e) {
                        return Err(RetryError::Aborted {
                            attempts,
                            source: e,
                        });
                    }
                    if attempts >= max_attempts {
                        warn!(attempts, error = %e, "Retry budget exhausted");
                        return Err(RetryError::Exhausted { attempts, last: e });
                    }
                    warn!(
                        attempt = attempts,
                        max_attempts,
                        error = %e,
                        "Attempt failed, retrying"
                    );
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    enum TestError {
        #[error("flaky")]
        Flaky,
        #[error("fatal")]
        Fatal,
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            max_attempts,
            Duration::from_millis(1),
            2.0,
            Duration::from_millis(5),
        )
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay, Duration::from_secs(1));
        assert_eq!(policy.multiplier, 2.0);
        assert_eq!(policy.max_delay, Duration::from_secs(60));
    }

    #[test]
    fn test_delay_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(4));
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy::new(
            10,
            Duration::from_secs(1),
            10.0,
            Duration::from_secs(60),
        );
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(10));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(60));
        assert_eq!(policy.delay_for_attempt(9), Duration::from_secs(60));
    }

    #[test]
    fn test_worst_case_wait() {
        assert_eq!(RetryPolicy::default().worst_case_wait(), Duration::from_secs(3));
    }

    #[test]
    fn test_succeeds_after_transient_failures() {
        let policy = fast_policy(3);
        let mut calls = 0;
        let result = policy.execute(|attempt| {
            calls += 1;
            if attempt < 2 {
                Err(TestError::Flaky)
            } else {
                Ok("classified")
            }
        });
        assert_eq!(result.unwrap(), "classified");
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_exhaustion_carries_attempts_and_last_error() {
        let policy = fast_policy(3);
        let mut calls = 0;
        let result: Result<(), _> = policy.execute(|_| {
            calls += 1;
            Err(TestError::Flaky)
        });
        let err = result.unwrap_err();
        assert!(err.is_exhausted());
        assert_eq!(err.attempts(), 3);
        assert!(matches!(err.inner(), TestError::Flaky));
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_empty_success_is_not_retried() {
        let policy = fast_policy(3);
        let mut calls = 0;
        let result: Result<Vec<u8>, RetryError<TestError>> = policy.execute(|_| {
            calls += 1;
            Ok(Vec::new())
        });
        assert!(result.unwrap().is_empty());
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_non_retryable_error_stops_immediately() {
        let policy = fast_policy(5);
        let mut calls = 0;
        let result: Result<(), _> = policy.execute_if(
            |_| {
                calls += 1;
                Err(TestError::Fatal)
            },
            |e| matches!(e, TestError::Flaky),
        );
        let err = result.unwrap_err();
        assert!(!err.is_exhausted());
        assert_eq!(err.attempts(), 1);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_zero_attempts_still_runs_once() {
        let policy = fast_policy(0);
        let mut calls = 0;
        let result: Result<(), _> = policy.execute(|_| {
            calls += 1;
            Err(TestError::Flaky)
        });
        assert_eq!(result.unwrap_err().attempts(), 1);
        assert_eq!(calls, 1);
    }
}
