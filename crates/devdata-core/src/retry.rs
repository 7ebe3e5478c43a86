//! Retry with exponential backoff for remote fetches

use std::time::Duration;

use crate::fetch::FetchError;

/// Bounded retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 = single attempt)
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each subsequent one
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub const fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Retries without sleeping between attempts.
    pub const fn immediate(max_retries: u32) -> Self {
        Self::new(max_retries, Duration::ZERO)
    }

    /// Exponential backoff: base * 2^(attempt - 1) (1s, 2s, 4s, ... for a 1s base)
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }

    /// Total attempts including the first one.
    pub fn attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

/// Retry a fallible fetch with exponential backoff.
///
/// On retryable errors, logs the failure, sleeps, and retries up to
/// `policy.max_retries`. Returns the first success, or the final `Err` on
/// exhaustion or a non-retryable error.
pub fn retry_with_backoff<T>(
    label: &str,
    policy: &RetryPolicy,
    mut attempt_fn: impl FnMut() -> Result<T, FetchError>,
) -> Result<T, FetchError> {
    let max_retries = policy.max_retries;
    let mut attempt = 0u32;
    loop {
        match attempt_fn() {
            Ok(v) => return Ok(v),
            Err(e) if attempt < max_retries && e.is_retryable() => {
                attempt += 1;
                let delay = policy.backoff_duration(attempt);
                log::warn!("{label}: attempt {attempt}/{max_retries} failed: {e}, retrying in {delay:?}");
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
            }
            Err(e) => {
                log::debug!("{label}: failed permanently: {e}");
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn backoff_exponential() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        assert_eq!(policy.backoff_duration(1), Duration::from_secs(1));
        assert_eq!(policy.backoff_duration(2), Duration::from_secs(2));
        assert_eq!(policy.backoff_duration(3), Duration::from_secs(4));
    }

    #[test]
    fn stops_after_budget() {
        let calls = Cell::new(0);
        let result: Result<(), _> = retry_with_backoff("test", &RetryPolicy::immediate(2), || {
            calls.set(calls.get() + 1);
            Err(FetchError::Timeout("x".into()))
        });
        assert!(matches!(result, Err(FetchError::Timeout(_))));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn non_retryable_fails_fast() {
        let calls = Cell::new(0);
        let result: Result<(), _> = retry_with_backoff("test", &RetryPolicy::immediate(5), || {
            calls.set(calls.get() + 1);
            Err(FetchError::Http {
                status: Some(404),
                message: "not found".into(),
            })
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn recovers_after_transient_failure() {
        let calls = Cell::new(0);
        let result = retry_with_backoff("test", &RetryPolicy::immediate(3), || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(FetchError::Http {
                    status: Some(503),
                    message: "busy".into(),
                })
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.get(), 3);
    }
}
