use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry policy for establishing database connections
///
/// The delay before attempt `n + 1` is `min(base_delay * 2^(n - 1), max_delay)`,
/// so delays never decrease and never exceed `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,

    /// Delay after the first failed attempt
    pub base_delay: Duration,

    /// Upper bound for any single delay
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Create a new retry policy with defaults
    ///
    /// Defaults:
    /// - max_attempts: 5
    /// - base_delay: 1000ms
    /// - max_delay: 10000ms
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of attempts (clamped to at least one)
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Set the delay after the first failure
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the delay cap
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Backoff to apply after the given (1-based) failed attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
        }
    }
}

/// One failed attempt inside an in-flight retry sequence
#[derive(Debug, Clone)]
pub struct RetryAttempt<'a, E> {
    /// 1-based attempt index
    pub attempt: u32,
    /// Backoff slept before the next attempt (or before giving up)
    pub delay: Duration,
    /// Error observed on this attempt
    pub last_error: &'a E,
}

/// Every attempt failed
#[derive(Debug, Clone)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

/// Retry an async operation with exponential backoff
///
/// A backoff follows every failed attempt, the last one included, so a
/// permanently failing operation takes `sum(delay_for(1..=max_attempts))`
/// before the error is returned. `on_failure` sees each failed attempt before
/// its backoff starts.
///
/// # Example
/// ```ignore
/// use database::common::{RetryPolicy, retry_with_backoff};
///
/// let policy = RetryPolicy::new().with_max_attempts(3);
/// let client = retry_with_backoff(|| dial(&uri), policy, |_| {}).await?;
/// ```
pub async fn retry_with_backoff<F, Fut, T, E, O>(
    mut operation: F,
    policy: RetryPolicy,
    mut on_failure: O,
) -> Result<T, RetryExhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    O: FnMut(&RetryAttempt<'_, E>),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    debug!("Operation succeeded on attempt {}", attempt);
                }
                return Ok(result);
            }
            Err(e) => {
                let delay = policy.delay_for(attempt);
                on_failure(&RetryAttempt {
                    attempt,
                    delay,
                    last_error: &e,
                });

                tokio::time::sleep(delay).await;

                if attempt >= max_attempts {
                    warn!("Operation failed after {} attempts: {}", attempt, e);
                    return Err(RetryExhausted {
                        attempts: attempt,
                        last_error: e,
                    });
                }
                attempt += 1;
            }
        }
    }
}
