//! Exponential backoff retry loop.
use std::time::Duration;

/// Blocking wait between retry attempts.
///
/// Any `Fn(Duration)` closure implements this trait, which allows tests to record requested
/// delays instead of sleeping.
pub trait Sleep: Send + Sync {
    /// Block the current thread for `duration`.
    fn sleep(&self, duration: Duration);
}

pub(crate) struct ThreadSleep;
impl Sleep for ThreadSleep {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl<T: Fn(Duration) + Send + Sync> Sleep for T {
    fn sleep(&self, duration: Duration) {
        self(duration);
    }
}

/// Retry parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one. Values below 1 are treated as 1.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Factor applied to the delay after each retry. Values below 1.0 are treated as 1.0.
    pub multiplier: f64,
}

impl RetryPolicy {
    /// Delay to wait before retry number `retry` (0-based: `0` is the wait after the first failed
    /// attempt).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let multiplier = if self.multiplier.is_finite() {
            self.multiplier.max(1.0)
        } else {
            1.0
        };
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let delay = self.initial_delay.as_secs_f64() * multiplier.powi(exponent);
        if !delay.is_finite() || delay >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(delay)
        }
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the attempt budget is
    /// spent. `op` receives the 1-based attempt number. Returns the last error on failure.
    pub(crate) fn run<T, E>(
        &self,
        sleep: &dyn Sleep,
        is_retryable: impl Fn(&E) -> bool,
        mut on_retry: impl FnMut(u32, Duration, &E),
        mut op: impl FnMut(u32) -> Result<T, E>,
    ) -> Result<T, E> {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if attempt < max_attempts && is_retryable(&err) => {
                    let delay = self.delay_for_retry(attempt - 1);
                    on_retry(attempt, delay, &err);
                    sleep.sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
