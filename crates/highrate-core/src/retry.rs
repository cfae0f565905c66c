//! Retry with exponential backoff for remote operations

use std::fmt::Display;
use std::time::{Duration, Instant};

use indicatif::ProgressBar;

use crate::shutdown::is_shutdown_requested;

/// Slice used when sleeping so a shutdown request cuts a backoff short
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Errors that know whether another attempt could succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// How many times to retry and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (total attempts = `max_retries + 1`)
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff: base * 2^(retry-1), capped (2s, 4s, 8s, ...)
    ///
    /// `retry` is 1-based. Monotonically non-decreasing in `retry`.
    pub fn delay(&self, retry: u32) -> Duration {
        let shift = retry.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << shift)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Total attempts allowed, first one included.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Record of the retries performed by one [`retry_with_backoff`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryLog {
    pub attempts: u32,
    pub delays: Vec<Duration>,
}

impl RetryLog {
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Retry a fallible operation with exponential backoff.
///
/// `attempt_fn` receives the 0-based attempt number. On retryable errors,
/// logs the failure, updates the progress bar, sleeps and retries up to
/// `policy.max_retries` times. A shutdown request stops further retries.
///
/// Returns `Ok(T)` on first success, or the final `Err` on exhaustion /
/// non-retryable error.
pub fn retry_with_backoff<T, E: Retryable + Display>(
    label: &str,
    policy: &RetryPolicy,
    pb: &ProgressBar,
    record: &mut RetryLog,
    mut attempt_fn: impl FnMut(u32) -> Result<T, E>,
) -> Result<T, E> {
    let mut attempt = 0u32;
    loop {
        record.attempts = attempt + 1;
        match attempt_fn(attempt) {
            Ok(v) => return Ok(v),
            Err(e) if attempt < policy.max_retries && e.is_retryable() => {
                attempt += 1;
                let delay = policy.delay(attempt);
                record.delays.push(delay);
                pb.set_message(format!("retry {attempt}/{}...", policy.max_retries));
                log::debug!(
                    "{label}: attempt {attempt}/{} failed: {e}, retrying in {delay:?}",
                    policy.max_attempts()
                );
                if !sleep_unless_shutdown(delay) {
                    log::warn!("{label}: shutdown requested, giving up after: {e}");
                    return Err(e);
                }
            }
            Err(e) => {
                if e.is_retryable() {
                    log::error!("{label}: failed permanently: {e}");
                } else {
                    log::debug!("{label}: not retrying: {e}");
                }
                return Err(e);
            }
        }
    }
}

/// Sleep for `total`, returning `false` early if shutdown is requested.
fn sleep_unless_shutdown(total: Duration) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if is_shutdown_requested() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep(SLEEP_SLICE.min(deadline - now));
    }
}
