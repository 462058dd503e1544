//! Bounded retry loop for outbound calls.

use std::{thread, time::Duration};

/// Backoff ceiling exponent: the delay stops doubling after this many retries.
const MAX_BACKOFF_SHIFT: u32 = 5;

/// How often and how patiently to retry.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts in total, the first one included. Zero is treated as one.
    pub max_attempts: usize,
    /// Delay before the first retry; doubled for each further one.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: usize, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    fn backoff(&self, retry: usize) -> Duration {
        let shift = (retry.saturating_sub(1) as u32).min(MAX_BACKOFF_SHIFT);
        self.base_delay * (1 << shift)
    }
}

/// Run `op` until it succeeds, fails with an error `is_retryable` rejects,
/// or the attempt budget is spent. The last error is returned.
///
/// `op` receives the 1-based attempt number.
pub fn with_retry<T, E>(
    policy: RetryPolicy,
    is_retryable: impl Fn(&E) -> bool,
    mut op: impl FnMut(usize) -> Result<T, E>,
) -> Result<T, E> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_attempts && is_retryable(&err) => {
                thread::sleep(policy.backoff(attempt));
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
