use std::time::Duration;
use tracing::debug;

use crate::error::ScrapeError;

/// Bounded retry with a fixed delay between attempts.
///
/// Only transient errors (see [`ScrapeError::is_transient`]) are retried; anything
/// else fails on the spot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

/// Result of running an operation under a [`RetryPolicy`]
#[derive(Debug)]
pub enum Attempt<T> {
    Success { value: T, attempts: u32 },
    Failure { error: ScrapeError, attempts: u32 },
}

impl<T> Attempt<T> {
    pub fn into_result(self) -> Result<T, ScrapeError> {
        match self {
            Attempt::Success { value, .. } => Ok(value),
            Attempt::Failure { error, .. } => Err(error),
        }
    }
}

impl RetryPolicy {
    pub const fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// One attempt, no retry
    #[cfg(test)]
    pub const fn once() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or the
    /// attempts are used up. `pause` is called with the delay before each retry.
    pub fn run<T, F, P>(&self, mut op: F, pause: P) -> Attempt<T>
    where
        F: FnMut() -> Result<T, ScrapeError>,
        P: Fn(Duration),
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op() {
                Ok(value) => {
                    return Attempt::Success {
                        value,
                        attempts: attempt,
                    }
                }
                Err(error) if error.is_transient() && attempt < max_attempts => {
                    debug!(
                        "Attempt {}/{} failed ({}), retrying in {:?}",
                        attempt, max_attempts, error, self.delay
                    );
                    pause(self.delay);
                    attempt += 1;
                }
                Err(error) => {
                    return Attempt::Failure {
                        error,
                        attempts: attempt,
                    }
                }
            }
        }
    }
}
