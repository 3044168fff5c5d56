//! Fixed-delay retry with an optional attempt ceiling and cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use crate::clock::Clock;

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Shared flag used to stop waits and loops from outside.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delay: Duration,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: DEFAULT_RETRY_DELAY,
            max_attempts: None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RetryError<E> {
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
    #[error("retry cancelled")]
    Cancelled,
}

impl RetryPolicy {
    pub fn bounded(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts: Some(max_attempts.max(1)),
        }
    }

    /// Call `op` until it succeeds, the attempt ceiling is reached, or `token` fires.
    pub fn run<T, E, F>(
        &self,
        clock: &dyn Clock,
        token: &CancelToken,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        E: std::fmt::Display,
        F: FnMut() -> Result<T, E>,
    {
        let mut attempts = 0u32;
        loop {
            if token.is_cancelled() {
                return Err(RetryError::Cancelled);
            }
            attempts = attempts.saturating_add(1);
            match op() {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if self.max_attempts.is_some_and(|max| attempts >= max) {
                        return Err(RetryError::Exhausted {
                            attempts,
                            last: err,
                        });
                    }
                    info!(
                        attempt = attempts,
                        delay_secs = self.delay.as_secs_f64(),
                        error = %err,
                        "retrying after failure"
                    );
                    if !clock.sleep_cancellable(self.delay, token) {
                        return Err(RetryError::Cancelled);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::ManualClock;

    #[test]
    fn succeeds_after_transient_failures() {
        let clock = ManualClock::new();
        let token = CancelToken::new();
        let mut calls = 0;
        let result: Result<u32, RetryError<String>> =
            RetryPolicy::default().run(&clock, &token, || {
                calls += 1;
                if calls < 3 {
                    Err("flaky".to_string())
                } else {
                    Ok(calls)
                }
            });
        assert_eq!(result, Ok(3));
        assert_eq!(clock.total_slept(), DEFAULT_RETRY_DELAY * 2);
    }

    #[test]
    fn bounded_policy_gives_up() {
        let clock = ManualClock::new();
        let token = CancelToken::new();
        let policy = RetryPolicy::bounded(Duration::from_secs(1), 2);
        let result: Result<(), RetryError<&str>> = policy.run(&clock, &token, || Err("down"));
        assert_eq!(
            result,
            Err(RetryError::Exhausted {
                attempts: 2,
                last: "down"
            })
        );
    }

    #[test]
    fn cancelled_token_stops_before_first_attempt() {
        let clock = ManualClock::new();
        let token = CancelToken::new();
        token.cancel();
        let result: Result<(), RetryError<&str>> =
            RetryPolicy::default().run(&clock, &token, || Ok(()));
        assert_eq!(result, Err(RetryError::Cancelled));
    }
}
