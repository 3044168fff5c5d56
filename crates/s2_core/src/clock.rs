//! Wall-clock abstraction for throttling, backoff and attempt pacing.
//!
//! Every deliberate pause in the pipeline goes through a [`Clock`] so the
//! scheduler can be driven by virtual time in tests.

use std::time::{Duration, Instant};

use crate::retry::CancelToken;

/// Granularity of cancellable sleeps.
const SLEEP_SLICE: Duration = Duration::from_millis(250);

pub trait Clock {
    fn now(&self) -> Instant;

    fn sleep(&self, duration: Duration);

    /// Sleep in slices, returning early once `token` is cancelled.
    /// Returns `false` when the sleep was interrupted.
    fn sleep_cancellable(&self, duration: Duration, token: &CancelToken) -> bool {
        let deadline = self.now() + duration;
        loop {
            if token.is_cancelled() {
                return false;
            }
            let now = self.now();
            if now >= deadline {
                return true;
            }
            self.sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}

/// Real time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
