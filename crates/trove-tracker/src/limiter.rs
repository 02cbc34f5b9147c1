//! Sliding-window limiter: at most `capacity` operations per `window`.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};

/// Spaces callers so no more than `capacity` operations start in any `window`.
#[derive(Debug)]
pub struct RateLimiter {
    capacity: usize,
    window: Duration,
    issued: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Limiter allowing `capacity` operations per `window`; a zero capacity is treated as one.
    #[must_use]
    pub fn new(capacity: usize, window: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            window,
            issued: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Wait until another operation may start, then claim its slot.
    ///
    /// The slot is claimed before sleeping, so concurrent callers queue behind
    /// each other instead of racing for the same opening.
    pub async fn acquire(&self) {
        let wake_at = {
            let mut issued = self.issued.lock().await;
            let now = Instant::now();
            if issued.len() < self.capacity {
                issued.push_back(now);
                return;
            }
            let oldest = issued.pop_front().unwrap_or(now);
            let opens_at = oldest + self.window;
            issued.push_back(opens_at.max(now));
            opens_at
        };
        if wake_at > Instant::now() {
            sleep_until(wake_at).await;
        }
    }

    /// Configured operations per window.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Configured window length.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }
}
