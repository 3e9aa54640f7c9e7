//! Per-worker submission throttle

use std::time::Duration;
use tokio::time::Instant;

/// Fixed-window rate limiter.
///
/// Admits at most `ceiling` calls per window. Once the window is full the
/// next call sleeps until the window ends and opens a new one. A window
/// that has run its full length is reset on the next call. Sends are not
/// spread evenly inside a window.
#[derive(Debug)]
pub struct RateLimiter {
    ceiling: u32,
    window: Duration,
    count: u32,
    window_start: Instant,
}

impl RateLimiter {
    pub fn new(ceiling: u32, window: Duration) -> Self {
        Self {
            ceiling: ceiling.max(1),
            window,
            count: 0,
            window_start: Instant::now(),
        }
    }

    /// `ceiling` calls per second
    pub fn per_second(ceiling: u32) -> Self {
        Self::new(ceiling, Duration::from_secs(1))
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// Wait for a slot in the current window. Returns how long it slept.
    pub async fn throttle(&mut self) -> Duration {
        let now = Instant::now();
        if now.duration_since(self.window_start) >= self.window {
            self.window_start = now;
            self.count = 0;
        }

        let mut waited = Duration::ZERO;
        if self.count >= self.ceiling {
            let window_end = self.window_start + self.window;
            tokio::time::sleep_until(window_end).await;
            waited = window_end.saturating_duration_since(now);
            self.window_start = Instant::now();
            self.count = 0;
        }

        self.count += 1;
        waited
    }
}
