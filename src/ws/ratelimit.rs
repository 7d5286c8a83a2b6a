//! Per-user fixed-window chat throttle.

use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    count: u32,
    reset_at: Instant,
}

/// Fixed-window counter keyed by user id.
///
/// Each check runs under the shard lock of that user's entry, so the
/// read-check-increment for one user is atomic. Time comes from the tokio
/// clock, which tests can pause and advance.
pub struct ChatRateLimiter {
    windows: DashMap<String, RateWindow>,
    max: u32,
    window: Duration,
}

impl ChatRateLimiter {
    pub fn new(max: u32, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            max,
            window,
        }
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Count one message for `user_id`. Returns false when the window is full.
    pub fn check(&self, user_id: &str) -> bool {
        let now = Instant::now();
        let mut entry = self
            .windows
            .entry(user_id.to_string())
            .or_insert(RateWindow {
                count: 0,
                reset_at: now,
            });

        if entry.count == 0 || now >= entry.reset_at {
            *entry = RateWindow {
                count: 1,
                reset_at: now + self.window,
            };
            return true;
        }

        if entry.count >= self.max {
            return false;
        }

        entry.count += 1;
        true
    }

    /// Remove windows that have already elapsed.
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.windows.retain(|_, window| now < window.reset_at);
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }
}
