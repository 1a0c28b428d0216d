// SPDX-License-Identifier: MIT
//! Global sliding-window throttle on job execution.
//!
//! Caps how many analysis jobs start per minute across the whole worker
//! pool, protecting downstream provider APIs from bursts.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

// ── Sliding window ───────────────────────────────────────────────────────────

/// A sliding-window counter for rate limiting.
pub struct SlidingWindow {
    window_secs: u64,
    max_count: u64,
    events: VecDeque<DateTime<Utc>>,
}

impl SlidingWindow {
    pub fn new(window_secs: u64, max_count: u64) -> Self {
        Self {
            window_secs,
            max_count,
            events: VecDeque::new(),
        }
    }

    /// Discard events older than the window boundary.
    fn evict(&mut self, now: DateTime<Utc>) {
        let cutoff = now - Duration::seconds(self.window_secs as i64);
        while self.events.front().is_some_and(|t| *t <= cutoff) {
            self.events.pop_front();
        }
    }

    /// Record a new event at `at`.
    pub fn record_event(&mut self, at: DateTime<Utc>) {
        self.evict(at);
        self.events.push_back(at);
    }

    /// Count events within the current window.
    pub fn count_in_window(&mut self, now: DateTime<Utc>) -> u64 {
        self.evict(now);
        self.events.len() as u64
    }

    /// Returns `true` if the count in the current window has reached `max_count`.
    pub fn is_limited(&mut self, now: DateTime<Utc>) -> bool {
        self.count_in_window(now) >= self.max_count
    }

    /// Time until the oldest event in the window expires.
    ///
    /// Returns `None` if the window is not currently limited.
    pub fn time_until_reset(&mut self, now: DateTime<Utc>) -> Option<Duration> {
        if !self.is_limited(now) {
            return None;
        }
        self.events.front().map(|oldest| {
            let expiry = *oldest + Duration::seconds(self.window_secs as i64);
            expiry - now
        })
    }
}

// ── Job throttle ─────────────────────────────────────────────────────────────

/// Shared throughput cap: `max_per_minute` job starts across all workers.
pub struct JobThrottle {
    window: Mutex<SlidingWindow>,
}

impl JobThrottle {
    pub fn new(max_per_minute: u64) -> Self {
        Self {
            window: Mutex::new(SlidingWindow::new(60, max_per_minute)),
        }
    }

    /// Record a job start if capacity allows; otherwise return how long the
    /// caller should wait before asking again.
    pub async fn try_acquire(&self) -> Result<(), std::time::Duration> {
        let now = Utc::now();
        let mut window = self.window.lock().await;
        if !window.is_limited(now) {
            window.record_event(now);
            return Ok(());
        }
        let wait = window
            .time_until_reset(now)
            .and_then(|d| d.to_std().ok())
            .unwrap_or(std::time::Duration::from_secs(1));
        Err(wait)
    }

    /// Wait until a slot is free, then claim it.
    pub async fn acquire(&self) {
        loop {
            match self.try_acquire().await {
                Ok(()) => return,
                Err(wait) => tokio::time::sleep(wait.min(std::time::Duration::from_secs(5))).await,
            }
        }
    }
}

/// Thread-safe wrapper for use in `AppContext`.
pub type SharedJobThrottle = Arc<JobThrottle>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sliding_window_counts_and_limits() {
        let mut window = SlidingWindow::new(60, 5);
        let now = Utc::now();

        assert!(!window.is_limited(now));
        for _ in 0..5 {
            window.record_event(now);
        }
        assert!(window.is_limited(now), "should be limited at max count");
        assert_eq!(window.count_in_window(now), 5);

        let future = now + Duration::seconds(61);
        assert!(
            !window.is_limited(future),
            "should not be limited after window expires"
        );
    }

    #[test]
    fn time_until_reset_only_when_limited() {
        let mut window = SlidingWindow::new(60, 2);
        let now = Utc::now();
        window.record_event(now);
        assert!(window.time_until_reset(now).is_none());
        window.record_event(now);
        let reset = window.time_until_reset(now).expect("limited window resets");
        assert!(reset.num_seconds() >= 0);
    }

    #[tokio::test]
    async fn throttle_rejects_beyond_capacity() {
        let throttle = JobThrottle::new(2);
        assert!(throttle.try_acquire().await.is_ok());
        assert!(throttle.try_acquire().await.is_ok());
        let wait = throttle.try_acquire().await.expect_err("third start throttled");
        assert!(wait <= std::time::Duration::from_secs(60));
    }
}
