//! Sliding-window admission control.
//!
//! A limiter admits at most `limit` calls within any trailing window. It keeps
//! the instants of recent admissions in a queue and prunes it lazily on each
//! call, so there is no background timer and the cost per call is bounded by
//! `limit`.
//!
//! Rejected calls leave the queue untouched: hammering a saturated limiter
//! does not push its reopening further out.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::clock::{Clock, SystemClock};
use crate::lock;

/// Thread-safe sliding-window rate limiter.
pub struct SlidingWindowLimiter {
    limit: usize,
    window: Duration,
    clock: Arc<dyn Clock>,
    admitted: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowLimiter {
    /// Limiter on the system clock.
    ///
    /// # Panics
    ///
    /// If `limit` or `window` is zero.
    pub fn new(limit: usize, window: Duration) -> Self {
        Self::with_clock(limit, window, Arc::new(SystemClock))
    }

    /// Limiter on an injected clock.
    ///
    /// # Panics
    ///
    /// If `limit` or `window` is zero.
    pub fn with_clock(limit: usize, window: Duration, clock: Arc<dyn Clock>) -> Self {
        assert!(limit > 0, "limiter limit must be positive");
        assert!(!window.is_zero(), "limiter window must be positive");
        Self {
            limit,
            window,
            clock,
            admitted: Mutex::new(VecDeque::with_capacity(limit)),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Try to take one unit of quota. Returns `false` when the window is full.
    pub fn admit(&self) -> bool {
        let mut admitted = lock(&self.admitted);
        // Read the clock under the lock so the queue stays ordered.
        let now = self.clock.now();
        prune(&mut admitted, now, self.window);
        if admitted.len() >= self.limit {
            return false;
        }
        admitted.push_back(now);
        true
    }

    /// Number of admissions still inside the window.
    pub fn occupancy(&self) -> usize {
        let mut admitted = lock(&self.admitted);
        let now = self.clock.now();
        prune(&mut admitted, now, self.window);
        admitted.len()
    }
}

impl fmt::Debug for SlidingWindowLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlidingWindowLimiter")
            .field("limit", &self.limit)
            .field("window", &self.window)
            .field("occupancy", &lock(&self.admitted).len())
            .finish()
    }
}

/// Drop every admission at or before `now - window`.
fn prune(admitted: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&oldest) = admitted.front() {
        if now.saturating_duration_since(oldest) < window {
            break;
        }
        admitted.pop_front();
    }
}
