//! Time sources for the limiter.
//!
//! [`SystemClock`] reads the monotonic clock. [`ManualClock`] only moves when
//! told to, which lets tests walk a limiter across window boundaries exactly.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::lock;

/// Something that can tell the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// The process monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that stands still until advanced.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    /// Start at the current instant.
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(start: Instant) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move time forward by `step`.
    pub fn advance(&self, step: Duration) {
        *lock(&self.now) += step;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *lock(&self.now)
    }
}
