//! Time sources for limiters.

use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

/// Wall-clock time in fractional seconds since the Unix epoch.
///
/// Every process sharing a store must read the same clock domain, which is
/// why limiters use wall-clock time rather than `Instant`.
pub trait Clock: Send + Sync {
    fn now_secs(&self) -> f64;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> f64 {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs_f64(),
            // A clock set before 1970 reads as negative time.
            Err(e) => -e.duration().as_secs_f64(),
        }
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<f64>,
}

impl ManualClock {
    pub fn new(start_secs: f64) -> Self {
        Self {
            now: Mutex::new(start_secs),
        }
    }

    pub fn set(&self, secs: f64) {
        *self.now.lock() = secs;
    }

    /// Move time by `secs`, which may be negative to simulate skew.
    pub fn advance(&self, secs: f64) {
        *self.now.lock() += secs;
    }
}

impl Clock for ManualClock {
    fn now_secs(&self) -> f64 {
        *self.now.lock()
    }
}
