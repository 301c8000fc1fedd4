//! Watchdog liveness signal.
//!
//! The pipeline's only obligations are to `start` the watchdog before
//! sampling begins and to `kick` it on every healthy iteration of the
//! acquisition and aggregation tasks. The recovery controller never kicks;
//! once a fault is latched the watchdog running out is the backstop for a
//! controller that fails to act.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Watchdog collaborator interface
pub trait Watchdog: Send + Sync {
    fn start(&self, timeout: Duration);
    fn kick(&self);
}

/// Tracks kick liveness in software so a supervisor can observe expiry the
/// way external reset hardware would.
pub struct SoftwareWatchdog {
    origin: Instant,
    timeout_micros: AtomicU64,
    last_kick_micros: AtomicU64,
    armed: AtomicBool,
}

impl SoftwareWatchdog {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            timeout_micros: AtomicU64::new(0),
            last_kick_micros: AtomicU64::new(0),
            armed: AtomicBool::new(false),
        }
    }

    fn elapsed_micros(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }

    /// True once the timeout has passed without a kick. This is the signal
    /// the reset hardware acts on.
    pub fn has_expired(&self) -> bool {
        if !self.armed.load(Ordering::Acquire) {
            return false;
        }
        let since_kick = self
            .elapsed_micros()
            .saturating_sub(self.last_kick_micros.load(Ordering::Acquire));
        since_kick > self.timeout_micros.load(Ordering::Acquire)
    }
}

impl Default for SoftwareWatchdog {
    fn default() -> Self {
        Self::new()
    }
}

impl Watchdog for SoftwareWatchdog {
    fn start(&self, timeout: Duration) {
        self.timeout_micros
            .store(timeout.as_micros() as u64, Ordering::Release);
        self.last_kick_micros
            .store(self.elapsed_micros(), Ordering::Release);
        self.armed.store(true, Ordering::Release);
    }

    fn kick(&self) {
        self.last_kick_micros
            .store(self.elapsed_micros(), Ordering::Release);
    }
}
