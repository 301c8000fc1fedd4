//! On-demand fault injection.
//!
//! The sampling board carried a row of buttons wired so the operator could
//! force any single checksum, mailbox, lock, or storage operation to fail and
//! watch the recovery path run. This is the same capability without the GPIO:
//! arm a failure, and the next matching operation consumes it and fails.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::integrity::{Checksum, Stage};

/// One-shot failure switches shared across the pipeline stages.
///
/// The default injector is inert; arming is only ever done by an operator or
/// a test driving a specific fault path.
#[derive(Default)]
pub struct FaultInjector {
    corrupt: Mutex<Option<Stage>>,
    compute_fail: Mutex<Option<Stage>>,
    put_fail: AtomicBool,
    get_fail: AtomicBool,
    open_fail: AtomicBool,
    lock_stall: AtomicBool,
}

impl FaultInjector {
    /// Force the next checksum verification at `stage` to mismatch
    pub fn arm_corruption(&self, stage: Stage) {
        *self.corrupt.lock() = Some(stage);
    }

    /// Force the next checksum computation at `stage` to fail
    pub fn arm_compute_failure(&self, stage: Stage) {
        *self.compute_fail.lock() = Some(stage);
    }

    /// Force the next mailbox put to report a timeout
    pub fn arm_put_failure(&self) {
        self.put_fail.store(true, Ordering::SeqCst);
    }

    /// Force the next mailbox get to report a timeout
    pub fn arm_get_failure(&self) {
        self.get_fail.store(true, Ordering::SeqCst);
    }

    /// Force the next storage open to fail
    pub fn arm_open_failure(&self) {
        self.open_fail.store(true, Ordering::SeqCst);
    }

    /// Force the next storage lock acquisition to time out
    pub fn arm_lock_stall(&self) {
        self.lock_stall.store(true, Ordering::SeqCst);
    }

    /// Flip a freshly computed checksum if corruption is armed for `stage`
    pub(crate) fn mangle(&self, stage: Stage, crc: Checksum) -> Checksum {
        let mut armed = self.corrupt.lock();
        if *armed == Some(stage) {
            *armed = None;
            return Checksum(!crc.0);
        }
        crc
    }

    pub(crate) fn take_compute_failure(&self, stage: Stage) -> bool {
        let mut armed = self.compute_fail.lock();
        if *armed == Some(stage) {
            *armed = None;
            return true;
        }
        false
    }

    pub(crate) fn take_put_failure(&self) -> bool {
        self.put_fail.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn take_get_failure(&self) -> bool {
        self.get_fail.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn take_open_failure(&self) -> bool {
        self.open_fail.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn take_lock_stall(&self) -> bool {
        self.lock_stall.swap(false, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_switches_are_one_shot() {
        let inject = FaultInjector::default();
        inject.arm_put_failure();
        assert!(inject.take_put_failure());
        assert!(!inject.take_put_failure());
    }

    #[test]
    fn test_mangle_only_matching_stage() {
        let inject = FaultInjector::default();
        inject.arm_corruption(Stage::Dequeue);
        let crc = Checksum(0xdead_beef);
        assert_eq!(inject.mangle(Stage::Enqueue, crc), crc);
        assert_ne!(inject.mangle(Stage::Dequeue, crc), crc);
        // consumed
        assert_eq!(inject.mangle(Stage::Dequeue, crc), crc);
    }
}
