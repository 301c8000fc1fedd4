//! The persistence task: exfils frozen windows to durable storage.
//!
//! Each flush re-verifies the whole-window checksum, takes the storage lock
//! with a bounded timeout (past it we assume a deadlock), runs the storage
//! collaborator through a full init/open/write/close/deinit cycle, and hands
//! the emptied window back to aggregation. Once the requested number of
//! windows has been recorded the run completes.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::fault::{Controller, FaultKind};
use crate::inject::FaultInjector;
use crate::integrity::{Codec, Stage};
use crate::storage::Storage;
use crate::window::{ExfilHandle, FrozenWindow};

/// How long to wait for a frozen window before re-checking the stop flag
const PATIENCE: Duration = Duration::from_millis(100);

pub type SharedStorage = Arc<Mutex<Box<dyn Storage>>>;

pub struct Exfil {
    exchange: ExfilHandle,
    storage: SharedStorage,
    codec: Codec,
    controller: Arc<Controller>,
    inject: Arc<FaultInjector>,
    lock_timeout: Duration,
    run_target: u32,
    written: u32,
}

impl Exfil {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        exchange: ExfilHandle,
        storage: SharedStorage,
        codec: Codec,
        controller: Arc<Controller>,
        inject: Arc<FaultInjector>,
        lock_timeout: Duration,
        run_target: u32,
    ) -> Self {
        Self {
            exchange,
            storage,
            codec,
            controller,
            inject,
            lock_timeout,
            run_target,
            written: 0,
        }
    }

    /// Flush windows until the run target is met or the run is stopped
    pub fn run(mut self) {
        info!(run_target = self.run_target, "persistence started");
        while !self.controller.should_stop() {
            let frozen = match self.exchange.next(PATIENCE) {
                Some(frozen) => frozen,
                None => continue,
            };
            match self.flush(frozen) {
                Ok(()) => {
                    if self.written == self.run_target {
                        self.controller.complete();
                        break;
                    }
                }
                Err(kind) => {
                    self.controller.raise(kind);
                    break;
                }
            }
        }
        info!(windows = self.written, "persistence stopped");
    }

    fn flush(&mut self, frozen: FrozenWindow) -> Result<(), FaultKind> {
        let FrozenWindow { window, crc } = frozen;
        self.codec
            .verify_window(Stage::Flush, window.samples(), crc)?;
        debug!(slot = %window.slot(), samples = window.len(), "flushing window");
        if self.inject.take_lock_stall() {
            return Err(FaultKind::PersistenceDeadlock);
        }
        {
            let mut storage = self
                .storage
                .try_lock_for(self.lock_timeout)
                .ok_or(FaultKind::PersistenceDeadlock)?;
            storage.init().map_err(|_| FaultKind::StorageOpenFailed)?;
            if self.inject.take_open_failure() {
                return Err(FaultKind::StorageOpenFailed);
            }
            storage
                .open_append()
                .map_err(|_| FaultKind::StorageOpenFailed)?;
            for sample in window.samples() {
                storage
                    .write_record(sample)
                    .map_err(|_| FaultKind::StorageWriteFailed)?;
            }
            storage
                .write_separator()
                .map_err(|_| FaultKind::StorageWriteFailed)?;
            storage.close().map_err(|_| FaultKind::StorageWriteFailed)?;
            storage.deinit();
        }
        self.written += 1;
        info!(
            window = self.written,
            of = self.run_target,
            "window persisted"
        );
        self.exchange.reclaim(window);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    use crate::fault::RunState;
    use crate::sample::Sample;
    use crate::sensor::{Status, StatusSignal};
    use crate::storage::MemoryStorage;
    use crate::window::{window_exchange, AggregatorHandle};

    struct NullSignal;
    impl StatusSignal for NullSignal {
        fn set_status(&self, _status: Status) {}
    }

    struct Fixture {
        exfil: Exfil,
        agg: AggregatorHandle,
        storage: SharedStorage,
        log: MemoryStorage,
        controller: Arc<Controller>,
        inject: Arc<FaultInjector>,
        codec: Codec,
    }

    fn fixture(window_len: usize, run_target: u32) -> Fixture {
        let inject = Arc::new(FaultInjector::default());
        let (agg, exfil_side) = window_exchange(window_len, Duration::from_millis(200));
        let log = MemoryStorage::new();
        let storage: SharedStorage = Arc::new(Mutex::new(Box::new(log.clone())));
        let controller = Arc::new(Controller::new(Arc::new(NullSignal)));
        let codec = Codec::new(inject.clone());
        let exfil = Exfil::new(
            exfil_side,
            storage.clone(),
            codec.clone(),
            controller.clone(),
            inject.clone(),
            Duration::from_millis(100),
            run_target,
        );
        Fixture {
            exfil,
            agg,
            storage,
            log,
            controller,
            inject,
            codec,
        }
    }

    fn fill_and_freeze(fx: &Fixture, base: u16) -> FrozenWindow {
        let mut window = fx.agg.acquire().unwrap();
        while !window.is_full() {
            let n = base + window.len() as u16;
            window.push(Sample::new(n, n + 1));
        }
        let crc = fx
            .codec
            .compute_window(Stage::Flush, window.samples())
            .unwrap();
        FrozenWindow { window, crc }
    }

    #[test]
    fn test_flush_writes_records_and_completes() {
        let mut fx = fixture(3, 1);
        let frozen = fill_and_freeze(&fx, 10);
        fx.exfil.flush(frozen).unwrap();
        assert_eq!(
            fx.log.contents(),
            vec!["10,11", "11,12", "12,13", ""]
        );
    }

    #[test]
    fn test_run_counter_reaches_target() {
        let Fixture {
            exfil,
            agg,
            controller,
            codec,
            ..
        } = fixture(2, 2);
        let handle = thread::spawn(move || exfil.run());
        let mut window = agg.acquire().unwrap();
        for round in 0..2 {
            while !window.is_full() {
                window.push(Sample::new(round, round));
            }
            let crc = codec.compute_window(Stage::Flush, window.samples()).unwrap();
            window = agg.swap(FrozenWindow { window, crc }).unwrap();
        }
        handle.join().unwrap();
        assert_eq!(controller.state(), RunState::Completed);
    }

    #[test]
    fn test_held_lock_becomes_deadlock_fault() {
        let mut fx = fixture(2, 1);
        let frozen = fill_and_freeze(&fx, 0);
        let storage = fx.storage.clone();
        let guard = storage.lock();
        assert_eq!(
            fx.exfil.flush(frozen).unwrap_err(),
            FaultKind::PersistenceDeadlock
        );
        drop(guard);
    }

    #[test]
    fn test_lock_released_in_time_allows_write() {
        let mut fx = fixture(2, 1);
        let frozen = fill_and_freeze(&fx, 0);
        let storage = fx.storage.clone();
        let contender = thread::spawn(move || {
            let guard = storage.lock();
            thread::sleep(Duration::from_millis(30));
            drop(guard);
        });
        thread::sleep(Duration::from_millis(5));
        fx.exfil.flush(frozen).unwrap();
        contender.join().unwrap();
        assert_eq!(fx.exfil.written, 1);
    }

    #[test]
    fn test_window_checksum_mismatch_faults() {
        let mut fx = fixture(2, 1);
        let frozen = fill_and_freeze(&fx, 0);
        fx.inject.arm_corruption(Stage::Flush);
        assert_eq!(
            fx.exfil.flush(frozen).unwrap_err(),
            FaultKind::DataCorruption {
                stage: Stage::Flush
            }
        );
    }

    #[test]
    fn test_open_failure_faults() {
        let mut fx = fixture(2, 1);
        let frozen = fill_and_freeze(&fx, 0);
        fx.inject.arm_open_failure();
        assert_eq!(
            fx.exfil.flush(frozen).unwrap_err(),
            FaultKind::StorageOpenFailed
        );
    }
}
