//! Fault taxonomy and the latch-once recovery controller.
//!
//! Every failure in the pipeline is fatal to the current run: the first one
//! latches, all stages wind down, and the process boundary requests a
//! restart. Later faults are dropped (one record per run), but each stage
//! still reports the specific kind it hit so the restart is diagnosable.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::integrity::Stage;
use crate::sensor::{Status, StatusSignal};

/// The classified, non-retryable conditions that halt the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FaultKind {
    #[error("checksum creation failed at {stage}")]
    ChecksumComputeFailed { stage: Stage },
    #[error("data corruption detected at {stage}")]
    DataCorruption { stage: Stage },
    #[error("failed to put a sample on the mailbox")]
    ChannelPutFailed,
    #[error("failed to get a sample from the mailbox")]
    ChannelGetFailed,
    #[error("storage lock not acquired in time, assuming deadlock")]
    PersistenceDeadlock,
    #[error("could not open storage for write")]
    StorageOpenFailed,
    #[error("writing a record to storage failed")]
    StorageWriteFailed,
    #[error("window swap failed")]
    BufferSelectorInvalid,
}

/// Why the pipeline halted. Created once; the process restarts rather than
/// act on it further.
#[derive(Debug, Clone, Copy)]
pub struct FaultRecord {
    pub kind: FaultKind,
    pub raised_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Completed,
    Interrupted,
    Faulted,
    Restarting,
}

const RUNNING: u8 = 0;
const COMPLETED: u8 = 1;
const INTERRUPTED: u8 = 2;
const FAULTED: u8 = 3;
const RESTARTING: u8 = 4;

/// Shared fault latch and stop flag for the whole pipeline.
///
/// All state transitions out of `Running` happen exactly once; whichever
/// stage wins the race owns the outcome and everyone else observes the stop
/// flag and winds down.
pub struct Controller {
    state: AtomicU8,
    stop: AtomicBool,
    record: Mutex<Option<FaultRecord>>,
    status: Arc<dyn StatusSignal>,
}

impl Controller {
    pub fn new(status: Arc<dyn StatusSignal>) -> Self {
        Self {
            state: AtomicU8::new(RUNNING),
            stop: AtomicBool::new(false),
            record: Mutex::new(None),
            status,
        }
    }

    /// Latch a fault. Idempotent: only the first fault of a run is recorded,
    /// later ones are dropped.
    pub fn raise(&self, kind: FaultKind) {
        if self
            .state
            .compare_exchange(RUNNING, FAULTED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            error!(%kind, "fault latched, stopping all pipeline tasks");
            *self.record.lock() = Some(FaultRecord {
                kind,
                raised_at: Instant::now(),
            });
            self.status.set_status(Status::Error);
            self.stop.store(true, Ordering::Release);
        } else {
            debug!(%kind, "fault raised after halt, dropped");
        }
    }

    /// The run target was met; stop sampling cleanly.
    pub fn complete(&self) {
        if self
            .state
            .compare_exchange(RUNNING, COMPLETED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            info!("run target reached, stopping pipeline");
            self.stop.store(true, Ordering::Release);
        }
    }

    /// Operator-initiated wind-down (Ctrl-C); not a fault.
    pub fn interrupt(&self) {
        if self
            .state
            .compare_exchange(RUNNING, INTERRUPTED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            info!("interrupt received, stopping pipeline");
            self.stop.store(true, Ordering::Release);
        }
    }

    /// Terminal transition taken by the process boundary once the outcome is
    /// reported and the restart request goes out.
    pub fn begin_restart(&self) {
        self.state.store(RESTARTING, Ordering::Release);
    }

    pub fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub fn state(&self) -> RunState {
        match self.state.load(Ordering::Acquire) {
            COMPLETED => RunState::Completed,
            INTERRUPTED => RunState::Interrupted,
            FAULTED => RunState::Faulted,
            RESTARTING => RunState::Restarting,
            _ => RunState::Running,
        }
    }

    pub fn record(&self) -> Option<FaultRecord> {
        *self.record.lock()
    }
}
