//! Wires the collaborators together, spawns one thread per stage, and joins
//! them to an outcome.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::acquire::Acquisition;
use crate::aggregate::Aggregation;
use crate::exfil::{Exfil, SharedStorage};
use crate::fault::{Controller, FaultRecord, RunState};
use crate::inject::FaultInjector;
use crate::integrity::Codec;
use crate::mailbox::mailbox;
use crate::sensor::AnalogSource;
use crate::watchdog::Watchdog;
use crate::window::window_exchange;
use crate::{
    MAILBOX_CAPACITY, MAILBOX_TIMEOUT, SAMPLE_PERIOD_MS, STORAGE_LOCK_TIMEOUT, SWAP_TIMEOUT,
    WATCHDOG_TIMEOUT, WINDOW_LEN,
};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub sample_period: Duration,
    pub window_len: usize,
    pub mailbox_capacity: usize,
    pub mailbox_timeout: Duration,
    pub swap_timeout: Duration,
    pub lock_timeout: Duration,
    pub watchdog_timeout: Duration,
    /// How many windows to record before the run completes
    pub run_target: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_period: Duration::from_millis(SAMPLE_PERIOD_MS),
            window_len: WINDOW_LEN,
            mailbox_capacity: MAILBOX_CAPACITY,
            mailbox_timeout: MAILBOX_TIMEOUT,
            swap_timeout: SWAP_TIMEOUT,
            lock_timeout: STORAGE_LOCK_TIMEOUT,
            watchdog_timeout: WATCHDOG_TIMEOUT,
            run_target: 1,
        }
    }
}

/// How a run ended, from the process boundary's point of view
#[derive(Debug)]
pub enum Outcome {
    /// The requested number of windows was recorded
    Completed { windows: u32 },
    /// Operator stopped the run early
    Interrupted,
    /// A fault latched; the record says why
    Faulted(FaultRecord),
}

/// Drive the pipeline until the run target is met, a fault latches, or the
/// run is interrupted.
pub fn run<S: AnalogSource + 'static>(
    config: PipelineConfig,
    source: S,
    storage: SharedStorage,
    watchdog: Arc<dyn Watchdog>,
    controller: Arc<Controller>,
    inject: Arc<FaultInjector>,
) -> Outcome {
    watchdog.start(config.watchdog_timeout);
    let codec = Codec::new(inject.clone());
    let (mail_tx, mail_rx) = mailbox(
        config.mailbox_capacity,
        config.mailbox_timeout,
        inject.clone(),
    );
    let (agg_side, exfil_side) = window_exchange(config.window_len, config.swap_timeout);

    let acquisition = Acquisition::new(
        source,
        mail_tx,
        codec.clone(),
        controller.clone(),
        watchdog.clone(),
        config.sample_period,
    );
    let aggregation = Aggregation::new(
        mail_rx,
        agg_side,
        codec.clone(),
        controller.clone(),
        watchdog.clone(),
    );
    let exfil = Exfil::new(
        exfil_side,
        storage,
        codec,
        controller.clone(),
        inject,
        config.lock_timeout,
        config.run_target,
    );

    let tasks = [
        thread::spawn(move || acquisition.run()),
        thread::spawn(move || aggregation.run()),
        thread::spawn(move || exfil.run()),
    ];
    for task in tasks {
        if task.join().is_err() {
            warn!("a pipeline task panicked");
        }
    }

    match controller.state() {
        RunState::Completed => Outcome::Completed {
            windows: config.run_target,
        },
        RunState::Faulted | RunState::Restarting => match controller.record() {
            Some(record) => Outcome::Faulted(record),
            None => Outcome::Interrupted,
        },
        RunState::Interrupted => Outcome::Interrupted,
        RunState::Running => {
            // all tasks exited without any transition; should not happen
            warn!("pipeline wound down with no outcome recorded");
            Outcome::Interrupted
        }
    }
}
