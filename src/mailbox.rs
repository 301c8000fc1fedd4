//! Bounded, blocking-with-timeout hand-off of samples from the acquisition
//! task to the aggregation task.
//!
//! A put timeout means the consumer side stalled; a get timeout means the
//! producer stalled. Sampling cadence is a hard requirement, so neither is
//! retried; both are faults.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::fault::FaultKind;
use crate::inject::FaultInjector;
use crate::integrity::Checksum;
use crate::sample::Sample;

/// A sample plus the checksum computed on the producer side, carried across
/// the task boundary together
#[derive(Debug, Clone, Copy)]
pub struct Payload {
    pub sample: Sample,
    pub crc: Checksum,
}

pub struct MailboxSender {
    tx: Sender<Payload>,
    timeout: Duration,
    inject: Arc<FaultInjector>,
}

pub struct MailboxReceiver {
    rx: Receiver<Payload>,
    timeout: Duration,
    inject: Arc<FaultInjector>,
}

/// Build the mailbox pair. Capacity is fixed for the pipeline's lifetime.
pub fn mailbox(
    capacity: usize,
    timeout: Duration,
    inject: Arc<FaultInjector>,
) -> (MailboxSender, MailboxReceiver) {
    let (tx, rx) = bounded(capacity);
    (
        MailboxSender {
            tx,
            timeout,
            inject: inject.clone(),
        },
        MailboxReceiver {
            rx,
            timeout,
            inject,
        },
    )
}

impl MailboxSender {
    /// Blocks until a slot frees up, at most the configured timeout
    pub fn put(&self, payload: Payload) -> Result<(), FaultKind> {
        if self.inject.take_put_failure() {
            return Err(FaultKind::ChannelPutFailed);
        }
        self.tx
            .send_timeout(payload, self.timeout)
            .map_err(|_| FaultKind::ChannelPutFailed)
    }
}

impl MailboxReceiver {
    /// Blocks until a sample arrives, at most the configured timeout
    pub fn get(&self) -> Result<Payload, FaultKind> {
        if self.inject.take_get_failure() {
            return Err(FaultKind::ChannelGetFailed);
        }
        self.rx.recv_timeout(self.timeout).map_err(|_| FaultKind::ChannelGetFailed)
    }
}
