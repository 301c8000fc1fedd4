//! The acquisition task: the periodic producer at the head of the pipeline.
//!
//! Each tick it reads both photodiode channels, checksums the reading,
//! re-derives the checksum of the outgoing message copy, and puts the pair on
//! the mailbox. The tick schedule uses absolute deadlines so jitter in one
//! iteration does not accumulate.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, trace};

use crate::fault::{Controller, FaultKind};
use crate::integrity::{Codec, Stage};
use crate::mailbox::{MailboxSender, Payload};
use crate::sample::Sample;
use crate::sensor::{AnalogSource, ChannelId};
use crate::watchdog::Watchdog;

pub struct Acquisition<S: AnalogSource> {
    source: S,
    mailbox: MailboxSender,
    codec: Codec,
    controller: Arc<Controller>,
    watchdog: Arc<dyn Watchdog>,
    period: Duration,
}

impl<S: AnalogSource> Acquisition<S> {
    pub fn new(
        source: S,
        mailbox: MailboxSender,
        codec: Codec,
        controller: Arc<Controller>,
        watchdog: Arc<dyn Watchdog>,
        period: Duration,
    ) -> Self {
        Self {
            source,
            mailbox,
            codec,
            controller,
            watchdog,
            period,
        }
    }

    /// Produce until the run is stopped or a fault ends it
    pub fn run(mut self) {
        info!(period_ms = self.period.as_millis() as u64, "acquisition started");
        let mut deadline = Instant::now();
        while !self.controller.should_stop() {
            if let Err(kind) = self.tick() {
                self.controller.raise(kind);
                break;
            }
            self.watchdog.kick();
            deadline += self.period;
            thread::sleep(deadline.saturating_duration_since(Instant::now()));
        }
        info!("acquisition stopped");
    }

    fn tick(&mut self) -> Result<(), FaultKind> {
        let sample = Sample::new(
            self.source.read_channel(ChannelId::Ac),
            self.source.read_channel(ChannelId::Dc),
        );
        let read_crc = self.codec.compute(Stage::Acquire, &sample)?;
        // the message is a fresh copy; prove it still matches the reading
        // before it crosses the task boundary
        let message = sample;
        let crc = self.codec.verify(Stage::Enqueue, &message, read_crc)?;
        trace!(ac = message.ac, dc = message.dc, %crc, "sample enqueued");
        self.mailbox.put(Payload {
            sample: message,
            crc,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::RunState;
    use crate::inject::FaultInjector;
    use crate::mailbox::{mailbox, MailboxReceiver};
    use crate::sensor::{Status, StatusSignal, SyntheticPhotodiode};
    use crate::watchdog::SoftwareWatchdog;

    struct NullSignal;
    impl StatusSignal for NullSignal {
        fn set_status(&self, _status: Status) {}
    }

    fn fixture(
        inject: Arc<FaultInjector>,
    ) -> (Acquisition<SyntheticPhotodiode>, MailboxReceiver, Arc<Controller>) {
        let (tx, rx) = mailbox(64, Duration::from_millis(100), inject.clone());
        let controller = Arc::new(Controller::new(Arc::new(NullSignal)));
        let acquisition = Acquisition::new(
            SyntheticPhotodiode::new(),
            tx,
            Codec::new(inject),
            controller.clone(),
            Arc::new(SoftwareWatchdog::new()),
            Duration::from_millis(1),
        );
        (acquisition, rx, controller)
    }

    #[test]
    fn test_produces_verified_samples() {
        let inject = Arc::new(FaultInjector::default());
        let (acquisition, rx, controller) = fixture(inject.clone());
        let handle = thread::spawn(move || acquisition.run());
        let codec = Codec::new(inject);
        for _ in 0..8 {
            let payload = rx.get().expect("sample within timeout");
            // the producer-side checksum holds for the received copy
            codec
                .verify(Stage::Dequeue, &payload.sample, payload.crc)
                .expect("intact payload");
        }
        controller.interrupt();
        handle.join().unwrap();
        assert_eq!(controller.state(), RunState::Interrupted);
    }

    #[test]
    fn test_put_failure_faults_and_stops() {
        let inject = Arc::new(FaultInjector::default());
        let (acquisition, _rx, controller) = fixture(inject.clone());
        inject.arm_put_failure();
        acquisition.run();
        assert_eq!(controller.state(), RunState::Faulted);
        assert_eq!(
            controller.record().expect("record").kind,
            FaultKind::ChannelPutFailed
        );
    }

    #[test]
    fn test_compute_failure_faults() {
        let inject = Arc::new(FaultInjector::default());
        let (acquisition, _rx, controller) = fixture(inject.clone());
        inject.arm_compute_failure(Stage::Acquire);
        acquisition.run();
        assert_eq!(
            controller.record().expect("record").kind,
            FaultKind::ChecksumComputeFailed {
                stage: Stage::Acquire
            }
        );
    }
}
