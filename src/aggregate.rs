//! The aggregation task: drains the mailbox, re-verifies each sample at
//! every internal copy, and fills the active window.
//!
//! A corruption fault aborts the affected sample immediately; nothing is
//! logged-and-continued. When the active window fills, its whole-window
//! checksum is computed, the window is frozen and handed to persistence, and
//! the spare window takes over with the sample counter back at zero.

use std::sync::Arc;

use tracing::{debug, info};

use crate::fault::{Controller, FaultKind};
use crate::integrity::{Codec, Stage};
use crate::mailbox::MailboxReceiver;
use crate::watchdog::Watchdog;
use crate::window::{AggregatorHandle, FrozenWindow, Window};

pub struct Aggregation {
    mailbox: MailboxReceiver,
    exchange: AggregatorHandle,
    codec: Codec,
    controller: Arc<Controller>,
    watchdog: Arc<dyn Watchdog>,
}

impl Aggregation {
    pub fn new(
        mailbox: MailboxReceiver,
        exchange: AggregatorHandle,
        codec: Codec,
        controller: Arc<Controller>,
        watchdog: Arc<dyn Watchdog>,
    ) -> Self {
        Self {
            mailbox,
            exchange,
            codec,
            controller,
            watchdog,
        }
    }

    /// Consume until the run is stopped or a fault ends it
    pub fn run(mut self) {
        let mut active = match self.exchange.acquire() {
            Ok(window) => window,
            Err(kind) => {
                self.controller.raise(kind);
                return;
            }
        };
        info!(slot = %active.slot(), capacity = active.capacity(), "aggregation started");
        while !self.controller.should_stop() {
            active = match self.step(active) {
                Ok(window) => window,
                Err(kind) => {
                    self.controller.raise(kind);
                    break;
                }
            };
            self.watchdog.kick();
        }
        info!("aggregation stopped");
    }

    /// One sample through the verification chain and into the window;
    /// returns the window to keep filling (the spare one after a swap).
    fn step(&mut self, mut window: Window) -> Result<Window, FaultKind> {
        let payload = self.mailbox.get()?;
        // receipt out of the mailbox
        let crc = self
            .codec
            .verify(Stage::Dequeue, &payload.sample, payload.crc)?;
        // copy out of the envelope
        let extract = payload.sample;
        let crc = self.codec.verify(Stage::Extract, &extract, crc)?;
        // copy into the window, then verify the slot actually written
        let written = window.push(extract);
        self.codec.verify(Stage::BufferWrite, &written, crc)?;
        if window.is_full() {
            let crc = self.codec.compute_window(Stage::Flush, window.samples())?;
            debug!(slot = %window.slot(), %crc, "window full, swapping");
            window = self.exchange.swap(FrozenWindow { window, crc })?;
        }
        Ok(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    use crate::inject::FaultInjector;
    use crate::mailbox::{mailbox, MailboxSender, Payload};
    use crate::sample::Sample;
    use crate::sensor::{Status, StatusSignal};
    use crate::watchdog::SoftwareWatchdog;
    use crate::window::{window_exchange, ExfilHandle};

    struct NullSignal;
    impl StatusSignal for NullSignal {
        fn set_status(&self, _status: Status) {}
    }

    fn fixture(
        window_len: usize,
        inject: Arc<FaultInjector>,
    ) -> (Aggregation, MailboxSender, ExfilHandle, Arc<Controller>) {
        let (tx, rx) = mailbox(64, Duration::from_millis(200), inject.clone());
        let (agg_side, exfil_side) = window_exchange(window_len, Duration::from_millis(200));
        let controller = Arc::new(Controller::new(Arc::new(NullSignal)));
        let aggregation = Aggregation::new(
            rx,
            agg_side,
            Codec::new(inject),
            controller.clone(),
            Arc::new(SoftwareWatchdog::new()),
        );
        (aggregation, tx, exfil_side, controller)
    }

    fn send(tx: &MailboxSender, inject: &Arc<FaultInjector>, n: u16) {
        let sample = Sample::new(n, n.wrapping_mul(3));
        let crc = Codec::new(inject.clone())
            .compute(Stage::Acquire, &sample)
            .unwrap();
        tx.put(Payload { sample, crc }).unwrap();
    }

    #[test]
    fn test_full_window_is_frozen_with_checksum() {
        let inject = Arc::new(FaultInjector::default());
        let (aggregation, tx, exfil, controller) = fixture(4, inject.clone());
        let handle = thread::spawn(move || aggregation.run());
        for n in 0..4 {
            send(&tx, &inject, n);
        }
        let frozen = exfil
            .next(Duration::from_millis(500))
            .expect("a frozen window");
        assert_eq!(frozen.window.len(), 4);
        assert_eq!(
            frozen.window.samples()[0],
            Sample::new(0, 0)
        );
        // the frozen checksum verifies against the content
        Codec::new(inject.clone())
            .verify_window(Stage::Flush, frozen.window.samples(), frozen.crc)
            .expect("window intact");
        exfil.reclaim(frozen.window);
        controller.interrupt();
        drop(tx);
        handle.join().unwrap();
    }

    #[test]
    fn test_counter_resets_after_swap() {
        let inject = Arc::new(FaultInjector::default());
        let (aggregation, tx, exfil, controller) = fixture(2, inject.clone());
        let handle = thread::spawn(move || aggregation.run());
        for n in 0..4 {
            send(&tx, &inject, n);
        }
        let first = exfil.next(Duration::from_millis(500)).expect("window 1");
        exfil.reclaim(first.window);
        let second = exfil.next(Duration::from_millis(500)).expect("window 2");
        // the second window restarted from an empty buffer
        assert_eq!(second.window.len(), 2);
        assert_eq!(second.window.samples()[0], Sample::new(2, 6));
        exfil.reclaim(second.window);
        controller.interrupt();
        drop(tx);
        handle.join().unwrap();
    }

    #[test]
    fn test_corruption_at_dequeue_faults() {
        let inject = Arc::new(FaultInjector::default());
        let (aggregation, tx, _exfil, controller) = fixture(4, inject.clone());
        inject.arm_corruption(Stage::Dequeue);
        send(&tx, &inject, 1);
        aggregation.run();
        assert_eq!(
            controller.record().expect("record").kind,
            FaultKind::DataCorruption {
                stage: Stage::Dequeue
            }
        );
    }

    #[test]
    fn test_get_timeout_faults() {
        let inject = Arc::new(FaultInjector::default());
        let (aggregation, tx, _exfil, controller) = fixture(4, inject);
        // nothing is ever sent
        aggregation.run();
        assert_eq!(
            controller.record().expect("record").kind,
            FaultKind::ChannelGetFailed
        );
        drop(tx);
    }
}
