//! The double buffer: two fixed-capacity sample windows cycled between the
//! aggregation and persistence tasks.
//!
//! Which window is "active" is not a shared flag anybody reads; it is whoever
//! currently owns the value. The two windows travel over a pair of channels
//! (frozen windows one way, emptied windows back), so at most one task can
//! touch a given window at any time by construction.

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::fault::FaultKind;
use crate::integrity::Checksum;
use crate::sample::Sample;

/// Permanent identity of each of the two window buffers, for logging and the
/// defensive swap check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    A,
    B,
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Slot::A => f.write_str("A"),
            Slot::B => f.write_str("B"),
        }
    }
}

/// One fixed-capacity batch of samples covering a window of time
#[derive(Debug)]
pub struct Window {
    slot: Slot,
    cap: usize,
    samples: Vec<Sample>,
}

impl Window {
    fn with_capacity(slot: Slot, cap: usize) -> Self {
        Self {
            slot,
            cap,
            samples: Vec::with_capacity(cap),
        }
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.cap
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Append a sample and read the stored copy back out, so the caller can
    /// verify the write landed intact.
    pub fn push(&mut self, sample: Sample) -> Sample {
        debug_assert!(!self.is_full());
        self.samples.push(sample);
        self.samples[self.samples.len() - 1]
    }

    /// Empty the window for reuse after its contents were written out
    pub fn reclaim(&mut self) {
        self.samples.clear();
    }
}

/// A full window on its way to persistence, read-only from here on, carrying
/// the checksum computed when it was declared full
pub struct FrozenWindow {
    pub window: Window,
    pub crc: Checksum,
}

/// Aggregation-side handle: acquire the first active window, then swap a
/// frozen window for an empty one each time the active one fills.
pub struct AggregatorHandle {
    flush_tx: Sender<FrozenWindow>,
    free_rx: Receiver<Window>,
    timeout: Duration,
}

/// Persistence-side handle: take frozen windows, hand emptied ones back.
pub struct ExfilHandle {
    flush_rx: Receiver<FrozenWindow>,
    free_tx: Sender<Window>,
}

/// Build the window exchange. Exactly two windows exist for the pipeline's
/// lifetime; both start on the free side.
pub fn window_exchange(
    window_len: usize,
    timeout: Duration,
) -> (AggregatorHandle, ExfilHandle) {
    let (flush_tx, flush_rx) = bounded(1);
    let (free_tx, free_rx) = bounded(2);
    // seeding cannot fail, the channel has room for both
    let _ = free_tx.send(Window::with_capacity(Slot::A, window_len));
    let _ = free_tx.send(Window::with_capacity(Slot::B, window_len));
    (
        AggregatorHandle {
            flush_tx,
            free_rx,
            timeout,
        },
        ExfilHandle { flush_rx, free_tx },
    )
}

impl AggregatorHandle {
    /// Take the first active window at startup
    pub fn acquire(&self) -> Result<Window, FaultKind> {
        self.free_rx
            .recv_timeout(self.timeout)
            .map_err(|_| FaultKind::BufferSelectorInvalid)
    }

    /// Hand the frozen window to persistence and reclaim the spare. The swap
    /// fails if persistence has stalled (no room for the frozen window, or no
    /// spare comes back in time) or if the spare is somehow the window just
    /// sent.
    pub fn swap(&self, frozen: FrozenWindow) -> Result<Window, FaultKind> {
        let sent = frozen.window.slot();
        self.flush_tx
            .send_timeout(frozen, self.timeout)
            .map_err(|_| FaultKind::BufferSelectorInvalid)?;
        let next = self
            .free_rx
            .recv_timeout(self.timeout)
            .map_err(|_| FaultKind::BufferSelectorInvalid)?;
        if next.slot() == sent {
            return Err(FaultKind::BufferSelectorInvalid);
        }
        Ok(next)
    }
}

impl ExfilHandle {
    /// Wait briefly for the next frozen window. `None` means nothing arrived
    /// yet; the caller re-checks the stop flag and tries again.
    pub fn next(&self, patience: Duration) -> Option<FrozenWindow> {
        self.flush_rx.recv_timeout(patience).ok()
    }

    /// Return an emptied window to the aggregation side
    pub fn reclaim(&self, mut window: Window) {
        window.reclaim();
        // aggregation being gone is fine, the run is over either way
        let _ = self.free_tx.send(window);
    }
}
