//! Collaborator traits for the analog front end and the status indicators,
//! plus a synthetic photodiode so the pipeline runs without hardware.

use tracing::{info, warn};

/// The two photodiode outputs of the PPG front end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelId {
    Ac,
    Dc,
}

/// Analog input collaborator. Reads are infallible within the operating
/// envelope; anything that can go wrong downstream is caught by checksums.
pub trait AnalogSource: Send {
    fn read_channel(&mut self, channel: ChannelId) -> u16;
}

/// Deterministic stand-in for the photodiode package: a sawtooth pulse on the
/// AC channel over a near-constant baseline on DC.
pub struct SyntheticPhotodiode {
    tick: u32,
}

impl SyntheticPhotodiode {
    pub fn new() -> Self {
        Self { tick: 0 }
    }
}

impl Default for SyntheticPhotodiode {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalogSource for SyntheticPhotodiode {
    fn read_channel(&mut self, channel: ChannelId) -> u16 {
        match channel {
            ChannelId::Ac => {
                self.tick = self.tick.wrapping_add(1);
                // ~1 Hz sawtooth at a 5 ms tick
                ((self.tick % 200) * 160) as u16
            }
            ChannelId::Dc => 52_000 + (self.tick % 16) as u16,
        }
    }
}

/// Externally visible health, `ok` while sampling and `error` from fault
/// latch until restart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Error,
}

/// Signaling collaborator (the green/red LED pair on the sampling board).
/// Observational only.
pub trait StatusSignal: Send + Sync {
    fn set_status(&self, status: Status);
}

/// Status indicator backed by the log stream
pub struct LogStatus;

impl StatusSignal for LogStatus {
    fn set_status(&self, status: Status) {
        match status {
            Status::Ok => info!("status indicator: ok"),
            Status::Error => warn!("status indicator: error"),
        }
    }
}
