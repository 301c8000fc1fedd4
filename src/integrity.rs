//! CRC-32 integrity codec for the sample pipeline.
//!
//! Every hand-off a sample makes on its way to storage is covered by a
//! checksum computed on the sending side and re-derived on the receiving
//! side. All comparisons go through the single [`Codec::verify`] routine so a
//! mismatch at any hop surfaces as the same fault, tagged with the hop it was
//! caught at.

use std::fmt;
use std::sync::Arc;

use byte_slice_cast::AsByteSlice;
use crc::{Crc, CRC_32_ISO_HDLC};

use crate::fault::FaultKind;
use crate::inject::FaultInjector;
use crate::sample::Sample;

pub const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// A 32-bit digest over the byte view of a sample or a whole window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checksum(pub u32);

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// The hand-off boundaries a sample crosses between acquisition and storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Analog read, producer side
    Acquire,
    /// Copy into the mailbox message
    Enqueue,
    /// Receipt out of the mailbox, consumer side
    Dequeue,
    /// Copy out of the mailbox envelope
    Extract,
    /// The slot just written in the active window
    BufferWrite,
    /// A frozen window arriving at the persistence stage
    Flush,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Acquire => "acquire",
            Stage::Enqueue => "enqueue",
            Stage::Dequeue => "dequeue",
            Stage::Extract => "extract",
            Stage::BufferWrite => "buffer-write",
            Stage::Flush => "flush",
        };
        f.write_str(name)
    }
}

/// Stateless except for the fault-injection hook shared across the pipeline
#[derive(Clone)]
pub struct Codec {
    inject: Arc<FaultInjector>,
}

impl Codec {
    pub fn new(inject: Arc<FaultInjector>) -> Self {
        Self { inject }
    }

    /// Checksum one sample at the given hop
    pub fn compute(&self, stage: Stage, sample: &Sample) -> Result<Checksum, FaultKind> {
        if self.inject.take_compute_failure(stage) {
            return Err(FaultKind::ChecksumComputeFailed { stage });
        }
        let words = sample.words();
        Ok(Checksum(CRC32.checksum(words.as_byte_slice())))
    }

    /// Checksum a whole window at the given hop
    pub fn compute_window(&self, stage: Stage, samples: &[Sample]) -> Result<Checksum, FaultKind> {
        if self.inject.take_compute_failure(stage) {
            return Err(FaultKind::ChecksumComputeFailed { stage });
        }
        let mut digest = CRC32.digest();
        for sample in samples {
            let words = sample.words();
            digest.update(words.as_byte_slice());
        }
        Ok(Checksum(digest.finalize()))
    }

    /// Re-derive the checksum of `sample` and compare it against the value
    /// computed at the previous hop. Returns the fresh checksum so it can act
    /// as the reference for the next hop.
    pub fn verify(
        &self,
        stage: Stage,
        sample: &Sample,
        expected: Checksum,
    ) -> Result<Checksum, FaultKind> {
        let fresh = self.compute(stage, sample)?;
        let fresh = self.inject.mangle(stage, fresh);
        if fresh != expected {
            return Err(FaultKind::DataCorruption { stage });
        }
        Ok(fresh)
    }

    /// Whole-window counterpart of [`Codec::verify`]
    pub fn verify_window(
        &self,
        stage: Stage,
        samples: &[Sample],
        expected: Checksum,
    ) -> Result<Checksum, FaultKind> {
        let fresh = self.compute_window(stage, samples)?;
        let fresh = self.inject.mangle(stage, fresh);
        if fresh != expected {
            return Err(FaultKind::DataCorruption { stage });
        }
        Ok(fresh)
    }
}
