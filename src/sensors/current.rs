//! Current-sense sampler: the ISR-to-loop hand-off for ADC batches.
//!
//! ```text
//!  ADC DMA ──▶ conv-done ISR ──▶ ConversionSignal (AtomicU32)
//!                                        │ take()
//!  control loop ──▶ CurrentSampler::drain ──▶ AdcPort::read_samples ──▶ SampleBatch
//! ```
//!
//! The ISR only bumps a counter.  Frame decoding and all buffer handling
//! happen on the control-loop context, so nothing here allocates or blocks
//! in interrupt context.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::app::ports::AdcPort;
use crate::control::Direction;
use crate::error::{Error, SensorError};

// ───────────────────────────────────────────────────────────────
// ISR hand-off
// ───────────────────────────────────────────────────────────────

/// Single-producer / single-consumer "conversion frames ready" counter.
pub struct ConversionSignal {
    pending: AtomicU32,
}

impl ConversionSignal {
    pub const fn new() -> Self {
        Self {
            pending: AtomicU32::new(0),
        }
    }

    /// Record one completed conversion frame.  ISR-safe.
    pub fn notify(&self) {
        self.pending.fetch_add(1, Ordering::Release);
    }

    /// Take every pending notification, leaving the counter at zero.
    pub fn take(&self) -> u32 {
        self.pending.swap(0, Ordering::AcqRel)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire) != 0
    }
}

impl Default for ConversionSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Signal raised by the continuous-ADC conversion-done callback.
pub static ADC_FRAMES_READY: ConversionSignal = ConversionSignal::new();

/// Signal raised when the driver's result pool overflowed.
pub static ADC_POOL_OVERFLOWED: ConversionSignal = ConversionSignal::new();

// ───────────────────────────────────────────────────────────────
// Frame decoding
// ───────────────────────────────────────────────────────────────

/// Bytes per conversion result in ESP32-S3 type-2 output format.
pub const TYPE2_RESULT_BYTES: usize = 4;

/// Decode ESP32-S3 type-2 continuous-mode results.
///
/// Each result is a little-endian word: bits 0..12 data, bits 13..17
/// channel, bit 17 unit.  Only ADC1 results for `channel` are appended to
/// `out`, stopping once `out` holds `max` samples.  Trailing partial words
/// are ignored.  Returns the number of samples appended.
pub fn decode_type2(frame: &[u8], channel: u32, out: &mut Vec<u16>, max: usize) -> usize {
    let before = out.len();
    for chunk in frame.chunks_exact(TYPE2_RESULT_BYTES) {
        if out.len() >= max {
            break;
        }
        let word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        let data = (word & 0x0FFF) as u16;
        let ch = (word >> 13) & 0x0F;
        let unit = (word >> 17) & 0x01;
        if unit == 0 && ch == channel {
            out.push(data);
        }
    }
    out.len() - before
}

// ───────────────────────────────────────────────────────────────
// Sampler
// ───────────────────────────────────────────────────────────────

/// Raw samples drained in one iteration, tagged with the polarity that
/// was active while they were converted.
#[derive(Debug, Clone, Copy)]
pub struct SampleBatch<'a> {
    pub direction: Direction,
    pub samples: &'a [u16],
}

/// Owns the per-iteration working buffer.
pub struct CurrentSampler {
    buf: Vec<u16>,
    capacity: usize,
    read_errors: u32,
    overruns: u32,
}

impl CurrentSampler {
    /// Reserve the working buffer up front.  Failure here is fatal: the
    /// device must not run without current sensing.
    pub fn new(capacity: usize) -> Result<Self, Error> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(capacity)
            .map_err(|_| Error::Init("adc buffer"))?;
        Ok(Self {
            buf,
            capacity,
            read_errors: 0,
            overruns: 0,
        })
    }

    /// Pull up to one buffer of samples.  `Ok(None)` when nothing new was
    /// converted; on error the caller skips the iteration.
    pub fn drain<'a>(
        &'a mut self,
        adc: &mut impl AdcPort,
        direction: Direction,
    ) -> crate::error::Result<Option<SampleBatch<'a>>> {
        self.buf.clear();
        match adc.read_samples(&mut self.buf, self.capacity) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(SampleBatch {
                direction,
                samples: &self.buf,
            })),
            Err(e) => {
                match e {
                    SensorError::AdcOverrun => self.overruns = self.overruns.wrapping_add(1),
                    SensorError::AdcReadFailed => self.read_errors = self.read_errors.wrapping_add(1),
                }
                Err(e.into())
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn read_errors(&self) -> u32 {
        self.read_errors
    }

    pub fn overruns(&self) -> u32 {
        self.overruns
    }
}
