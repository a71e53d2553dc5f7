//! Sensing subsystem.
//!
//! The only sensor on this board is the H-bridge output current, sampled
//! by the continuous-mode ADC and handed to the control loop in batches.

pub mod current;

pub use current::{ADC_FRAMES_READY, ConversionSignal, CurrentSampler, SampleBatch};
