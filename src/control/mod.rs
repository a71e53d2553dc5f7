//! Pure control logic: polarity timing and current-signal conditioning.
//!
//! Nothing in here touches hardware; the control loop in
//! [`crate::app::service`] feeds these with timestamps and raw samples.

pub mod conditioner;
pub mod polarity;

pub use conditioner::{Calibration, SignalConditioner};
pub use polarity::{Direction, PolarityScheduler};
