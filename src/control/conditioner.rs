//! Signal conditioner: raw ADC codes to direction-aware current figures.
//!
//! ```text
//!  raw ──▶ current = raw·slope + intercept ──┬──▶ latest / peaks
//!                                            │
//!              forward && current > 0 ───────┼──▶ positive accumulator ─┐
//!              reverse && current < 0 ───────┘──▶ negative accumulator ─┤
//!                                                                      ▼
//!                        count >= window: average = mean·slope + intercept
//! ```
//!
//! Samples whose sign disagrees with the active direction are dropped on
//! purpose: they are the switching transients right after a flip.  Every
//! update of a peak or an average re-applies the saturation clamp, which
//! pins the negative figure to `-positive` when it reaches
//! `ratio × |positive|`.
//!
//! Everything here is O(1) per sample with no buffering.

use super::polarity::Direction;
use crate::config;

/// Linear model from ADC code to amps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub slope: f32,
    pub intercept: f32,
}

impl Calibration {
    /// Coefficients from the bench calibration of the production board.
    pub const fn factory() -> Self {
        Self {
            slope: config::ADC_SLOPE,
            intercept: config::ADC_INTERCEPT,
        }
    }

    pub fn current(&self, raw: f32) -> f32 {
        raw * self.slope + self.intercept
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self::factory()
    }
}

/// Running sum and count of raw codes for one direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Accumulator {
    sum: u64,
    count: u32,
}

impl Accumulator {
    fn add(&mut self, raw: u16) {
        self.sum += u64::from(raw);
        self.count += 1;
    }

    fn mean_raw(&self) -> f32 {
        self.sum as f32 / self.count as f32
    }

    fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn sum(&self) -> u64 {
        self.sum
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

/// Where an ingested sample ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFate {
    Positive,
    Negative,
    Dropped,
}

/// Averages published by one `drain_if_full` call.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Drained {
    pub positive: Option<f32>,
    pub negative: Option<f32>,
}

impl Drained {
    pub fn any(&self) -> bool {
        self.positive.is_some() || self.negative.is_some()
    }
}

/// Clamp `negative` to `-positive` when it is disproportionately large.
///
/// The asymmetry is intentional: only the negative figure is ever clamped.
/// A positive reading far larger than the negative one passes through.
pub fn clamp_saturation(positive: f32, negative: f32, ratio: f32) -> f32 {
    if negative.abs() >= ratio * positive.abs() {
        // `0.0 - x` rather than `-x` so a zero reading stays +0.0.
        0.0 - positive
    } else {
        negative
    }
}

#[derive(Debug, Clone)]
pub struct SignalConditioner {
    cal: Calibration,
    saturation_ratio: f32,
    positive: Accumulator,
    negative: Accumulator,
    latest_raw: u16,
    latest_current: f32,
    average_positive: f32,
    average_negative: f32,
    peak_positive: f32,
    peak_negative: f32,
}

impl SignalConditioner {
    pub fn new(cal: Calibration) -> Self {
        Self::with_ratio(cal, config::SATURATION_RATIO)
    }

    pub fn with_ratio(cal: Calibration, saturation_ratio: f32) -> Self {
        Self {
            cal,
            saturation_ratio,
            positive: Accumulator::default(),
            negative: Accumulator::default(),
            latest_raw: 0,
            latest_current: 0.0,
            average_positive: 0.0,
            average_negative: 0.0,
            peak_positive: 0.0,
            peak_negative: 0.0,
        }
    }

    /// Convert one sample, gate it into the matching accumulator and
    /// update the peaks.
    pub fn ingest(&mut self, raw: u16, direction: Direction) -> SampleFate {
        let current = self.cal.current(f32::from(raw));
        self.latest_raw = raw;
        self.latest_current = current;

        let fate = match direction {
            Direction::Forward if current > 0.0 => {
                self.positive.add(raw);
                SampleFate::Positive
            }
            Direction::Reverse if current < 0.0 => {
                self.negative.add(raw);
                SampleFate::Negative
            }
            _ => SampleFate::Dropped,
        };

        self.update_peak(current, direction);
        fate
    }

    /// Replace the direction's peak when `current` is more extreme.
    pub fn update_peak(&mut self, current: f32, direction: Direction) {
        match direction {
            Direction::Forward if current > self.peak_positive => self.peak_positive = current,
            Direction::Reverse if current < self.peak_negative => self.peak_negative = current,
            _ => {}
        }
        self.peak_negative =
            clamp_saturation(self.peak_positive, self.peak_negative, self.saturation_ratio);
    }

    /// Publish the average of any accumulator holding `threshold` samples
    /// and zero it.  A threshold of zero behaves like one.
    pub fn drain_if_full(&mut self, threshold: u32) -> Drained {
        let threshold = threshold.max(1);
        let mut drained = Drained::default();

        if self.positive.count >= threshold {
            self.average_positive = self.cal.current(self.positive.mean_raw());
            self.positive.clear();
            drained.positive = Some(self.average_positive);
        }
        if self.negative.count >= threshold {
            self.average_negative = self.cal.current(self.negative.mean_raw());
            self.negative.clear();
            drained.negative = Some(self.average_negative);
        }

        if drained.any() {
            self.average_negative = clamp_saturation(
                self.average_positive,
                self.average_negative,
                self.saturation_ratio,
            );
            if drained.negative.is_some() {
                drained.negative = Some(self.average_negative);
            }
        }
        drained
    }

    /// Zero peaks and both accumulators.
    pub fn reset_peaks(&mut self) {
        self.peak_positive = 0.0;
        self.peak_negative = 0.0;
        self.positive.clear();
        self.negative.clear();
    }

    pub fn calibration(&self) -> Calibration {
        self.cal
    }

    pub fn positive(&self) -> Accumulator {
        self.positive
    }

    pub fn negative(&self) -> Accumulator {
        self.negative
    }

    pub fn latest_raw(&self) -> u16 {
        self.latest_raw
    }

    pub fn latest_current(&self) -> f32 {
        self.latest_current
    }

    pub fn average_positive(&self) -> f32 {
        self.average_positive
    }

    pub fn average_negative(&self) -> f32 {
        self.average_negative
    }

    pub fn peak_positive(&self) -> f32 {
        self.peak_positive
    }

    pub fn peak_negative(&self) -> f32 {
        self.peak_negative
    }
}

impl Default for SignalConditioner {
    fn default() -> Self {
        Self::new(Calibration::factory())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNIT: Calibration = Calibration {
        slope: 1.0,
        intercept: 0.0,
    };

    /// Calibration centred on code 2000: above is positive current.
    const CENTRED: Calibration = Calibration {
        slope: 0.01,
        intercept: -20.0,
    };

    #[test]
    fn forward_window_average_is_exact_mean() {
        let mut c = SignalConditioner::new(UNIT);
        let codes: Vec<u16> = (1..=100).map(|i| i * 37 % 4000 + 1).collect();
        for &raw in &codes {
            assert_eq!(c.ingest(raw, Direction::Forward), SampleFate::Positive);
        }
        let sum: u64 = codes.iter().map(|&r| u64::from(r)).sum();
        let drained = c.drain_if_full(100);
        assert_eq!(drained.positive, Some(sum as f32 / 100.0));
        assert_eq!(c.positive().count(), 0);
    }

    #[test]
    fn wrong_sign_samples_are_dropped() {
        let mut c = SignalConditioner::new(CENTRED);
        assert_eq!(c.ingest(1500, Direction::Forward), SampleFate::Dropped);
        assert_eq!(c.ingest(2500, Direction::Reverse), SampleFate::Dropped);
        assert_eq!(c.positive().count(), 0);
        assert_eq!(c.negative().count(), 0);
        assert_eq!(c.latest_raw(), 2500);
    }

    #[test]
    fn drain_waits_for_threshold() {
        let mut c = SignalConditioner::new(CENTRED);
        for _ in 0..99 {
            c.ingest(2100, Direction::Forward);
        }
        assert!(!c.drain_if_full(100).any());
        c.ingest(2100, Direction::Forward);
        let d = c.drain_if_full(100);
        assert!(d.positive.is_some());
        assert!((c.average_positive() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn negative_average_clamped_against_positive() {
        let mut c = SignalConditioner::new(CENTRED);
        for _ in 0..100 {
            c.ingest(2100, Direction::Forward); // +1 A
        }
        c.drain_if_full(100);
        for _ in 0..100 {
            c.ingest(1500, Direction::Reverse); // -5 A, saturated
        }
        let d = c.drain_if_full(100);
        assert_eq!(d.negative, Some(-c.average_positive()));
        assert_eq!(c.average_negative(), -c.average_positive());
    }

    #[test]
    fn balanced_negative_average_kept() {
        let mut c = SignalConditioner::new(CENTRED);
        for _ in 0..100 {
            c.ingest(2200, Direction::Forward); // +2 A
        }
        for _ in 0..100 {
            c.ingest(1810, Direction::Reverse); // -1.9 A
        }
        c.drain_if_full(100);
        assert!((c.average_negative() + 1.9).abs() < 1e-3);
    }

    #[test]
    fn peaks_track_extremes_and_clamp() {
        let mut c = SignalConditioner::new(CENTRED);
        c.ingest(2300, Direction::Forward); // +3
        c.ingest(2100, Direction::Forward); // +1, not a new peak
        assert!((c.peak_positive() - 3.0).abs() < 1e-4);
        c.ingest(1750, Direction::Reverse); // -2.5
        assert!((c.peak_negative() + 2.5).abs() < 1e-4);
        c.ingest(1000, Direction::Reverse); // -10, saturated
        assert_eq!(c.peak_negative(), -c.peak_positive());
    }

    #[test]
    fn forward_peak_ignores_negative_current() {
        let mut c = SignalConditioner::new(CENTRED);
        c.ingest(2300, Direction::Forward);
        // Forward direction, negative current: dropped, peaks untouched.
        assert_eq!(c.ingest(1000, Direction::Forward), SampleFate::Dropped);
        assert!((c.peak_positive() - 3.0).abs() < 1e-4);
        assert_eq!(c.peak_negative(), 0.0);
    }

    #[test]
    fn reset_peaks_clears_peaks_and_accumulators() {
        let mut c = SignalConditioner::new(CENTRED);
        c.ingest(2300, Direction::Forward);
        c.ingest(1900, Direction::Reverse);
        c.reset_peaks();
        assert_eq!(c.peak_positive(), 0.0);
        assert_eq!(c.peak_negative(), 0.0);
        assert_eq!(c.positive().count(), 0);
        assert_eq!(c.negative().count(), 0);
    }

    #[test]
    fn clamp_keeps_zero_positive() {
        let v = clamp_saturation(0.0, 0.0, 1.1);
        assert_eq!(v, 0.0);
        assert!(v.is_sign_positive());
    }

    #[test]
    fn clamp_is_one_sided() {
        assert_eq!(clamp_saturation(1.0, -3.0, 1.1), -1.0);
        assert_eq!(clamp_saturation(1.0, -0.5, 1.1), -0.5);
        // A lopsided positive figure is not a reason to touch the negative.
        assert_eq!(clamp_saturation(10.0, -0.2, 1.1), -0.2);
    }

    #[test]
    fn factory_calibration_centres_near_mid_scale() {
        let cal = Calibration::factory();
        assert!(cal.current(2047.0).abs() < 0.1);
    }
}
