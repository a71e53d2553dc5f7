//! Tunable constants and the persisted settings document.
//!
//! Calibration coefficients, timing windows and connectivity policy live
//! here as constants.  The operator-adjustable part ([`Settings`]) is a
//! serde document stored through the [`ConfigPort`](crate::app::ports::ConfigPort)
//! and loaded at boot with per-field defaulting.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Current sensing calibration (device-specific, 7/5/25 calibration run)
// ---------------------------------------------------------------------------

/// Amps per ADC code.
pub const ADC_SLOPE: f32 = 0.019_239_75;
/// Amps at ADC code zero.
pub const ADC_INTERCEPT: f32 = -39.390_01;
/// Samples per direction accumulated before an average is published.
pub const AVERAGE_WINDOW: u32 = 100;
/// A negative reading at least this many times the positive one is treated
/// as sensor saturation and clamped.
pub const SATURATION_RATIO: f32 = 1.1;
/// Decoded samples drained from the ADC per loop iteration.
pub const ADC_BATCH_SAMPLES: usize = 256;
/// Continuous-mode sample rate.
pub const ADC_SAMPLE_RATE_HZ: u32 = 20_000;

// ---------------------------------------------------------------------------
// Supply voltage control
// ---------------------------------------------------------------------------

/// Volts per PWM count on the supply's remote-programming input.
pub const VOLTS_PER_PWM_COUNT: f32 = 0.030_168_606;
/// Supply PWM carrier.
pub const SUPPLY_PWM_FREQ_HZ: u32 = 25_000;
/// Supply PWM resolution (10 bits, 0-1023).
pub const SUPPLY_PWM_BITS: u32 = 10;

// ---------------------------------------------------------------------------
// Control parameter bounds and defaults
// ---------------------------------------------------------------------------

pub const VOLTAGE_MIN: f32 = 0.0;
pub const VOLTAGE_MAX: f32 = 24.0;
pub const DWELL_MIN_MS: u32 = 10;
pub const DWELL_MAX_MS: u32 = 60_000;

pub const DEFAULT_TARGET_VOLTAGE: f32 = 14.0;
pub const DEFAULT_FORWARD_MS: u32 = 100;
pub const DEFAULT_REVERSE_MS: u32 = 100;

// ---------------------------------------------------------------------------
// Loop timing
// ---------------------------------------------------------------------------

/// Snapshot publication period while running.
pub const NOTIFY_INTERVAL_MS: u64 = 500;
/// One-shot peak rearm after boot, discarding start-up transients.
pub const PEAK_REARM_AFTER_BOOT_MS: u64 = 60_000;
/// Iterations slower than this are reported by the loop budget monitor.
pub const LOOP_BUDGET_US: u64 = 9_000;

// ---------------------------------------------------------------------------
// Connectivity policy
// ---------------------------------------------------------------------------

pub const MAX_NETWORKS: usize = 5;
pub const CONNECT_ATTEMPT_TIMEOUT_MS: u64 = 15_000;
pub const BOOT_STABILIZATION_MS: u64 = 30_000;
pub const RECONNECT_BASE_MS: u64 = 10_000;
pub const RECONNECT_CAP_MS: u64 = 300_000;

// ---------------------------------------------------------------------------
// Provisioning reset detection
// ---------------------------------------------------------------------------

pub const BUTTON_DEBOUNCE_MS: u64 = 50;
pub const BUTTON_RESET_WINDOW_MS: u64 = 5_000;
pub const BUTTON_RESET_COUNT: usize = 3;
pub const POWER_CYCLE_WINDOW_MS: u64 = 10_000;
pub const POWER_CYCLE_RESET_COUNT: u32 = 3;

// ---------------------------------------------------------------------------
// Storage layout
// ---------------------------------------------------------------------------

pub const STORAGE_NAMESPACE: &str = "eox";
pub const SETTINGS_KEY: &str = "settings";
pub const NETWORKS_KEY: &str = "networks";
pub const LAST_NETWORK_KEY: &str = "net_last";
pub const POWER_CYCLE_KEY: &str = "pwr_cycles";

/// Identity strings (display name, hostname).
pub type NameString = heapless::String<32>;

/// Operator-adjustable settings, persisted as a JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub target_voltage: f32,
    pub forward_time_ms: u32,
    pub reverse_time_ms: u32,
    /// Empty until an identity has been assigned.
    pub device_name: NameString,
    pub hostname: NameString,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target_voltage: DEFAULT_TARGET_VOLTAGE,
            forward_time_ms: DEFAULT_FORWARD_MS,
            reverse_time_ms: DEFAULT_REVERSE_MS,
            device_name: NameString::new(),
            hostname: NameString::new(),
        }
    }
}

impl Settings {
    /// Replace any out-of-range control value with its default.
    /// Returns the number of fields that were repaired.
    pub fn sanitize(&mut self) -> usize {
        let mut repaired = 0;
        if !voltage_in_range(self.target_voltage) {
            self.target_voltage = DEFAULT_TARGET_VOLTAGE;
            repaired += 1;
        }
        if !dwell_in_range(self.forward_time_ms) {
            self.forward_time_ms = DEFAULT_FORWARD_MS;
            repaired += 1;
        }
        if !dwell_in_range(self.reverse_time_ms) {
            self.reverse_time_ms = DEFAULT_REVERSE_MS;
            repaired += 1;
        }
        repaired
    }

    /// Fill empty identity fields from `default_name`.
    pub fn apply_default_identity(&mut self, default_name: &str) {
        if self.device_name.is_empty() {
            self.device_name = truncated(default_name);
        }
        if self.hostname.is_empty() {
            self.hostname = truncated(default_name);
        }
    }

    /// Full validation, used before persisting.
    pub fn validate(&self) -> Result<(), &'static str> {
        if !voltage_in_range(self.target_voltage) {
            return Err("targetVoltage must be 0-24 V");
        }
        if !dwell_in_range(self.forward_time_ms) {
            return Err("forwardTimeMs must be 10-60000");
        }
        if !dwell_in_range(self.reverse_time_ms) {
            return Err("reverseTimeMs must be 10-60000");
        }
        Ok(())
    }
}

pub fn voltage_in_range(volts: f32) -> bool {
    volts.is_finite() && (VOLTAGE_MIN..=VOLTAGE_MAX).contains(&volts)
}

pub fn dwell_in_range(ms: u32) -> bool {
    (DWELL_MIN_MS..=DWELL_MAX_MS).contains(&ms)
}

/// Copy as much of `s` as fits, never splitting a UTF-8 character.
pub fn truncated(s: &str) -> NameString {
    let mut out = NameString::new();
    for ch in s.chars() {
        if out.push(ch).is_err() {
            break;
        }
    }
    out
}
