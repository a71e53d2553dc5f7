//! GPIO / peripheral pin assignments for the ElectroOxidizer main board.
//!
//! Single source of truth: every driver references this module rather than
//! hard-coding pin numbers.

// ---------------------------------------------------------------------------
// DRV8706H-Q1 H-bridge gate driver (mode 2, PH/EN)
// ---------------------------------------------------------------------------

/// EN / IN1: output enable, HIGH drives the bridge.
pub const BRIDGE_EN_GPIO: i32 = 4;
/// PH / IN2: output direction, HIGH = forward.
pub const BRIDGE_PH_GPIO: i32 = 6;
/// nHiZ1 and nHiZ2 are unused in PH/EN mode.
pub const BRIDGE_NHIZ1_GPIO: i32 = 5;
pub const BRIDGE_NHIZ2_GPIO: i32 = 7;
/// nSLEEP: HIGH = awake.
pub const BRIDGE_NSLEEP_GPIO: i32 = 15;
/// DRVOFF: HIGH = outputs disabled.
pub const BRIDGE_DRVOFF_GPIO: i32 = 16;
/// nFAULT: open drain, pulled LOW on fault.
pub const BRIDGE_NFAULT_GPIO: i32 = 17;

// ---------------------------------------------------------------------------
// RSP-1000-24 supply remote programming
// ---------------------------------------------------------------------------

/// LEDC PWM output setting the supply's output voltage.
pub const SUPPLY_PWM_GPIO: i32 = 8;

// ---------------------------------------------------------------------------
// Sensing
// ---------------------------------------------------------------------------

/// Current-sense amplifier output, ADC1 channel 1 on the ESP32-S3.
pub const CURRENT_ADC_GPIO: i32 = 2;
pub const CURRENT_ADC_CHANNEL: u32 = 1;

// ---------------------------------------------------------------------------
// User interface
// ---------------------------------------------------------------------------

/// Test button, active LOW with internal pull-up.
pub const BUTTON_GPIO: i32 = 1;
/// On-board WS2812 RGB LED.
pub const RGB_LED_GPIO: i32 = 48;
