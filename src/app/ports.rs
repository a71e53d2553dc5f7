//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ AppService (domain)
//! ```
//!
//! Driven adapters (ADC, power stage, radio, flash, event sinks) implement
//! these traits.  The [`AppService`](super::service::AppService) consumes
//! them via generics, so the control core never touches hardware directly
//! and runs unchanged against the mocks in `tests/integration`.
//!
//! Every port is non-blocking: a call returns within the loop's
//! single-digit-millisecond budget or reports an error.

use core::fmt;

use crate::config::Settings;
use crate::control::Direction;
use crate::credentials::{Credential, PortalSubmission};
use crate::error::{ActuatorError, SensorError, StorageError};

// ───────────────────────────────────────────────────────────────
// ADC port (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// Continuous-mode current-sense ADC.
pub trait AdcPort {
    /// Append up to `max` raw codes that are ready now to `out`.
    ///
    /// Returns the number of codes appended; `Ok(0)` means nothing was
    /// pending.  Never waits for a conversion.
    fn read_samples(&mut self, out: &mut Vec<u16>, max: usize) -> Result<usize, SensorError>;
}

// ───────────────────────────────────────────────────────────────
// Actuator port (driven adapter: domain → hardware)
// ───────────────────────────────────────────────────────────────

/// Power stage and status LED.
pub trait ActuatorPort {
    /// Drive the bridge phase pin for `direction`.
    fn set_direction(&mut self, direction: Direction) -> Result<(), ActuatorError>;

    /// Enable the bridge outputs.
    fn enable_output(&mut self) -> Result<(), ActuatorError>;

    /// Disable the bridge outputs (cell floats).
    fn disable_output(&mut self) -> Result<(), ActuatorError>;

    /// Program the supply's output voltage.
    fn set_supply_voltage(&mut self, volts: f32) -> Result<(), ActuatorError>;

    /// Set the RGB status LED colour.
    fn set_led(&mut self, r: u8, g: u8, b: u8);

    /// Outputs off, supply to zero, LED dark: safe shutdown.
    fn all_off(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Input port (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// Discrete inputs polled once per iteration.
pub trait InputPort {
    /// The H-bridge driver is signalling a fault.
    fn bridge_faulted(&mut self) -> bool;

    /// Raw (undebounced) level of the test button; `true` while held.
    fn button_pressed(&mut self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// WiFi port (driven adapter: domain ↔ radio)
// ───────────────────────────────────────────────────────────────

/// Non-blocking station and provisioning access point control.
///
/// Association progress is observed by polling [`is_connected`]; the
/// connectivity engine enforces its own attempt deadlines.
///
/// [`is_connected`]: WifiPort::is_connected
pub trait WifiPort {
    /// Start associating with `credential`.  Returns immediately.
    fn begin_connect(&mut self, credential: &Credential) -> Result<(), WifiError>;

    /// Station is associated and has an address.
    fn is_connected(&mut self) -> bool;

    /// Drop the station link or abandon an in-flight attempt.
    fn disconnect(&mut self);

    /// Open the provisioning access point (open network named `ap_ssid`).
    fn start_portal(&mut self, ap_ssid: &str) -> Result<(), WifiError>;

    fn stop_portal(&mut self);

    /// Take the most recent form posted to the portal, if any.
    fn take_portal_submission(&mut self) -> Option<PortalSubmission>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / observers)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go (serial log,
/// WebSocket observers, a test recorder).
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists [`Settings`].
///
/// Implementations MUST validate before persisting and reject invalid
/// values with [`ConfigError::ValidationFailed`] rather than clamping.
pub trait ConfigPort {
    /// Load settings.  Missing keys take their defaults; out-of-range
    /// stored values are repaired field by field.
    fn load(&self) -> Result<Settings, ConfigError>;

    /// Validate and persist settings.
    fn save(&mut self, settings: &Settings) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value blob storage.
///
/// Keys are namespaced to prevent collisions between subsystems.  Writes
/// MUST be atomic (no partial value after power loss); the ESP-IDF NVS
/// API guarantees this natively.
pub trait StoragePort {
    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No settings stored yet (first boot).
    NotFound,
    /// Stored document failed to deserialize.
    Corrupted,
    /// A field failed range validation.
    ValidationFailed(&'static str),
    /// Underlying storage failed.
    Storage(StorageError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "settings not found"),
            Self::Corrupted => write!(f, "settings corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {msg}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
        }
    }
}

impl From<StorageError> for ConfigError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound => Self::NotFound,
            other => Self::Storage(other),
        }
    }
}

/// Errors from [`WifiPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiError {
    /// The driver refused the configuration.
    InvalidConfig,
    /// The driver call failed.
    Driver,
}

impl fmt::Display for WifiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig => write!(f, "invalid WiFi configuration"),
            Self::Driver => write!(f, "WiFi driver error"),
        }
    }
}
