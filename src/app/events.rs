//! Outbound application events.
//!
//! The [`AppService`](super::service::AppService) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them: log to serial, push to WebSocket
//! observers, record for a test.

use serde::Serialize;

use super::commands::{Command, CommandError};
use crate::config::{MAX_NETWORKS, NameString};
use crate::control::Direction;
use crate::credentials::SsidString;
use crate::fsm::StateId;
use crate::reset_detect::ResetSource;

/// Structured events emitted by the application core.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// The control loop has started (carries the initial snapshot).
    Started(Snapshot),

    /// Live measurement snapshot.
    Snapshot(Snapshot),

    /// A command was decoded and applied.
    CommandAccepted(Command),

    /// A command was refused; nothing changed.
    CommandRejected(CommandError),

    /// The connectivity engine moved between states.
    ConnectivityChanged { from: StateId, to: StateId },

    /// Saved networks, highest priority first.
    Networks(heapless::Vec<NetworkSummary, MAX_NETWORKS>),

    /// Saved networks and identity were wiped.
    ProvisioningReset(ResetSource),

    /// The H-bridge latched a fault; output is off.
    FaultDetected,

    /// The fault line has released.
    FaultCleared,
}

/// One saved network as shown to observers.  Never carries the password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSummary {
    pub ssid: SsidString,
    pub priority: u32,
    pub last_connected: u64,
}

/// A flat point-in-time view of the control loop, published to observers
/// every 500 ms while running and after every accepted command.
///
/// Currents are amps, voltages are volts.  Floats serialise with full
/// precision.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub running: bool,
    pub direction: Direction,
    pub target_voltage: f32,
    pub forward_time_ms: u32,
    pub reverse_time_ms: u32,
    pub latest_current: f32,
    pub latest_raw: u16,
    pub average_positive_current: f32,
    pub average_negative_current: f32,
    pub peak_positive_current: f32,
    pub peak_negative_current: f32,
    pub average_positive_voltage: f32,
    pub average_negative_voltage: f32,
    pub peak_positive_voltage: f32,
    pub peak_negative_voltage: f32,
    pub fault: bool,
    /// SSID of the associated network, `null` when offline.
    pub network: Option<SsidString>,
    pub device_name: NameString,
    pub uptime_ms: u64,
}

impl Snapshot {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
