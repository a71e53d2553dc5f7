//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing each application event as one
//! structured line to the ESP-IDF logger (UART / USB-CDC in production).

use log::{info, warn};

use crate::app::events::{AppEvent, Snapshot};
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

fn log_snapshot(tag: &str, s: &Snapshot) {
    info!(
        "{} | run={} dir={:?} | V={:.2} fwd={}ms rev={}ms | I={:.3}A raw={} | \
         avg+={:.3} avg-={:.3} pk+={:.3} pk-={:.3} | fault={} net={} up={}ms",
        tag,
        s.running,
        s.direction,
        s.target_voltage,
        s.forward_time_ms,
        s.reverse_time_ms,
        s.latest_current,
        s.latest_raw,
        s.average_positive_current,
        s.average_negative_current,
        s.peak_positive_current,
        s.peak_negative_current,
        s.fault,
        s.network.as_ref().map_or("-", |n| n.as_str()),
        s.uptime_ms,
    );
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started(s) => log_snapshot("START", s),
            AppEvent::Snapshot(s) => log_snapshot("SNAP", s),
            AppEvent::CommandAccepted(cmd) => info!("CMD | accepted {:?}", cmd),
            AppEvent::CommandRejected(e) => warn!("CMD | rejected: {}", e),
            AppEvent::ConnectivityChanged { from, to } => {
                info!("NET | {} -> {}", from.as_str(), to.as_str());
            }
            AppEvent::Networks(list) => {
                info!("NET | {} saved network(s)", list.len());
                for n in list {
                    info!("NET |   '{}' priority={} last={}ms", n.ssid, n.priority, n.last_connected);
                }
            }
            AppEvent::ProvisioningReset(source) => {
                warn!("NET | provisioning reset ({:?})", source);
            }
            AppEvent::FaultDetected => warn!("FAULT | H-bridge fault, output off"),
            AppEvent::FaultCleared => info!("FAULT | cleared"),
        }
    }
}
