//! WiFi adapter.
//!
//! Implements [`WifiPort`]: non-blocking station control plus the open
//! provisioning access point.  Portal forms arrive through the
//! [`MessageBridge`] from the HTTP task.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `esp_idf_svc::wifi::EspWifi`.  The radio
//!   runs `Client`, `AccessPoint` or `Mixed` depending on whether an
//!   attempt and the portal are active.
//!   When the driver cannot be created the adapter runs offline: every
//!   radio request fails with [`WifiError::Driver`] and the connectivity
//!   FSM keeps cycling without a link.
//! - **all other targets**: a scriptable simulation for host runs.

use std::sync::Arc;

use log::info;
#[cfg(target_os = "espidf")]
use log::warn;

use super::web::MessageBridge;
use crate::app::ports::{WifiError, WifiPort};
#[cfg(not(target_os = "espidf"))]
use crate::config::NameString;
use crate::credentials::{Credential, PortalSubmission};

#[cfg(target_os = "espidf")]
use esp_idf_svc::wifi::{
    AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration, EspWifi,
};

#[cfg(target_os = "espidf")]
const AP_CHANNEL: u8 = 1;
#[cfg(target_os = "espidf")]
const AP_MAX_CONNECTIONS: u16 = 4;

// ───────────────────────────────────────────────────────────────
// Device adapter
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub struct WifiAdapter {
    wifi: Option<EspWifi<'static>>,
    bridge: Arc<MessageBridge>,
    station: Option<ClientConfiguration>,
    portal: Option<AccessPointConfiguration>,
}

#[cfg(target_os = "espidf")]
impl WifiAdapter {
    pub fn new(wifi: EspWifi<'static>, bridge: Arc<MessageBridge>) -> Self {
        Self {
            wifi: Some(wifi),
            bridge,
            station: None,
            portal: None,
        }
    }

    /// No radio driver.
    pub fn offline(bridge: Arc<MessageBridge>) -> Self {
        Self {
            wifi: None,
            bridge,
            station: None,
            portal: None,
        }
    }

    fn radio(&mut self) -> Result<&mut EspWifi<'static>, WifiError> {
        self.wifi.as_mut().ok_or(WifiError::Driver)
    }

    /// Push the current station/AP combination to the driver.
    fn apply(&mut self) -> Result<(), WifiError> {
        let conf = match (&self.station, &self.portal) {
            (Some(sta), Some(ap)) => Configuration::Mixed(sta.clone(), ap.clone()),
            (Some(sta), None) => Configuration::Client(sta.clone()),
            (None, Some(ap)) => Configuration::AccessPoint(ap.clone()),
            (None, None) => Configuration::Client(ClientConfiguration::default()),
        };
        let wifi = self.radio()?;
        wifi.set_configuration(&conf).map_err(|e| {
            warn!("WiFi: configuration rejected ({})", e);
            WifiError::InvalidConfig
        })?;
        if !wifi.is_started().unwrap_or(false) {
            wifi.start().map_err(|e| {
                warn!("WiFi: start failed ({})", e);
                WifiError::Driver
            })?;
        }
        Ok(())
    }
}

#[cfg(target_os = "espidf")]
impl WifiPort for WifiAdapter {
    fn begin_connect(&mut self, credential: &Credential) -> Result<(), WifiError> {
        let auth_method = if credential.password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        self.station = Some(ClientConfiguration {
            ssid: credential
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| WifiError::InvalidConfig)?,
            password: credential
                .password
                .as_str()
                .try_into()
                .map_err(|_| WifiError::InvalidConfig)?,
            auth_method,
            ..Default::default()
        });
        // Abandon any attempt still in flight.
        let _ = self.radio()?.disconnect();
        self.apply()?;
        self.radio()?.connect().map_err(|e| {
            warn!("WiFi: connect call failed ({})", e);
            WifiError::Driver
        })
    }

    fn is_connected(&mut self) -> bool {
        self.station.is_some()
            && self
                .wifi
                .as_ref()
                .is_some_and(|w| w.is_up().unwrap_or(false))
    }

    fn disconnect(&mut self) {
        if let Some(Err(e)) = self.wifi.as_mut().map(|w| w.disconnect()) {
            log::debug!("WiFi: disconnect ({})", e);
        }
        self.station = None;
    }

    fn start_portal(&mut self, ap_ssid: &str) -> Result<(), WifiError> {
        self.portal = Some(AccessPointConfiguration {
            ssid: ap_ssid.try_into().map_err(|_| WifiError::InvalidConfig)?,
            auth_method: AuthMethod::None,
            channel: AP_CHANNEL,
            max_connections: AP_MAX_CONNECTIONS,
            ..Default::default()
        });
        self.apply()?;
        self.bridge.set_portal_active(true);
        info!("WiFi: portal '{}' up", ap_ssid);
        Ok(())
    }

    fn stop_portal(&mut self) {
        self.portal = None;
        self.bridge.set_portal_active(false);
        if let Err(e) = self.apply() {
            warn!("WiFi: closing portal ({})", e);
        }
    }

    fn take_portal_submission(&mut self) -> Option<PortalSubmission> {
        self.bridge.take_submission()
    }
}

// ───────────────────────────────────────────────────────────────
// Host simulation
// ───────────────────────────────────────────────────────────────

/// Scriptable radio: associates instantly with any network registered in
/// `reachable` whose password matches.
#[cfg(not(target_os = "espidf"))]
pub struct WifiAdapter {
    bridge: Arc<MessageBridge>,
    radio_up: bool,
    reachable: Vec<Credential>,
    connected: Option<Credential>,
    portal: Option<NameString>,
    connect_calls: u32,
}

#[cfg(not(target_os = "espidf"))]
impl WifiAdapter {
    pub fn new(bridge: Arc<MessageBridge>) -> Self {
        Self {
            bridge,
            radio_up: true,
            reachable: Vec::new(),
            connected: None,
            portal: None,
            connect_calls: 0,
        }
    }

    /// No radio: every request fails like a missing driver.
    pub fn offline(bridge: Arc<MessageBridge>) -> Self {
        Self {
            radio_up: false,
            ..Self::new(bridge)
        }
    }

    /// Make an access point visible.
    pub fn add_reachable(&mut self, credential: Credential) {
        self.reachable.retain(|c| c.ssid != credential.ssid);
        self.reachable.push(credential);
    }

    /// Take an access point away; drops the link if it was in use.
    pub fn remove_reachable(&mut self, ssid: &str) {
        self.reachable.retain(|c| c.ssid != ssid);
        if self.connected.as_ref().is_some_and(|c| c.ssid == ssid) {
            info!("WiFi(sim): '{}' went away", ssid);
            self.connected = None;
        }
    }

    pub fn portal_ssid(&self) -> Option<&str> {
        self.portal.as_deref()
    }

    pub fn connect_calls(&self) -> u32 {
        self.connect_calls
    }
}

#[cfg(not(target_os = "espidf"))]
impl WifiPort for WifiAdapter {
    fn begin_connect(&mut self, credential: &Credential) -> Result<(), WifiError> {
        self.connect_calls = self.connect_calls.wrapping_add(1);
        if !self.radio_up {
            return Err(WifiError::Driver);
        }
        self.connected = self.reachable.iter().find(|c| *c == credential).cloned();
        info!(
            "WiFi(sim): '{}' {}",
            credential.ssid,
            if self.connected.is_some() { "associated" } else { "not answering" }
        );
        Ok(())
    }

    fn is_connected(&mut self) -> bool {
        self.connected.is_some()
    }

    fn disconnect(&mut self) {
        self.connected = None;
    }

    fn start_portal(&mut self, ap_ssid: &str) -> Result<(), WifiError> {
        if !self.radio_up {
            return Err(WifiError::Driver);
        }
        self.portal = Some(crate::config::truncated(ap_ssid));
        self.bridge.set_portal_active(true);
        Ok(())
    }

    fn stop_portal(&mut self) {
        self.portal = None;
        self.bridge.set_portal_active(false);
    }

    fn take_portal_submission(&mut self) -> Option<PortalSubmission> {
        self.bridge.take_submission()
    }
}
