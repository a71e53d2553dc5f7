//! Mock adapters for integration tests.
//!
//! Records every actuator call so tests can assert on the full command
//! history without touching real GPIO/PWM/RMT peripherals.

use std::collections::{HashMap, VecDeque};

use electrooxidizer::app::events::AppEvent;
use electrooxidizer::app::ports::{
    ActuatorPort, AdcPort, ConfigError, ConfigPort, EventSink, InputPort, StoragePort, WifiError, WifiPort,
};
use electrooxidizer::config::Settings;
use electrooxidizer::control::Direction;
use electrooxidizer::credentials::{Credential, PortalSubmission};
use electrooxidizer::error::{ActuatorError, SensorError, StorageError};

// ── Actuator call record ──────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum ActuatorCall {
    SetDirection(Direction),
    Enable,
    Disable,
    SetVoltage(f32),
    SetLed { r: u8, g: u8, b: u8 },
    AllOff,
}

// ── MockHardware ──────────────────────────────────────────────

/// ADC + inputs + power stage.  ADC samples are served from a script,
/// one batch per `read_samples` call.
#[derive(Default)]
pub struct MockHardware {
    pub calls: Vec<ActuatorCall>,
    pub batches: VecDeque<Vec<u16>>,
    pub fault: bool,
    pub button: bool,
    pub adc_error: bool,
    /// Supply writes fail as if the PWM channel never attached.
    pub supply_unavailable: bool,
}

#[allow(dead_code)]
impl MockHardware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_samples(&mut self, samples: Vec<u16>) {
        self.batches.push_back(samples);
    }

    pub fn enabled(&self) -> bool {
        self.calls
            .iter()
            .rev()
            .find_map(|c| match c {
                ActuatorCall::Enable => Some(true),
                ActuatorCall::Disable | ActuatorCall::AllOff => Some(false),
                _ => None,
            })
            .unwrap_or(false)
    }

    pub fn supply_voltage(&self) -> Option<f32> {
        self.calls.iter().rev().find_map(|c| match c {
            ActuatorCall::SetVoltage(v) => Some(*v),
            ActuatorCall::AllOff => Some(0.0),
            _ => None,
        })
    }

    /// Direction changes in order, excluding LED and supply traffic.
    pub fn directions(&self) -> Vec<Direction> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                ActuatorCall::SetDirection(d) => Some(*d),
                _ => None,
            })
            .collect()
    }

    pub fn last_led(&self) -> Option<(u8, u8, u8)> {
        self.calls.iter().rev().find_map(|c| match c {
            ActuatorCall::SetLed { r, g, b } => Some((*r, *g, *b)),
            _ => None,
        })
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }
}

impl AdcPort for MockHardware {
    fn read_samples(&mut self, out: &mut Vec<u16>, max: usize) -> Result<usize, SensorError> {
        if self.adc_error {
            return Err(SensorError::AdcReadFailed);
        }
        let Some(mut batch) = self.batches.pop_front() else {
            return Ok(0);
        };
        if batch.len() > max {
            let rest = batch.split_off(max);
            self.batches.push_front(rest);
        }
        let n = batch.len();
        out.extend(batch);
        Ok(n)
    }
}

impl InputPort for MockHardware {
    fn bridge_faulted(&mut self) -> bool {
        self.fault
    }

    fn button_pressed(&mut self) -> bool {
        self.button
    }
}

impl ActuatorPort for MockHardware {
    fn set_direction(&mut self, direction: Direction) -> Result<(), ActuatorError> {
        self.calls.push(ActuatorCall::SetDirection(direction));
        Ok(())
    }

    fn enable_output(&mut self) -> Result<(), ActuatorError> {
        self.calls.push(ActuatorCall::Enable);
        Ok(())
    }

    fn disable_output(&mut self) -> Result<(), ActuatorError> {
        self.calls.push(ActuatorCall::Disable);
        Ok(())
    }

    fn set_supply_voltage(&mut self, volts: f32) -> Result<(), ActuatorError> {
        if self.supply_unavailable {
            return Err(ActuatorError::PwmUnavailable);
        }
        self.calls.push(ActuatorCall::SetVoltage(volts));
        Ok(())
    }

    fn set_led(&mut self, r: u8, g: u8, b: u8) {
        self.calls.push(ActuatorCall::SetLed { r, g, b });
    }

    fn all_off(&mut self) {
        self.calls.push(ActuatorCall::AllOff);
    }
}

// ── MockNvs ───────────────────────────────────────────────────

/// In-memory key/value store with a settings slot and write counters.
#[derive(Default)]
pub struct MockNvs {
    store: HashMap<String, Vec<u8>>,
    pub settings: Option<Settings>,
    pub settings_saves: u32,
    pub blob_writes: u32,
}

#[allow(dead_code)]
impl MockNvs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self {
            settings: Some(settings),
            ..Self::default()
        }
    }

    fn key(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }

    pub fn raw(&self, namespace: &str, key: &str) -> Option<&[u8]> {
        self.store.get(&Self::key(namespace, key)).map(Vec::as_slice)
    }
}

impl StoragePort for MockNvs {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        match self.store.get(&Self::key(namespace, key)) {
            Some(v) if v.len() > buf.len() => Err(StorageError::TooLarge),
            Some(v) => {
                buf[..v.len()].copy_from_slice(v);
                Ok(v.len())
            }
            None => Err(StorageError::NotFound),
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.blob_writes += 1;
        self.store.insert(Self::key(namespace, key), data.to_vec());
        Ok(())
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.store.remove(&Self::key(namespace, key));
        Ok(())
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        self.store.contains_key(&Self::key(namespace, key))
    }
}

impl ConfigPort for MockNvs {
    fn load(&self) -> Result<Settings, ConfigError> {
        self.settings.clone().ok_or(ConfigError::NotFound)
    }

    fn save(&mut self, settings: &Settings) -> Result<(), ConfigError> {
        settings.validate().map_err(ConfigError::ValidationFailed)?;
        self.settings_saves += 1;
        self.settings = Some(settings.clone());
        Ok(())
    }
}

// ── MockWifi ──────────────────────────────────────────────────

/// Associates on the first poll after `begin_connect` when the SSID and
/// password match a reachable network.
#[derive(Default)]
pub struct MockWifi {
    pub reachable: Vec<Credential>,
    pub connects: Vec<String>,
    pub link: bool,
    pub portal: Option<String>,
    pub submission: Option<PortalSubmission>,
}

#[allow(dead_code)]
impl MockWifi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reachable(networks: &[(&str, &str)]) -> Self {
        Self {
            reachable: networks
                .iter()
                .map(|(s, p)| Credential::new(s, p).unwrap())
                .collect(),
            ..Self::default()
        }
    }

    pub fn drop_link(&mut self) {
        self.link = false;
    }
}

impl WifiPort for MockWifi {
    fn begin_connect(&mut self, credential: &Credential) -> Result<(), WifiError> {
        self.connects.push(credential.ssid.to_string());
        self.link = self.reachable.iter().any(|c| c == credential);
        Ok(())
    }

    fn is_connected(&mut self) -> bool {
        self.link
    }

    fn disconnect(&mut self) {
        self.link = false;
    }

    fn start_portal(&mut self, ap_ssid: &str) -> Result<(), WifiError> {
        self.portal = Some(ap_ssid.to_string());
        Ok(())
    }

    fn stop_portal(&mut self) {
        self.portal = None;
    }

    fn take_portal_submission(&mut self) -> Option<PortalSubmission> {
        self.submission.take()
    }
}

// ── RecordingSink ─────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    pub fn snapshots(&self) -> usize {
        self.count(|e| matches!(e, AppEvent::Snapshot(_)))
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Rig ───────────────────────────────────────────────────────

pub const DEVICE_NAME: &str = "OrinTech-0A1B2C3D";

/// A booted service wired to every mock, with the clock under test
/// control.
pub struct Rig {
    pub app: electrooxidizer::app::service::AppService,
    pub hw: MockHardware,
    pub nvs: MockNvs,
    pub wifi: MockWifi,
    pub sink: RecordingSink,
    pub now_ms: u64,
}

#[allow(dead_code)]
impl Rig {
    /// Load from `nvs` and run `start` at t = 0.
    pub fn boot(mut nvs: MockNvs, mut wifi: MockWifi) -> Self {
        let mut app = electrooxidizer::app::service::AppService::load(&nvs, DEVICE_NAME).unwrap();
        let mut hw = MockHardware::new();
        let mut sink = RecordingSink::new();
        app.start(0, 0, &mut hw, &mut nvs, &mut wifi, &mut sink);
        Self {
            app,
            hw,
            nvs,
            wifi,
            sink,
            now_ms: 0,
        }
    }

    /// Power off: keep flash and the radio environment, lose the rest.
    pub fn reboot(self) -> Self {
        Self::boot(self.nvs, self.wifi)
    }

    pub fn tick_at(&mut self, now_ms: u64) {
        self.now_ms = now_ms;
        self.app.tick(
            now_ms,
            now_ms * 1000,
            &mut self.hw,
            &mut self.nvs,
            &mut self.wifi,
            &mut self.sink,
        );
    }

    /// Tick every `step_ms` up to and including `until_ms`.
    pub fn run_until(&mut self, until_ms: u64, step_ms: u64) {
        while self.now_ms + step_ms <= until_ms {
            self.tick_at(self.now_ms + step_ms);
        }
    }

    pub fn send(&mut self, text: &str) -> Result<(), electrooxidizer::app::commands::CommandError> {
        self.app
            .handle_message(
                self.now_ms,
                self.now_ms * 1000,
                text,
                &mut self.hw,
                &mut self.nvs,
                &mut self.sink,
            )
    }

    /// One debounced press and release, 200 ms in total.
    pub fn press_button(&mut self) {
        let t = self.now_ms;
        self.hw.button = true;
        self.tick_at(t + 10);
        self.tick_at(t + 70);
        self.hw.button = false;
        self.tick_at(t + 130);
        self.tick_at(t + 200);
    }
}

/// Flash pre-seeded with saved networks, lowest priority first.
#[allow(dead_code)]
pub fn nvs_with_networks(networks: &[(&str, &str)]) -> MockNvs {
    let mut nvs = MockNvs::new();
    let mut table = electrooxidizer::credentials::CredentialStore::new();
    for (i, (ssid, password)) in networks.iter().enumerate() {
        table.add_or_update(ssid, password, i as u64).unwrap();
    }
    table.save(&mut nvs).unwrap();
    nvs.blob_writes = 0;
    nvs
}
