//! Application service: the hexagonal core.
//!
//! [`AppService`] owns the control state ([`DeviceContext`]), the polarity
//! scheduler, the signal conditioner, the ADC sampler, the connectivity
//! service and both reset detectors.  All I/O flows through port traits
//! injected at call sites, so the whole loop runs against mock adapters.
//!
//! ```text
//!  AdcPort ───────▶ ┌──────────────────────────────┐ ──▶ EventSink
//!  InputPort ─────▶ │          AppService          │
//!  ActuatorPort ◀── │ polarity · conditioner · net │ ◀─▶ WifiPort
//!                   └──────────────────────────────┘ ◀─▶ ConfigPort + StoragePort
//! ```
//!
//! ## One iteration ([`AppService::tick`])
//!
//! 1. Capture `now` once; every decision below uses it.
//! 2. Power-cycle window bookkeeping.
//! 3. Button debounce and press window.
//! 4. Connectivity FSM.
//! 5. H-bridge fault line.
//! 6. Running: drain ADC → conditioner → polarity → supply duty.
//! 7. One-shot peak rearm 60 s after boot.
//! 8. Snapshot every 500 ms while running.
//! 9. Status LED.

use log::{info, warn};

use crate::config::{self, NameString, Settings};
use crate::control::{Calibration, Direction, PolarityScheduler, SignalConditioner};
use crate::credentials::CredentialError;
use crate::drivers::button::{ButtonEdge, Debouncer};
use crate::drivers::led_patterns::{self, LedPatternEngine, PatternId};
use crate::error::Error;
use crate::fsm::StateId;
use crate::reset_detect::{BootCheck, PowerCycleDetector, PressWindow, ResetSource};
use crate::sensors::CurrentSampler;

use super::commands::{Command, CommandError};
use super::connectivity::{Connectivity, NetTick};
use super::events::{AppEvent, Snapshot};
use super::ports::{
    ActuatorPort, AdcPort, ConfigError, ConfigPort, EventSink, InputPort, StoragePort, WifiPort,
};

/// How long the reset double-blink stays on the LED.
const RESET_INDICATION_MS: u64 = 3_000;

// ───────────────────────────────────────────────────────────────
// DeviceContext
// ───────────────────────────────────────────────────────────────

/// Control state shared by every step of an iteration.  Owned by the
/// service; nothing else mutates it.
#[derive(Debug, Clone)]
pub struct DeviceContext {
    pub settings: Settings,
    pub running: bool,
    /// H-bridge fault line is asserted.
    pub fault: bool,
    /// Timestamps captured at the top of the current iteration.
    pub now_ms: u64,
    pub now_us: u64,
    /// The one-shot 60 s peak rearm has fired.
    pub peaks_rearmed: bool,
    pub last_notify_ms: u64,
    pub last_led_ms: u64,
    pub reset_indication_until_ms: u64,
}

impl DeviceContext {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            running: false,
            fault: false,
            now_ms: 0,
            now_us: 0,
            peaks_rearmed: false,
            last_notify_ms: 0,
            last_led_ms: 0,
            reset_indication_until_ms: 0,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// AppService
// ───────────────────────────────────────────────────────────────

pub struct AppService {
    ctx: DeviceContext,
    polarity: PolarityScheduler,
    conditioner: SignalConditioner,
    sampler: CurrentSampler,
    net: Connectivity,
    power_cycles: PowerCycleDetector,
    presses: PressWindow,
    button: Debouncer,
    led: LedPatternEngine,
    /// `OrinTech-XXXXXXXX`: default identity and portal SSID.
    default_name: NameString,
}

impl AppService {
    /// Build the service from already-loaded settings.
    ///
    /// Fails only when the ADC working buffer cannot be allocated.
    pub fn new(mut settings: Settings, default_name: &str, storage: &impl StoragePort) -> Result<Self, Error> {
        settings.apply_default_identity(default_name);
        let sampler = CurrentSampler::new(config::ADC_BATCH_SAMPLES)?;
        Ok(Self {
            polarity: PolarityScheduler::new(settings.forward_time_ms, settings.reverse_time_ms),
            conditioner: SignalConditioner::new(Calibration::factory()),
            sampler,
            net: Connectivity::new(storage, default_name),
            power_cycles: PowerCycleDetector::default(),
            presses: PressWindow::default(),
            button: Debouncer::default(),
            led: LedPatternEngine::new(),
            default_name: config::truncated(default_name),
            ctx: DeviceContext::new(settings),
        })
    }

    /// Load settings (falling back to defaults) and build the service.
    pub fn load(store: &(impl ConfigPort + StoragePort), default_name: &str) -> Result<Self, Error> {
        let settings = match store.load() {
            Ok(s) => s,
            Err(ConfigError::NotFound) => {
                info!("Settings: none stored, using defaults");
                Settings::default()
            }
            Err(e) => {
                warn!("Settings: load failed ({}), using defaults", e);
                Settings::default()
            }
        };
        Self::new(settings, default_name, store)
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Park the power stage, check the power-cycle counter and start
    /// connectivity.
    pub fn start(
        &mut self,
        now_ms: u64,
        now_us: u64,
        hw: &mut impl ActuatorPort,
        store: &mut (impl ConfigPort + StoragePort),
        wifi: &mut impl WifiPort,
        sink: &mut impl EventSink,
    ) {
        self.capture(now_ms, now_us);
        self.ctx.last_led_ms = now_ms;
        self.park_output(hw);

        let net = match self.power_cycles.on_boot(store) {
            BootCheck::Triggered => {
                warn!("Provisioning reset requested by power cycling");
                self.reset_identity(store);
                self.net.forget_all(store);
                self.ctx.reset_indication_until_ms = now_ms + RESET_INDICATION_MS;
                sink.emit(&AppEvent::ProvisioningReset(ResetSource::PowerCycles));
                self.net.start_in_portal(now_ms, wifi, store)
            }
            BootCheck::Counting(n) => {
                info!("Boot {} within the power-cycle window", n);
                self.net.start(now_ms, wifi, store)
            }
        };
        self.apply_net(net, store, sink);

        info!(
            "AppService started: {} V, {}/{} ms",
            self.ctx.settings.target_voltage,
            self.ctx.settings.forward_time_ms,
            self.ctx.settings.reverse_time_ms
        );
        sink.emit(&AppEvent::Started(self.snapshot()));
    }

    // ── Per-iteration orchestration ───────────────────────────

    /// Run one loop iteration.
    ///
    /// `hw` satisfies the ADC, input and actuator ports at once and `store`
    /// both persistence ports; this avoids double mutable borrows while
    /// keeping each port boundary explicit.
    pub fn tick(
        &mut self,
        now_ms: u64,
        now_us: u64,
        hw: &mut (impl AdcPort + InputPort + ActuatorPort),
        store: &mut (impl ConfigPort + StoragePort),
        wifi: &mut impl WifiPort,
        sink: &mut impl EventSink,
    ) {
        // 1. One timestamp per iteration.
        self.capture(now_ms, now_us);

        // 2. Power-cycle evidence expires once the device has stayed up.
        self.power_cycles.poll(now_ms, store);

        // 3. Button presses.
        let raw = hw.button_pressed();
        if self.button.update(raw, now_ms) == Some(ButtonEdge::Pressed) {
            info!("Button press");
            if self.presses.record(now_ms) {
                self.provisioning_reset(ResetSource::ButtonPresses, store, wifi, sink);
            }
        }
        self.presses.expire(now_ms);

        // 4. Connectivity.
        let net = self.net.tick(now_ms, wifi, store);
        self.apply_net(net, store, sink);

        // 5. Fault line.
        self.check_fault(hw, sink);

        // 6. Measurement and polarity.
        let direction = self.polarity.direction();
        let (batch, adc_error) = match self.sampler.drain(hw, direction) {
            Ok(batch) => (batch, None),
            Err(e) => (None, Some(e)),
        };
        if self.ctx.running {
            if let Some(batch) = batch {
                for &raw in batch.samples {
                    self.conditioner.ingest(raw, batch.direction);
                }
            }
            self.conditioner.drain_if_full(config::AVERAGE_WINDOW);

            if let Some(dir) = self.polarity.advance(now_us) {
                if let Err(e) = hw.set_direction(dir) {
                    warn!("Polarity: flip to {:?} failed ({})", dir, e);
                }
            }
            if let Err(e) = hw.set_supply_voltage(self.ctx.settings.target_voltage) {
                warn!("Supply: {}", e);
            }
        }
        if let Some(e) = adc_error {
            warn!(
                "{} (iteration skipped; {} read errors, {} overruns so far)",
                e,
                self.sampler.read_errors(),
                self.sampler.overruns()
            );
        }

        // 7. Discard start-up transients once.
        if !self.ctx.peaks_rearmed && now_ms >= config::PEAK_REARM_AFTER_BOOT_MS {
            self.ctx.peaks_rearmed = true;
            self.conditioner.reset_peaks();
            info!("Peaks rearmed {} ms after boot", now_ms);
        }

        // 8. Periodic snapshot.
        if self.ctx.running
            && now_ms.saturating_sub(self.ctx.last_notify_ms) >= config::NOTIFY_INTERVAL_MS
        {
            self.publish(sink);
        }

        // 9. Status LED.
        self.refresh_led(hw);
    }

    // ── Command handling ──────────────────────────────────────

    /// Decode and apply one text message from the command channel.
    ///
    /// `now_ms`/`now_us` are the caller's timestamps for this message; a
    /// run started here measures its first dwell from them.
    pub fn handle_message(
        &mut self,
        now_ms: u64,
        now_us: u64,
        text: &str,
        hw: &mut impl ActuatorPort,
        store: &mut (impl ConfigPort + StoragePort),
        sink: &mut impl EventSink,
    ) -> Result<(), CommandError> {
        self.capture(now_ms, now_us);
        let result = Command::parse(text).and_then(|cmd| self.handle_command(cmd, hw, store, sink));
        if let Err(e) = result {
            warn!("Command '{}' rejected: {}", text.trim(), e);
            sink.emit(&AppEvent::CommandRejected(e));
        }
        result
    }

    /// Apply a decoded command at the last captured time.  A rejected
    /// command changes nothing.
    pub fn handle_command(
        &mut self,
        cmd: Command,
        hw: &mut impl ActuatorPort,
        store: &mut (impl ConfigPort + StoragePort),
        sink: &mut impl EventSink,
    ) -> Result<(), CommandError> {
        match &cmd {
            Command::Toggle => {
                if self.ctx.fault {
                    return Err(CommandError::Faulted);
                }
                if self.ctx.running {
                    self.stop_run(hw);
                } else {
                    self.start_run(hw);
                }
            }
            Command::SetVoltage(volts) => {
                let volts = *volts as f32;
                if !config::voltage_in_range(volts) {
                    return Err(CommandError::OutOfRange);
                }
                self.ctx.settings.target_voltage = volts;
                self.control_parameters_changed(store);
            }
            Command::SetForwardTime(ms) => {
                if !config::dwell_in_range(*ms) {
                    return Err(CommandError::OutOfRange);
                }
                self.ctx.settings.forward_time_ms = *ms;
                self.polarity.set_forward_ms(*ms);
                self.control_parameters_changed(store);
            }
            Command::SetReverseTime(ms) => {
                if !config::dwell_in_range(*ms) {
                    return Err(CommandError::OutOfRange);
                }
                self.ctx.settings.reverse_time_ms = *ms;
                self.polarity.set_reverse_ms(*ms);
                self.control_parameters_changed(store);
            }
            Command::ResetPeaks => {
                self.conditioner.reset_peaks();
                info!("Peaks reset on request");
            }
            Command::Query => {}
            Command::ListNetworks => {
                sink.emit(&AppEvent::Networks(self.net.list_networks()));
                return Ok(());
            }
            Command::ForgetNetwork(ssid) => {
                self.net.forget_network(ssid, store).map_err(|e| match e {
                    CredentialError::NotFound => CommandError::UnknownNetwork,
                    _ => CommandError::OutOfRange,
                })?;
            }
        }

        if cmd.mutates() {
            sink.emit(&AppEvent::CommandAccepted(cmd));
        }
        self.publish(sink);
        Ok(())
    }

    // ── Queries ───────────────────────────────────────────────

    /// Build a snapshot from the current state.
    pub fn snapshot(&self) -> Snapshot {
        let s = &self.ctx.settings;
        let c = &self.conditioner;
        let (v_pos, v_neg) = if self.ctx.running {
            (s.target_voltage, 0.0 - s.target_voltage)
        } else {
            (0.0, 0.0)
        };
        Snapshot {
            running: self.ctx.running,
            direction: self.polarity.direction(),
            target_voltage: s.target_voltage,
            forward_time_ms: s.forward_time_ms,
            reverse_time_ms: s.reverse_time_ms,
            latest_current: c.latest_current(),
            latest_raw: c.latest_raw(),
            average_positive_current: c.average_positive(),
            average_negative_current: c.average_negative(),
            peak_positive_current: c.peak_positive(),
            peak_negative_current: c.peak_negative(),
            average_positive_voltage: v_pos,
            average_negative_voltage: v_neg,
            peak_positive_voltage: v_pos,
            peak_negative_voltage: v_neg,
            fault: self.ctx.fault,
            network: self.net.connected_ssid().cloned(),
            device_name: s.device_name.clone(),
            uptime_ms: self.ctx.now_ms,
        }
    }

    pub fn context(&self) -> &DeviceContext {
        &self.ctx
    }

    pub fn settings(&self) -> &Settings {
        &self.ctx.settings
    }

    pub fn is_running(&self) -> bool {
        self.ctx.running
    }

    pub fn polarity(&self) -> &PolarityScheduler {
        &self.polarity
    }

    pub fn conditioner(&self) -> &SignalConditioner {
        &self.conditioner
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.net
    }

    pub fn net_state(&self) -> StateId {
        self.net.state()
    }

    // ── Internal ──────────────────────────────────────────────

    fn capture(&mut self, now_ms: u64, now_us: u64) {
        self.ctx.now_ms = now_ms;
        self.ctx.now_us = now_us;
    }

    fn start_run(&mut self, hw: &mut impl ActuatorPort) {
        self.polarity.start(self.ctx.now_us);
        match self.drive_output(hw) {
            Ok(()) => {
                self.ctx.running = true;
                self.ctx.last_notify_ms = self.ctx.now_ms;
                info!("Run started at {} V", self.ctx.settings.target_voltage);
            }
            Err(e) => {
                warn!("Run start failed ({}), output parked", e);
                self.park_output(hw);
            }
        }
    }

    /// Forward polarity, supply at target, bridge on.
    fn drive_output(&self, hw: &mut impl ActuatorPort) -> crate::error::Result<()> {
        hw.set_direction(Direction::Forward)?;
        hw.set_supply_voltage(self.ctx.settings.target_voltage)?;
        hw.enable_output()?;
        Ok(())
    }

    fn stop_run(&mut self, hw: &mut impl ActuatorPort) {
        self.park_output(hw);
        info!("Run stopped");
    }

    /// Outputs off and supply to zero.  Errors are logged; the bridge is
    /// retried on the next command.
    fn park_output(&mut self, hw: &mut impl ActuatorPort) {
        if let Err(e) = hw.disable_output() {
            warn!("Bridge disable failed ({})", e);
        }
        if let Err(e) = hw.set_supply_voltage(0.0) {
            warn!("Supply: {}", e);
        }
        self.ctx.running = false;
    }

    fn check_fault(&mut self, hw: &mut (impl InputPort + ActuatorPort), sink: &mut impl EventSink) {
        let faulted = hw.bridge_faulted();
        if faulted == self.ctx.fault {
            return;
        }
        self.ctx.fault = faulted;
        if faulted {
            warn!("H-bridge fault: output stopped");
            hw.all_off();
            self.ctx.running = false;
            sink.emit(&AppEvent::FaultDetected);
        } else {
            info!("H-bridge fault cleared");
            sink.emit(&AppEvent::FaultCleared);
        }
        self.publish(sink);
    }

    /// Persist, and discard peaks gathered under the old parameters.
    fn control_parameters_changed(&mut self, store: &mut impl ConfigPort) {
        self.conditioner.reset_peaks();
        self.persist_settings(store);
    }

    fn persist_settings(&mut self, store: &mut impl ConfigPort) {
        if let Err(e) = store.save(&self.ctx.settings) {
            warn!("Settings: save failed ({}), running unpersisted", e);
        }
    }

    fn reset_identity(&mut self, store: &mut impl ConfigPort) {
        self.ctx.settings.device_name = self.default_name.clone();
        self.ctx.settings.hostname = self.default_name.clone();
        self.persist_settings(store);
    }

    fn provisioning_reset(
        &mut self,
        source: ResetSource,
        store: &mut (impl ConfigPort + StoragePort),
        wifi: &mut impl WifiPort,
        sink: &mut impl EventSink,
    ) {
        warn!("Provisioning reset requested by {:?}", source);
        self.presses.clear();
        self.reset_identity(store);
        let net = self
            .net
            .provisioning_reset(self.ctx.now_ms, &self.default_name, wifi, store);
        self.ctx.reset_indication_until_ms = self.ctx.now_ms + RESET_INDICATION_MS;
        sink.emit(&AppEvent::ProvisioningReset(source));
        self.apply_net(net, store, sink);
    }

    fn apply_net(&mut self, net: NetTick, store: &mut impl ConfigPort, sink: &mut impl EventSink) {
        if let Some(name) = net.rename {
            info!("Device renamed to '{}'", name);
            self.ctx.settings.device_name = name;
            self.persist_settings(store);
        }
        if let Some((from, to)) = net.transition {
            sink.emit(&AppEvent::ConnectivityChanged { from, to });
        }
    }

    fn publish(&mut self, sink: &mut impl EventSink) {
        self.ctx.last_notify_ms = self.ctx.now_ms;
        sink.emit(&AppEvent::Snapshot(self.snapshot()));
    }

    fn refresh_led(&mut self, hw: &mut impl ActuatorPort) {
        let delta = self.ctx.now_ms.saturating_sub(self.ctx.last_led_ms);
        self.ctx.last_led_ms = self.ctx.now_ms;

        self.led.set_fault(self.ctx.fault);
        let provisioning = if self.ctx.now_ms < self.ctx.reset_indication_until_ms {
            Some((led_patterns::COLOUR_RESETTING, PatternId::DoubleBlink))
        } else if self.net.is_portal_active() {
            Some((led_patterns::COLOUR_PORTAL, PatternId::FastBlink))
        } else {
            None
        };
        self.led.set_provisioning(provisioning);
        self.led.set_running(self.ctx.running);
        match self.net.state() {
            StateId::Connected => self.led.set_connectivity(led_patterns::COLOUR_CONNECTED, PatternId::Solid),
            StateId::ConnectingSaved => {
                self.led.set_connectivity(led_patterns::COLOUR_CONNECTING, PatternId::SlowPulse);
            }
            StateId::Disconnected | StateId::PortalActive => {
                self.led.set_connectivity(led_patterns::COLOUR_CONNECTING, PatternId::Off);
            }
        }

        let (r, g, b) = self.led.tick(delta);
        hw.set_led(r, g, b);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;

    /// Storage with nothing in it that accepts and forgets every write.
    struct Blank;

    impl StoragePort for Blank {
        fn read(&self, _: &str, _: &str, _: &mut [u8]) -> Result<usize, StorageError> {
            Err(StorageError::NotFound)
        }
        fn write(&mut self, _: &str, _: &str, _: &[u8]) -> Result<(), StorageError> {
            Ok(())
        }
        fn delete(&mut self, _: &str, _: &str) -> Result<(), StorageError> {
            Ok(())
        }
        fn exists(&self, _: &str, _: &str) -> bool {
            false
        }
    }

    impl ConfigPort for Blank {
        fn load(&self) -> Result<Settings, ConfigError> {
            Err(ConfigError::NotFound)
        }
        fn save(&mut self, _: &Settings) -> Result<(), ConfigError> {
            Ok(())
        }
    }

    #[test]
    fn first_boot_takes_factory_settings_and_default_identity() {
        let app = AppService::load(&Blank, "OrinTech-0A1B2C3D").unwrap();
        assert_eq!(app.settings().target_voltage, 14.0);
        assert_eq!(app.settings().device_name.as_str(), "OrinTech-0A1B2C3D");
        assert!(!app.is_running());
    }

    #[test]
    fn stopped_snapshot_reports_zero_voltages() {
        let app = AppService::load(&Blank, "OrinTech-0A1B2C3D").unwrap();
        let snap = app.snapshot();
        assert!(!snap.running);
        assert_eq!(snap.target_voltage, 14.0);
        assert_eq!(snap.average_positive_voltage, 0.0);
        assert_eq!(snap.peak_negative_voltage, 0.0);
        assert_eq!(snap.network, None);
    }
}
