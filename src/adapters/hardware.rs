//! Hardware adapter: bridges real peripherals to domain port traits.
//!
//! Owns the H-bridge, the supply PWM, the status LED, the test button and
//! the current-sense ADC, exposing them through [`AdcPort`],
//! [`ActuatorPort`] and [`InputPort`].  This is the only module that
//! touches peripherals; the pin and PWM types are `embedded-hal` traits so
//! the adapter is exercised on the host with mock pins.
//!
//! The bridge and the button are optional: a device whose GPIOs could not
//! be claimed at boot keeps running, reporting a permanent bridge fault
//! and an idle button.

use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::pwm::SetDutyCycle;
use log::warn;

use crate::app::ports::{ActuatorPort, AdcPort, InputPort};
use crate::control::Direction;
use crate::drivers::button::Button;
use crate::drivers::hbridge::HBridge;
use crate::drivers::status_led::StatusLed;
use crate::drivers::supply::SupplyDriver;
use crate::error::{ActuatorError, SensorError};

/// Concrete adapter that combines all hardware behind port traits.
pub struct HardwareAdapter<EN, PH, SLP, OFF, FLT, PWM, BTN, ADC> {
    bridge: Option<HBridge<EN, PH, SLP, OFF, FLT>>,
    supply: SupplyDriver<PWM>,
    button: Option<Button<BTN>>,
    led: StatusLed,
    adc: ADC,
    fault_read_errors: u32,
}

impl<EN, PH, SLP, OFF, FLT, PWM, BTN, ADC> HardwareAdapter<EN, PH, SLP, OFF, FLT, PWM, BTN, ADC>
where
    EN: OutputPin,
    PH: OutputPin,
    SLP: OutputPin,
    OFF: OutputPin,
    FLT: InputPin,
    PWM: SetDutyCycle,
    BTN: InputPin,
    ADC: AdcPort,
{
    pub fn new(
        bridge: Option<HBridge<EN, PH, SLP, OFF, FLT>>,
        supply: SupplyDriver<PWM>,
        button: Option<Button<BTN>>,
        led: StatusLed,
        adc: ADC,
    ) -> Self {
        Self {
            bridge,
            supply,
            button,
            led,
            adc,
            fault_read_errors: 0,
        }
    }

    pub fn bridge(&self) -> Option<&HBridge<EN, PH, SLP, OFF, FLT>> {
        self.bridge.as_ref()
    }

    pub fn supply(&self) -> &SupplyDriver<PWM> {
        &self.supply
    }

    pub fn led(&self) -> &StatusLed {
        &self.led
    }
}

impl<EN, PH, SLP, OFF, FLT, PWM, BTN, ADC> HardwareAdapter<EN, PH, SLP, OFF, FLT, PWM, BTN, ADC>
where
    EN: OutputPin,
    PH: OutputPin,
    SLP: OutputPin,
    OFF: OutputPin,
    FLT: InputPin,
{
    fn bridge_mut(&mut self) -> Result<&mut HBridge<EN, PH, SLP, OFF, FLT>, ActuatorError> {
        self.bridge.as_mut().ok_or(ActuatorError::BridgeUnavailable)
    }
}

// ── AdcPort implementation ────────────────────────────────────

impl<EN, PH, SLP, OFF, FLT, PWM, BTN, ADC> AdcPort for HardwareAdapter<EN, PH, SLP, OFF, FLT, PWM, BTN, ADC>
where
    ADC: AdcPort,
{
    fn read_samples(&mut self, out: &mut Vec<u16>, max: usize) -> Result<usize, SensorError> {
        self.adc.read_samples(out, max)
    }
}

// ── ActuatorPort implementation ───────────────────────────────

impl<EN, PH, SLP, OFF, FLT, PWM, BTN, ADC> ActuatorPort for HardwareAdapter<EN, PH, SLP, OFF, FLT, PWM, BTN, ADC>
where
    EN: OutputPin,
    PH: OutputPin,
    SLP: OutputPin,
    OFF: OutputPin,
    FLT: InputPin,
    PWM: SetDutyCycle,
{
    fn set_direction(&mut self, direction: Direction) -> Result<(), ActuatorError> {
        self.bridge_mut()?.set_direction(direction)
    }

    fn enable_output(&mut self) -> Result<(), ActuatorError> {
        self.bridge_mut()?.enable()
    }

    fn disable_output(&mut self) -> Result<(), ActuatorError> {
        self.bridge_mut()?.disable()
    }

    fn set_supply_voltage(&mut self, volts: f32) -> Result<(), ActuatorError> {
        self.supply.set_voltage(volts).map(|_| ())
    }

    fn set_led(&mut self, r: u8, g: u8, b: u8) {
        self.led.set_colour(r, g, b);
    }

    fn all_off(&mut self) {
        if let Some(Err(e)) = self.bridge.as_mut().map(HBridge::disable) {
            warn!("Hardware: bridge disable failed ({})", e);
        }
        if let Err(e) = self.supply.set_voltage(0.0) {
            warn!("Hardware: supply zero failed ({})", e);
        }
        self.led.off();
    }
}

// ── InputPort implementation ──────────────────────────────────

impl<EN, PH, SLP, OFF, FLT, PWM, BTN, ADC> InputPort for HardwareAdapter<EN, PH, SLP, OFF, FLT, PWM, BTN, ADC>
where
    EN: OutputPin,
    PH: OutputPin,
    SLP: OutputPin,
    OFF: OutputPin,
    FLT: InputPin,
    BTN: InputPin,
{
    /// An unreadable fault line, or a bridge that never came up, is
    /// reported as a fault.
    fn bridge_faulted(&mut self) -> bool {
        let Some(bridge) = self.bridge.as_mut() else {
            return true;
        };
        match bridge.is_faulted() {
            Ok(faulted) => faulted,
            Err(e) => {
                self.fault_read_errors = self.fault_read_errors.wrapping_add(1);
                if self.fault_read_errors == 1 {
                    warn!("Hardware: nFAULT unreadable ({}), assuming fault", e);
                }
                true
            }
        }
    }

    fn button_pressed(&mut self) -> bool {
        self.button.as_mut().is_some_and(Button::is_held)
    }
}

// ── Continuous ADC (device) ───────────────────────────────────

/// Continuous-mode ADC1 reader implementing [`AdcPort`].
///
/// Reads are gated on [`ADC_FRAMES_READY`]; when the previous read filled
/// the whole buffer the pool may hold more, so the next iteration reads
/// without waiting for another callback.
///
/// [`ADC_FRAMES_READY`]: crate::sensors::ADC_FRAMES_READY
#[cfg(target_os = "espidf")]
pub struct ContinuousAdc {
    handle: crate::drivers::hw_init::ContinuousAdcHandle,
    frame: Vec<u8>,
    backlog: bool,
}

#[cfg(target_os = "espidf")]
impl ContinuousAdc {
    pub fn new(handle: crate::drivers::hw_init::ContinuousAdcHandle) -> Result<Self, crate::error::Error> {
        let mut frame = Vec::new();
        frame
            .try_reserve_exact(crate::drivers::hw_init::ADC_FRAME_BYTES)
            .map_err(|_| crate::error::Error::Init("adc frame buffer"))?;
        frame.resize(crate::drivers::hw_init::ADC_FRAME_BYTES, 0);
        Ok(Self {
            handle,
            frame,
            backlog: false,
        })
    }
}

#[cfg(target_os = "espidf")]
impl AdcPort for ContinuousAdc {
    fn read_samples(&mut self, out: &mut Vec<u16>, max: usize) -> Result<usize, SensorError> {
        if crate::sensors::current::ADC_POOL_OVERFLOWED.take() > 0 {
            // The pool is full of stale results; drain it from the next iteration.
            self.backlog = true;
            return Err(SensorError::AdcOverrun);
        }
        if !self.backlog && crate::sensors::ADC_FRAMES_READY.take() == 0 {
            return Ok(0);
        }
        let want = max
            .saturating_mul(crate::sensors::current::TYPE2_RESULT_BYTES)
            .min(self.frame.len());
        let len = crate::drivers::hw_init::adc_read_frames(&mut self.handle, &mut self.frame[..want])
            .map_err(|_| SensorError::AdcReadFailed)?;
        self.backlog = len == want && len > 0;
        Ok(crate::sensors::current::decode_type2(
            &self.frame[..len],
            crate::pins::CURRENT_ADC_CHANNEL,
            out,
            max,
        ))
    }
}
