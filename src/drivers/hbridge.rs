//! DRV8706H-Q1 H-bridge gate driver in PH/EN mode.
//!
//! | Pin     | Dir | Meaning                                  |
//! |---------|-----|------------------------------------------|
//! | EN      | out | HIGH drives the bridge                   |
//! | PH      | out | HIGH = forward, LOW = reverse            |
//! | nSLEEP  | out | LOW puts the driver to sleep             |
//! | DRVOFF  | out | HIGH forces the outputs off              |
//! | nFAULT  | in  | open drain, LOW on fault                 |
//!
//! ## Safety contract
//!
//! Construction brings the driver up asleep with outputs forced off, then
//! wakes it with EN low.  Nothing drives the cell until [`HBridge::enable`].
//! The driver is a dumb actuator; the control loop decides when to enable.

use embedded_hal::digital::{InputPin, OutputPin};

use crate::control::Direction;
use crate::error::ActuatorError;

pub struct HBridge<EN, PH, SLP, OFF, FLT> {
    en: EN,
    ph: PH,
    nsleep: SLP,
    drvoff: OFF,
    nfault: FLT,
    enabled: bool,
    direction: Direction,
}

impl<EN, PH, SLP, OFF, FLT> HBridge<EN, PH, SLP, OFF, FLT>
where
    EN: OutputPin,
    PH: OutputPin,
    SLP: OutputPin,
    OFF: OutputPin,
    FLT: InputPin,
{
    pub fn new(en: EN, ph: PH, nsleep: SLP, drvoff: OFF, nfault: FLT) -> Result<Self, ActuatorError> {
        let mut bridge = Self {
            en,
            ph,
            nsleep,
            drvoff,
            nfault,
            enabled: false,
            direction: Direction::Forward,
        };

        // Safe state: asleep, outputs forced off.
        out(bridge.en.set_low())?;
        out(bridge.drvoff.set_high())?;
        out(bridge.nsleep.set_low())?;
        out(bridge.ph.set_high())?;

        // Wake with EN still low.
        out(bridge.nsleep.set_high())?;
        out(bridge.drvoff.set_low())?;
        log::info!("HBridge: awake, outputs disabled");
        Ok(bridge)
    }

    /// Drive EN high.  Refused while nFAULT is asserted.
    pub fn enable(&mut self) -> Result<(), ActuatorError> {
        if self.is_faulted()? {
            return Err(ActuatorError::BridgeFault);
        }
        out(self.en.set_high())?;
        self.enabled = true;
        Ok(())
    }

    pub fn disable(&mut self) -> Result<(), ActuatorError> {
        out(self.en.set_low())?;
        self.enabled = false;
        Ok(())
    }

    pub fn set_direction(&mut self, direction: Direction) -> Result<(), ActuatorError> {
        match direction {
            Direction::Forward => out(self.ph.set_high())?,
            Direction::Reverse => out(self.ph.set_low())?,
        }
        self.direction = direction;
        Ok(())
    }

    /// nFAULT is pulled low.
    pub fn is_faulted(&mut self) -> Result<bool, ActuatorError> {
        self.nfault.is_low().map_err(|_| ActuatorError::GpioReadFailed)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}

fn out<E>(r: Result<(), E>) -> Result<(), ActuatorError> {
    r.map_err(|_| ActuatorError::GpioWriteFailed)
}
