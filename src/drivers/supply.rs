//! RSP-1000-24 supply remote programming over PWM.
//!
//! The supply's output follows the filtered PWM duty linearly, so a
//! target voltage maps to `round(volts / VOLTS_PER_PWM_COUNT)` counts.
//! The loop recomputes the duty every iteration; the peripheral is only
//! written when the count changes.

use embedded_hal::pwm::SetDutyCycle;
use log::{info, warn};

use crate::config::VOLTS_PER_PWM_COUNT;
use crate::error::ActuatorError;

/// Duty counts for `volts`, clamped to `0..=max_duty`.
pub fn duty_for(volts: f32, max_duty: u16) -> u16 {
    if !volts.is_finite() || volts <= 0.0 {
        return 0;
    }
    let counts = (volts / VOLTS_PER_PWM_COUNT).round();
    if counts >= f32::from(max_duty) {
        max_duty
    } else {
        counts as u16
    }
}

/// Claims the PWM channel.  Called again on every write until it succeeds.
pub type PwmAttach<P> = Box<dyn FnMut() -> Result<P, ActuatorError>>;

pub struct SupplyDriver<P> {
    pwm: Option<P>,
    attach: Option<PwmAttach<P>>,
    attach_failures: u32,
    last_duty: Option<u16>,
}

impl<P: SetDutyCycle> SupplyDriver<P> {
    pub fn new(pwm: P) -> Self {
        Self {
            pwm: Some(pwm),
            attach: None,
            attach_failures: 0,
            last_duty: None,
        }
    }

    /// Start without a channel.  `attach` is tried now and then on each
    /// `set_voltage` until it yields one; meanwhile writes fail with
    /// [`ActuatorError::PwmUnavailable`].
    pub fn deferred(attach: PwmAttach<P>) -> Self {
        let mut driver = Self {
            pwm: None,
            attach: Some(attach),
            attach_failures: 0,
            last_duty: None,
        };
        // A failure is already logged and counted.
        let _ = driver.channel();
        driver
    }

    pub fn is_attached(&self) -> bool {
        self.pwm.is_some()
    }

    fn channel(&mut self) -> Result<&mut P, ActuatorError> {
        if self.pwm.is_none() {
            let attach = self.attach.as_mut().ok_or(ActuatorError::PwmUnavailable)?;
            match attach() {
                Ok(pwm) => {
                    if self.attach_failures > 0 {
                        info!("Supply: PWM attached after {} failed attempts", self.attach_failures);
                    }
                    self.pwm = Some(pwm);
                    self.last_duty = None;
                }
                Err(e) => {
                    self.attach_failures = self.attach_failures.saturating_add(1);
                    if self.attach_failures == 1 {
                        warn!("Supply: PWM attach failed ({}), retrying from the loop", e);
                    }
                    return Err(ActuatorError::PwmUnavailable);
                }
            }
        }
        self.pwm.as_mut().ok_or(ActuatorError::PwmUnavailable)
    }

    /// Program `volts`.  Returns the duty in effect.
    pub fn set_voltage(&mut self, volts: f32) -> Result<u16, ActuatorError> {
        let last = self.last_duty;
        let pwm = self.channel()?;
        let duty = duty_for(volts, pwm.max_duty_cycle());
        if last == Some(duty) {
            return Ok(duty);
        }
        pwm.set_duty_cycle(duty)
            .map_err(|_| ActuatorError::PwmWriteFailed)?;
        self.last_duty = Some(duty);
        Ok(duty)
    }

    pub fn last_duty(&self) -> Option<u16> {
        self.last_duty
    }
}
