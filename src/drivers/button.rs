//! Polled, debounced test button.
//!
//! ## Hardware
//!
//! Active-low momentary switch with the internal pull-up enabled.  The
//! loop samples the raw level once per iteration; [`Debouncer`] turns that
//! into clean press/release edges.
//!
//! ```text
//!  raw   ‾‾‾‾|_|‾|__________________|‾‾‾‾
//!             ◀─▶ bounce   ◀─ 50 ms ─▶
//!  edge                      Pressed                 Released (50 ms later)
//! ```
//!
//! A level only counts once it has held unchanged for the debounce
//! period; any change restarts the timer.

use embedded_hal::digital::InputPin;
use log::warn;

use crate::config;

/// A debounced level change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEdge {
    Pressed,
    Released,
}

#[derive(Debug, Clone)]
pub struct Debouncer {
    debounce_ms: u64,
    stable: bool,
    last_raw: bool,
    changed_at_ms: u64,
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(config::BUTTON_DEBOUNCE_MS)
    }
}

impl Debouncer {
    pub fn new(debounce_ms: u64) -> Self {
        Self {
            debounce_ms,
            stable: false,
            last_raw: false,
            changed_at_ms: 0,
        }
    }

    /// Feed this iteration's raw level (`true` = held).
    pub fn update(&mut self, pressed: bool, now_ms: u64) -> Option<ButtonEdge> {
        if pressed != self.last_raw {
            self.last_raw = pressed;
            self.changed_at_ms = now_ms;
            return None;
        }
        if pressed == self.stable || now_ms.saturating_sub(self.changed_at_ms) < self.debounce_ms {
            return None;
        }
        self.stable = pressed;
        Some(if pressed {
            ButtonEdge::Pressed
        } else {
            ButtonEdge::Released
        })
    }

    /// Debounced level.
    pub fn is_pressed(&self) -> bool {
        self.stable
    }
}

/// Active-low button on any `embedded-hal` input pin.
pub struct Button<P> {
    pin: P,
    read_errors: u32,
}

impl<P: InputPin> Button<P> {
    pub fn new(pin: P) -> Self {
        Self {
            pin,
            read_errors: 0,
        }
    }

    /// Raw level.  A failed read counts as released.
    pub fn is_held(&mut self) -> bool {
        match self.pin.is_low() {
            Ok(low) => low,
            Err(_) => {
                self.read_errors = self.read_errors.wrapping_add(1);
                if self.read_errors == 1 {
                    warn!("Button: GPIO read failed, treating as released");
                }
                false
            }
        }
    }
}
