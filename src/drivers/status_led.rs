//! On-board WS2812 RGB status LED.
//!
//! ## Dual-target design
//!
//! On ESP-IDF: bit-bangs the 24-bit GRB frame through an RMT TX channel.
//! On host/test: records the colour in memory only.  A device whose RMT
//! channel could not be set up uses [`StatusLed::detached`], which behaves
//! like the host version.

#[cfg(target_os = "espidf")]
use esp_idf_hal::rmt::{FixedLengthSignal, PinState, Pulse, TxRmtDriver};

#[cfg(target_os = "espidf")]
pub struct StatusLed {
    tx: Option<TxRmtDriver<'static>>,
    current: (u8, u8, u8),
}

#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Default)]
pub struct StatusLed {
    current: (u8, u8, u8),
}

#[cfg(target_os = "espidf")]
impl StatusLed {
    pub fn new(tx: TxRmtDriver<'static>) -> Self {
        Self {
            tx: Some(tx),
            current: (0, 0, 0),
        }
    }

    pub fn detached() -> Self {
        Self {
            tx: None,
            current: (0, 0, 0),
        }
    }

    /// Push one colour to the LED.  Skipped when unchanged.
    pub fn set_colour(&mut self, r: u8, g: u8, b: u8) {
        if self.current == (r, g, b) {
            return;
        }
        match self.write_frame(grb_word(r, g, b)) {
            Ok(()) => self.current = (r, g, b),
            Err(e) => log::warn!("StatusLed: RMT write failed: {e}"),
        }
    }

    fn write_frame(&mut self, word: u32) -> Result<(), esp_idf_svc::sys::EspError> {
        use core::time::Duration;

        let Some(tx) = self.tx.as_mut() else {
            return Ok(());
        };
        let ticks_hz = tx.counter_clock()?;
        let t0h = Pulse::new_with_duration(ticks_hz, PinState::High, &Duration::from_nanos(350))?;
        let t0l = Pulse::new_with_duration(ticks_hz, PinState::Low, &Duration::from_nanos(800))?;
        let t1h = Pulse::new_with_duration(ticks_hz, PinState::High, &Duration::from_nanos(700))?;
        let t1l = Pulse::new_with_duration(ticks_hz, PinState::Low, &Duration::from_nanos(600))?;

        let mut signal = FixedLengthSignal::<24>::new();
        for bit in 0..24usize {
            let set = word & (1 << (23 - bit)) != 0;
            let pair = if set { (t1h, t1l) } else { (t0h, t0l) };
            signal.set(bit, &pair)?;
        }
        tx.start_blocking(&signal)
    }
}

#[cfg(not(target_os = "espidf"))]
impl StatusLed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_colour(&mut self, r: u8, g: u8, b: u8) {
        self.current = (r, g, b);
    }
}

impl StatusLed {
    pub fn off(&mut self) {
        self.set_colour(0, 0, 0);
    }

    pub fn current_colour(&self) -> (u8, u8, u8) {
        self.current
    }
}

/// WS2812 wire order is green, red, blue, MSB first.
pub fn grb_word(r: u8, g: u8, b: u8) -> u32 {
    (u32::from(g) << 16) | (u32::from(r) << 8) | u32::from(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_is_grb() {
        assert_eq!(grb_word(0x12, 0x34, 0x56), 0x34_12_56);
    }

    #[test]
    fn host_led_records_colour() {
        let mut led = StatusLed::new();
        led.set_colour(128, 0, 0);
        assert_eq!(led.current_colour(), (128, 0, 0));
        led.off();
        assert_eq!(led.current_colour(), (0, 0, 0));
    }
}
