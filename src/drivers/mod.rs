//! Peripheral drivers: thin, typed wrappers over embedded-hal traits or
//! raw ESP-IDF calls.  Pure helpers (debounce, LED patterns, duty maths)
//! live beside the driver that uses them so they test on the host.

pub mod button;
pub mod hbridge;
pub mod hw_init;
pub mod led_patterns;
pub mod status_led;
pub mod supply;
pub mod watchdog;
