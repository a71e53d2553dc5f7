//! Fuzz target: `Command::parse`
//!
//! Feeds arbitrary text to the command decoder and checks that anything it
//! accepts is within the bounds the control loop relies on.
//!
//! cargo fuzz run fuzz_command_parser

#![no_main]

use electrooxidizer::app::commands::Command;
use electrooxidizer::config;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = core::str::from_utf8(data) else {
        return;
    };
    match Command::parse(text) {
        Ok(Command::SetVoltage(v)) => {
            assert!(v.is_finite());
            assert!(config::voltage_in_range(v as f32), "accepted {v} V");
        }
        Ok(Command::SetForwardTime(ms) | Command::SetReverseTime(ms)) => {
            assert!(config::dwell_in_range(ms), "accepted {ms} ms");
        }
        Ok(Command::ForgetNetwork(ssid)) => {
            assert!(!ssid.is_empty() && ssid.len() <= 32);
        }
        Ok(_) | Err(_) => {}
    }
});
