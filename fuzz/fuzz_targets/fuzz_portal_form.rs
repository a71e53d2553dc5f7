//! Fuzz target: `parse_portal_form`
//!
//! The provisioning portal is an open access point, so the form body is
//! attacker-controlled.  Decoding must never panic and any accepted
//! submission must carry a valid credential and a bounded name.
//!
//! cargo fuzz run fuzz_portal_form

#![no_main]

use electrooxidizer::adapters::web::parse_portal_form;
use electrooxidizer::credentials::{validate_password, validate_ssid};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(body) = core::str::from_utf8(data) else {
        return;
    };
    if let Ok(sub) = parse_portal_form(body) {
        assert!(validate_ssid(&sub.credential.ssid).is_ok());
        assert!(validate_password(&sub.credential.password).is_ok());
        if let Some(name) = sub.name {
            assert!(!name.is_empty() && name.len() <= 32);
            assert!(!name.starts_with(char::is_whitespace));
        }
    }
});
