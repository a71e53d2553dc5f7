//! Fuzz target: `CredentialStore::from_json`
//!
//! Arbitrary bytes stand in for a corrupted or hostile flash blob.  Any
//! table the loader builds must satisfy the table invariants, and must
//! survive a save/load cycle unchanged.
//!
//! cargo fuzz run fuzz_network_table

#![no_main]

use electrooxidizer::config::MAX_NETWORKS;
use electrooxidizer::credentials::{CredentialStore, validate_password, validate_ssid};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok((store, _skipped)) = CredentialStore::from_json(data) else {
        return;
    };

    assert!(store.len() <= MAX_NETWORKS);
    for (i, entry) in store.iter().enumerate() {
        assert!(validate_ssid(&entry.ssid).is_ok());
        assert!(validate_password(&entry.password).is_ok());
        assert!(entry.priority >= 1);
        assert!(store.iter().skip(i + 1).all(|other| other.ssid != entry.ssid));
    }

    let bytes = store.to_json().expect("table serialises");
    let (reloaded, skipped) = CredentialStore::from_json(&bytes).expect("own output parses");
    assert_eq!(skipped, 0);
    assert_eq!(reloaded.sorted_by_priority(), store.sorted_by_priority());
});
