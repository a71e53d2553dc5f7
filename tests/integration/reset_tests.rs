//! Provisioning resets from rapid power cycling and triple button presses.

use crate::mock_hw::{DEVICE_NAME, MockNvs, MockWifi, Rig, nvs_with_networks};

use electrooxidizer::app::events::AppEvent;
use electrooxidizer::app::ports::StoragePort;
use electrooxidizer::config::{self, NameString, Settings};
use electrooxidizer::fsm::StateId;
use electrooxidizer::reset_detect::ResetSource;

/// Saved "Lab" network, a custom name, and "Lab" in range.
fn provisioned() -> (MockNvs, MockWifi) {
    let mut nvs = nvs_with_networks(&[("Lab", "abcdefgh")]);
    nvs.settings = Some(Settings {
        device_name: NameString::try_from("Tank 2").unwrap(),
        ..Settings::default()
    });
    (nvs, MockWifi::reachable(&[("Lab", "abcdefgh")]))
}

fn resets(r: &Rig, source: ResetSource) -> usize {
    r.sink
        .count(|e| matches!(e, AppEvent::ProvisioningReset(s) if *s == source))
}

#[test]
fn three_quick_presses_wipe_networks_and_open_portal() {
    let (nvs, wifi) = provisioned();
    let mut r = Rig::boot(nvs, wifi);
    r.tick_at(10);
    assert_eq!(r.app.net_state(), StateId::Connected);

    r.press_button();
    r.press_button();
    assert_eq!(resets(&r, ResetSource::ButtonPresses), 0);
    r.press_button();

    assert_eq!(resets(&r, ResetSource::ButtonPresses), 1);
    assert_eq!(r.app.net_state(), StateId::PortalActive);
    assert_eq!(r.wifi.portal.as_deref(), Some(DEVICE_NAME));
    assert!(!r.wifi.link);
    assert!(r.app.connectivity().store().is_empty());
    assert!(!r.nvs.exists(config::STORAGE_NAMESPACE, config::NETWORKS_KEY));
    assert!(!r.nvs.exists(config::STORAGE_NAMESPACE, config::LAST_NETWORK_KEY));
    assert_eq!(r.app.settings().device_name.as_str(), DEVICE_NAME);
    assert_eq!(r.nvs.settings.as_ref().unwrap().device_name.as_str(), DEVICE_NAME);
}

#[test]
fn presses_spread_beyond_the_window_do_nothing() {
    let (nvs, wifi) = provisioned();
    let mut r = Rig::boot(nvs, wifi);
    r.tick_at(10);

    r.press_button();
    r.press_button();
    r.tick_at(r.now_ms + config::BUTTON_RESET_WINDOW_MS + 100);
    r.press_button();

    assert_eq!(resets(&r, ResetSource::ButtonPresses), 0);
    assert_eq!(r.app.net_state(), StateId::Connected);
    assert!(r.app.connectivity().store().find("Lab").is_some());
}

#[test]
fn button_reset_leaves_the_run_state_alone() {
    let (nvs, wifi) = provisioned();
    let mut r = Rig::boot(nvs, wifi);
    r.send("toggle").unwrap();
    for _ in 0..3 {
        r.press_button();
    }
    assert_eq!(resets(&r, ResetSource::ButtonPresses), 1);
    assert!(r.app.is_running());
}

#[test]
fn third_quick_boot_starts_in_portal_with_networks_erased() {
    let (nvs, wifi) = provisioned();
    let r = Rig::boot(nvs, wifi);
    let r = r.reboot();
    assert_eq!(resets(&r, ResetSource::PowerCycles), 0);
    let r = r.reboot();

    assert_eq!(resets(&r, ResetSource::PowerCycles), 1);
    assert_eq!(r.app.net_state(), StateId::PortalActive);
    assert_eq!(r.wifi.portal.as_deref(), Some(DEVICE_NAME));
    assert!(r.app.connectivity().store().is_empty());
    assert_eq!(r.app.settings().device_name.as_str(), DEVICE_NAME);
    assert!(!r.nvs.exists(config::STORAGE_NAMESPACE, config::POWER_CYCLE_KEY));
}

#[test]
fn staying_up_through_the_window_clears_the_boot_count() {
    let (nvs, wifi) = provisioned();
    let mut r = Rig::boot(nvs, wifi);
    r.tick_at(config::POWER_CYCLE_WINDOW_MS - 10);
    assert!(r.nvs.exists(config::STORAGE_NAMESPACE, config::POWER_CYCLE_KEY));
    r.tick_at(config::POWER_CYCLE_WINDOW_MS);
    assert!(!r.nvs.exists(config::STORAGE_NAMESPACE, config::POWER_CYCLE_KEY));

    let r = r.reboot().reboot();
    assert_eq!(resets(&r, ResetSource::PowerCycles), 0);
    assert!(r.app.connectivity().store().find("Lab").is_some());
    assert_eq!(r.app.settings().device_name.as_str(), "Tank 2");
}
