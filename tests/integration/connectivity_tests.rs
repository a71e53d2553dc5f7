//! Connectivity: boot cycle, provisioning portal, link loss and backoff.

use crate::mock_hw::{DEVICE_NAME, MockNvs, MockWifi, Rig, nvs_with_networks};

use electrooxidizer::adapters::web::parse_portal_form;
use electrooxidizer::app::events::AppEvent;
use electrooxidizer::app::ports::StoragePort;
use electrooxidizer::config;
use electrooxidizer::fsm::StateId;

#[test]
fn boot_connects_to_a_saved_network() {
    let mut r = Rig::boot(
        nvs_with_networks(&[("Lab", "abcdefgh")]),
        MockWifi::reachable(&[("Lab", "abcdefgh")]),
    );
    assert_eq!(r.app.net_state(), StateId::ConnectingSaved);
    r.tick_at(10);

    assert_eq!(r.app.net_state(), StateId::Connected);
    assert_eq!(r.app.snapshot().network.as_deref(), Some("Lab"));
    assert!(r.sink.events.iter().any(|e| matches!(
        e,
        AppEvent::ConnectivityChanged {
            from: StateId::ConnectingSaved,
            to: StateId::Connected
        }
    )));
    assert!(r.nvs.exists(config::STORAGE_NAMESPACE, config::LAST_NETWORK_KEY));
    assert_eq!(r.app.connectivity().store().find("Lab").unwrap().priority, 2);
}

#[test]
fn falls_through_the_table_and_tries_last_used_first_after_reboot() {
    let mut r = Rig::boot(
        nvs_with_networks(&[("Lab", "abcdefgh"), ("Shop", "ijklmnop")]),
        MockWifi::reachable(&[("Lab", "abcdefgh")]),
    );
    r.tick_at(10);
    assert_eq!(r.wifi.connects, ["Shop"]);
    r.tick_at(config::CONNECT_ATTEMPT_TIMEOUT_MS);
    r.tick_at(config::CONNECT_ATTEMPT_TIMEOUT_MS + 10);
    assert_eq!(r.app.net_state(), StateId::Connected);
    assert_eq!(r.wifi.connects, ["Shop", "Lab"]);

    let before = r.wifi.connects.len();
    let mut r = r.reboot();
    r.tick_at(10);
    assert_eq!(r.wifi.connects[before..], ["Lab"]);
    assert_eq!(r.app.net_state(), StateId::Connected);
}

#[test]
fn empty_table_opens_portal_named_after_the_device() {
    let mut r = Rig::boot(MockNvs::new(), MockWifi::new());
    r.tick_at(10);
    assert_eq!(r.app.net_state(), StateId::PortalActive);
    assert_eq!(r.wifi.portal.as_deref(), Some(DEVICE_NAME));
}

#[test]
fn portal_submission_connects_saves_and_renames() {
    let mut r = Rig::boot(MockNvs::new(), MockWifi::reachable(&[("Home", "secret123")]));
    r.tick_at(10);
    r.wifi.submission = Some(parse_portal_form("ssid=Home&password=secret123&name=Tank+2").unwrap());
    r.tick_at(20);
    r.tick_at(30);

    assert_eq!(r.app.net_state(), StateId::Connected);
    assert_eq!(r.wifi.portal, None);
    assert_eq!(r.app.settings().device_name.as_str(), "Tank 2");
    assert_eq!(r.nvs.settings.as_ref().unwrap().device_name.as_str(), "Tank 2");
    assert!(r.app.connectivity().store().find("Home").is_some());
    assert!(r.nvs.exists(config::STORAGE_NAMESPACE, config::NETWORKS_KEY));
}

#[test]
fn rejected_submission_is_not_saved() {
    let mut r = Rig::boot(MockNvs::new(), MockWifi::reachable(&[("Home", "secret123")]));
    r.tick_at(10);
    r.wifi.submission = Some(parse_portal_form("ssid=Home&password=wrongpass").unwrap());
    r.tick_at(20);
    r.tick_at(20 + config::CONNECT_ATTEMPT_TIMEOUT_MS);

    assert_eq!(r.app.net_state(), StateId::PortalActive);
    assert!(r.wifi.portal.is_some());
    assert!(r.app.connectivity().store().is_empty());
    assert_eq!(r.app.settings().device_name.as_str(), DEVICE_NAME);
}

#[test]
fn link_loss_waits_out_backoff_then_reconnects() {
    let mut r = Rig::boot(
        nvs_with_networks(&[("Lab", "abcdefgh")]),
        MockWifi::reachable(&[("Lab", "abcdefgh")]),
    );
    r.tick_at(10);
    assert_eq!(r.app.net_state(), StateId::Connected);

    r.wifi.drop_link();
    r.tick_at(1_000);
    assert_eq!(r.app.net_state(), StateId::Disconnected);
    assert_eq!(r.app.snapshot().network, None);
    // Never before the boot stabilisation floor.
    assert_eq!(r.app.connectivity().retry_at_ms(), config::BOOT_STABILIZATION_MS);

    r.tick_at(config::BOOT_STABILIZATION_MS - 10);
    assert_eq!(r.app.net_state(), StateId::Disconnected);
    r.tick_at(config::BOOT_STABILIZATION_MS);
    r.tick_at(config::BOOT_STABILIZATION_MS + 10);
    assert_eq!(r.app.net_state(), StateId::Connected);
    assert_eq!(r.app.connectivity().backoff_ms(), config::RECONNECT_BASE_MS);
}

#[test]
fn failed_reconnect_cycles_double_the_backoff() {
    let mut r = Rig::boot(
        nvs_with_networks(&[("Lab", "abcdefgh")]),
        MockWifi::reachable(&[("Lab", "abcdefgh")]),
    );
    r.tick_at(10);
    r.wifi.reachable.clear();
    r.wifi.drop_link();
    r.tick_at(1_000);

    let mut t = r.app.connectivity().retry_at_ms();
    for expected in [20_000, 40_000, 80_000] {
        r.tick_at(t);
        assert_eq!(r.app.net_state(), StateId::ConnectingSaved);
        r.tick_at(t + config::CONNECT_ATTEMPT_TIMEOUT_MS);
        assert_eq!(r.app.net_state(), StateId::Disconnected);
        assert_eq!(r.app.connectivity().backoff_ms(), expected);
        t = r.app.connectivity().retry_at_ms();
    }
}

#[test]
fn portal_keeps_retrying_saved_networks() {
    let mut r = Rig::boot(nvs_with_networks(&[("Lab", "abcdefgh")]), MockWifi::new());
    r.tick_at(10);
    r.tick_at(config::CONNECT_ATTEMPT_TIMEOUT_MS);
    assert_eq!(r.app.net_state(), StateId::PortalActive);

    r.wifi.reachable = MockWifi::reachable(&[("Lab", "abcdefgh")]).reachable;
    r.tick_at(config::BOOT_STABILIZATION_MS - 10);
    assert_eq!(r.app.net_state(), StateId::PortalActive);
    r.tick_at(config::BOOT_STABILIZATION_MS);
    r.tick_at(config::BOOT_STABILIZATION_MS + 10);
    assert_eq!(r.app.net_state(), StateId::Connected);
    assert_eq!(r.wifi.portal, None);
}
