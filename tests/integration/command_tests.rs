//! Text command channel: decoding, validation, persistence, network table.

use crate::mock_hw::{MockNvs, MockWifi, Rig, nvs_with_networks};

use electrooxidizer::app::commands::{Command, CommandError};
use electrooxidizer::app::events::AppEvent;

fn rig() -> Rig {
    Rig::boot(MockNvs::new(), MockWifi::new())
}

#[test]
fn out_of_range_voltage_is_rejected_without_a_write() {
    let mut r = rig();
    let saves = r.nvs.settings_saves;

    assert_eq!(r.send("1F30"), Err(CommandError::OutOfRange));
    assert_eq!(r.app.settings().target_voltage, 14.0);
    assert_eq!(r.nvs.settings_saves, saves);
    assert!(matches!(
        r.sink.events.last(),
        Some(AppEvent::CommandRejected(CommandError::OutOfRange))
    ));
}

#[test]
fn voltage_change_is_applied_and_persisted() {
    let mut r = rig();
    r.send("1F12.5").unwrap();
    assert_eq!(r.app.settings().target_voltage, 12.5);
    assert_eq!(r.nvs.settings.as_ref().unwrap().target_voltage, 12.5);
    assert_eq!(r.nvs.settings_saves, 1);
    assert!(
        r.sink
            .events
            .iter()
            .any(|e| matches!(e, AppEvent::CommandAccepted(Command::SetVoltage(v)) if *v == 12.5))
    );
}

#[test]
fn malformed_numbers_and_dwell_bounds() {
    let mut r = rig();
    assert_eq!(r.send("1F-1"), Err(CommandError::OutOfRange));
    assert_eq!(r.send("1Fabc"), Err(CommandError::InvalidNumber));
    assert_eq!(r.send("1Finf"), Err(CommandError::InvalidNumber));
    assert_eq!(r.send("2F9"), Err(CommandError::OutOfRange));
    assert_eq!(r.send("2R60001"), Err(CommandError::OutOfRange));
    assert_eq!(r.send("2F"), Err(CommandError::InvalidNumber));
    assert_eq!(r.send("hello"), Err(CommandError::Unrecognized));
    assert_eq!(r.nvs.settings_saves, 0);
    assert_eq!(r.sink.count(|e| matches!(e, AppEvent::CommandRejected(_))), 7);
}

#[test]
fn dwell_changes_reach_the_scheduler() {
    let mut r = rig();
    r.send("2F250").unwrap();
    r.send("2R400").unwrap();
    assert_eq!(r.app.settings().forward_time_ms, 250);
    assert_eq!(r.app.settings().reverse_time_ms, 400);
    assert_eq!(r.app.polarity().active_dwell_us(), 250_000);
    assert_eq!(r.nvs.settings_saves, 2);
}

#[test]
fn surrounding_whitespace_is_ignored() {
    let mut r = rig();
    r.send("  toggle\n").unwrap();
    assert!(r.app.is_running());
}

#[test]
fn query_publishes_without_acceptance() {
    let mut r = rig();
    r.sink.clear();
    r.send("getValues").unwrap();
    assert_eq!(r.sink.snapshots(), 1);
    assert_eq!(r.sink.count(|e| matches!(e, AppEvent::CommandAccepted(_))), 0);
}

#[test]
fn parameter_change_and_explicit_reset_clear_peaks() {
    let mut r = rig();
    r.send("toggle").unwrap();
    r.hw.queue_samples(vec![3_000; 10]);
    r.tick_at(10);
    assert!(r.app.conditioner().peak_positive() > 0.0);
    r.send("2F200").unwrap();
    assert_eq!(r.app.conditioner().peak_positive(), 0.0);

    r.hw.queue_samples(vec![3_000; 10]);
    r.tick_at(20);
    assert!(r.app.conditioner().peak_positive() > 0.0);
    r.send("resetPeakCurrent").unwrap();
    assert_eq!(r.app.conditioner().peak_positive(), 0.0);
}

#[test]
fn voltage_and_reverse_dwell_changes_clear_peaks() {
    let mut r = rig();
    r.send("toggle").unwrap();
    r.hw.queue_samples(vec![3_000; 10]);
    r.tick_at(10);
    assert!(r.app.conditioner().peak_positive() > 0.0);
    let saves = r.nvs.settings_saves;
    r.send("1F12").unwrap();
    assert_eq!(r.app.conditioner().peak_positive(), 0.0);
    assert_eq!(r.app.settings().target_voltage, 12.0);
    assert_eq!(r.nvs.settings_saves, saves + 1);

    r.hw.queue_samples(vec![3_000; 10]);
    r.tick_at(20);
    assert!(r.app.conditioner().peak_positive() > 0.0);
    r.send("2R300").unwrap();
    assert_eq!(r.app.conditioner().peak_positive(), 0.0);

    // A rejected change leaves peaks alone.
    r.hw.queue_samples(vec![3_000; 10]);
    r.tick_at(30);
    let peak = r.app.conditioner().peak_positive();
    assert_eq!(r.send("1F30"), Err(CommandError::OutOfRange));
    assert_eq!(r.app.conditioner().peak_positive(), peak);
}

#[test]
fn settings_survive_a_reboot() {
    let mut r = rig();
    r.send("1F9.5").unwrap();
    r.send("2R300").unwrap();
    let r = r.reboot();
    assert_eq!(r.app.settings().target_voltage, 9.5);
    assert_eq!(r.app.settings().reverse_time_ms, 300);
    assert!(!r.app.is_running());
}

#[test]
fn list_networks_reports_priority_order() {
    let mut r = Rig::boot(
        nvs_with_networks(&[("Lab", "abcdefgh"), ("Shop", "")]),
        MockWifi::new(),
    );
    r.sink.clear();
    r.send("listNetworks").unwrap();

    let listed: Vec<String> = r
        .sink
        .events
        .iter()
        .find_map(|e| match e {
            AppEvent::Networks(list) => Some(list.iter().map(|n| n.ssid.to_string()).collect()),
            _ => None,
        })
        .unwrap();
    // Equal priority: most recently connected first.
    assert_eq!(listed, ["Shop", "Lab"]);
    assert_eq!(r.sink.snapshots(), 0);
}

#[test]
fn forget_network_removes_and_persists() {
    let mut r = Rig::boot(
        nvs_with_networks(&[("Lab", "abcdefgh"), ("Shop", "")]),
        MockWifi::new(),
    );
    assert_eq!(r.send("forgetNetwork:Nope"), Err(CommandError::UnknownNetwork));
    r.send("forgetNetwork:Lab").unwrap();
    assert!(r.app.connectivity().store().find("Lab").is_none());

    let r = r.reboot();
    assert!(r.app.connectivity().store().find("Lab").is_none());
    assert!(r.app.connectivity().store().find("Shop").is_some());
}
