//! Control loop: run state, polarity flips, sampling, snapshots, faults.

use crate::mock_hw::{ActuatorCall, MockNvs, MockWifi, Rig};

use electrooxidizer::app::events::AppEvent;
use electrooxidizer::control::{Calibration, Direction};
use electrooxidizer::drivers::led_patterns::COLOUR_FAULT;

fn rig() -> Rig {
    Rig::boot(MockNvs::new(), MockWifi::new())
}

#[test]
fn boots_stopped_with_output_parked() {
    let r = rig();
    assert!(!r.app.is_running());
    assert!(!r.hw.enabled());
    assert_eq!(r.hw.supply_voltage(), Some(0.0));
    assert!(matches!(r.sink.events.last(), Some(AppEvent::Started(s)) if !s.running));
}

#[test]
fn toggle_starts_forward_at_target_and_stops_to_zero() {
    let mut r = rig();
    r.send("toggle").unwrap();
    assert!(r.app.is_running());
    assert_eq!(r.hw.directions(), vec![Direction::Forward]);
    assert_eq!(r.hw.supply_voltage(), Some(14.0));
    assert!(r.hw.enabled());

    r.tick_at(10);
    r.send("toggle").unwrap();
    assert!(!r.app.is_running());
    assert!(!r.hw.enabled());
    assert_eq!(r.hw.supply_voltage(), Some(0.0));
}

#[test]
fn flips_twice_in_250ms_with_100ms_dwells() {
    let mut r = rig();
    r.send("toggle").unwrap();
    r.run_until(250, 10);
    assert_eq!(
        r.hw.directions(),
        vec![Direction::Forward, Direction::Reverse, Direction::Forward]
    );
}

#[test]
fn no_flips_while_stopped() {
    let mut r = rig();
    r.run_until(1_000, 10);
    assert!(r.hw.directions().is_empty());
    assert_eq!(r.app.polarity().direction(), Direction::Forward);
}

#[test]
fn snapshots_every_500ms_only_while_running() {
    let mut r = rig();
    r.run_until(2_000, 10);
    assert_eq!(r.sink.snapshots(), 0);

    r.send("toggle").unwrap();
    r.sink.clear();
    r.run_until(4_000, 10);
    assert_eq!(r.sink.snapshots(), 4);
}

#[test]
fn forward_window_publishes_calibrated_mean() {
    let mut r = rig();
    r.send("toggle").unwrap();
    r.hw.queue_samples(vec![3_000; 100]);
    r.tick_at(10);

    let c = r.app.conditioner();
    assert_eq!(c.average_positive(), Calibration::factory().current(3_000.0));
    assert_eq!(c.positive().count(), 0);
    assert_eq!(r.app.snapshot().latest_raw, 3_000);
    assert!(c.peak_positive() > 0.0);
}

#[test]
fn wrong_sign_samples_never_reach_an_accumulator() {
    let mut r = rig();
    r.send("toggle").unwrap();
    // Negative current while driving forward: a switching transient.
    r.hw.queue_samples(vec![1_000; 50]);
    r.tick_at(10);

    let c = r.app.conditioner();
    assert_eq!(c.positive().count(), 0);
    assert_eq!(c.negative().count(), 0);
    assert_eq!(c.latest_raw(), 1_000);
    assert_eq!(c.peak_negative(), 0.0);
}

#[test]
fn stopped_loop_drains_and_discards_samples() {
    let mut r = rig();
    r.hw.queue_samples(vec![3_000; 100]);
    r.tick_at(10);
    assert!(r.hw.batches.is_empty());
    assert_eq!(r.app.conditioner().latest_raw(), 0);
    assert_eq!(r.app.conditioner().average_positive(), 0.0);
}

#[test]
fn adc_error_skips_the_iteration_and_keeps_running() {
    let mut r = rig();
    r.send("toggle").unwrap();
    r.hw.adc_error = true;
    r.run_until(250, 10);
    assert!(r.app.is_running());
    assert_eq!(r.hw.directions().len(), 3);
}

#[test]
fn peaks_discarded_once_sixty_seconds_after_boot() {
    let mut r = rig();
    r.send("toggle").unwrap();
    r.hw.queue_samples(vec![3_000; 10]);
    r.tick_at(10);
    r.send("toggle").unwrap();
    assert!(r.app.conditioner().peak_positive() > 0.0);

    r.tick_at(59_990);
    assert!(r.app.conditioner().peak_positive() > 0.0);
    r.tick_at(60_000);
    assert_eq!(r.app.conditioner().peak_positive(), 0.0);

    r.send("toggle").unwrap();
    r.hw.queue_samples(vec![3_000; 10]);
    r.tick_at(60_010);
    let peak = r.app.conditioner().peak_positive();
    assert!(peak > 0.0);
    r.tick_at(120_000);
    assert_eq!(r.app.conditioner().peak_positive(), peak);
}

#[test]
fn peak_rearm_fires_once_during_a_continuous_run() {
    let mut r = rig();
    r.run_until(59_900, 100);
    r.send("toggle").unwrap();
    r.hw.queue_samples(vec![3_000; 10]);
    r.tick_at(59_950);
    assert!(r.app.conditioner().peak_positive() > 0.0);

    r.tick_at(60_000);
    assert!(r.app.is_running());
    assert_eq!(r.app.conditioner().peak_positive(), 0.0);
    assert_eq!(r.app.conditioner().peak_negative(), 0.0);

    // Back in forward from 60 100.
    r.tick_at(60_100);
    r.hw.queue_samples(vec![3_000; 10]);
    r.tick_at(60_150);
    let peak = r.app.conditioner().peak_positive();
    assert!(peak > 0.0);
    r.run_until(125_150, 1_000);
    assert!(r.app.is_running());
    assert_eq!(r.app.conditioner().peak_positive(), peak);
}

#[test]
fn command_uses_its_own_timestamp() {
    let mut r = rig();
    r.tick_at(1_000);
    r.now_ms = 5_000;
    r.send("toggle").unwrap();
    assert_eq!(r.app.polarity().last_flip_us(), 5_000_000);
    assert_eq!(r.app.context().now_ms, 5_000);

    // First forward dwell is measured from the command, not the last tick.
    r.tick_at(5_099);
    assert_eq!(r.app.polarity().direction(), Direction::Forward);
    r.tick_at(5_100);
    assert_eq!(r.app.polarity().direction(), Direction::Reverse);
}

#[test]
fn run_without_supply_stays_parked_until_the_pwm_attaches() {
    let mut r = rig();
    r.hw.supply_unavailable = true;
    r.send("toggle").unwrap();
    assert!(!r.app.is_running());
    assert!(!r.hw.enabled());

    r.tick_at(10);
    assert!(!r.app.is_running());

    r.hw.supply_unavailable = false;
    r.send("toggle").unwrap();
    assert!(r.app.is_running());
    assert_eq!(r.hw.supply_voltage(), Some(14.0));
}

#[test]
fn supply_follows_new_target_on_next_iteration() {
    let mut r = rig();
    r.send("toggle").unwrap();
    r.send("1F12").unwrap();
    r.hw.clear_calls();
    r.tick_at(10);
    assert!(r.hw.calls.contains(&ActuatorCall::SetVoltage(12.0)));
    assert_eq!(r.app.snapshot().average_positive_voltage, 12.0);
    assert_eq!(r.app.snapshot().average_negative_voltage, -12.0);
}

#[test]
fn fault_stops_the_run_until_the_line_releases() {
    let mut r = rig();
    r.send("toggle").unwrap();
    r.hw.fault = true;
    r.tick_at(10);

    assert!(!r.app.is_running());
    assert!(r.hw.calls.contains(&ActuatorCall::AllOff));
    assert!(!r.hw.enabled());
    assert_eq!(r.hw.supply_voltage(), Some(0.0));
    assert_eq!(r.sink.count(|e| matches!(e, AppEvent::FaultDetected)), 1);
    assert!(r.app.snapshot().fault);
    assert_eq!(r.hw.last_led(), Some(COLOUR_FAULT));
    assert_eq!(
        r.send("toggle"),
        Err(electrooxidizer::app::commands::CommandError::Faulted)
    );

    // Level-triggered line: no repeat event while it stays asserted.
    r.tick_at(20);
    assert_eq!(r.sink.count(|e| matches!(e, AppEvent::FaultDetected)), 1);

    r.hw.fault = false;
    r.tick_at(30);
    assert_eq!(r.sink.count(|e| matches!(e, AppEvent::FaultCleared)), 1);
    r.send("toggle").unwrap();
    assert!(r.app.is_running());
}
