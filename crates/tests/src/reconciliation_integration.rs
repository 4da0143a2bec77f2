//! Scenario tests for log-driven reconciliation
//!
//! These drive the engine with realistic log batches against a fake host and
//! check hardware writes, state, history and notifications together.

use crate::fakes::{lines, FakeController, RecordingNotifier, DAC, SPEAKERS};
use purerate_core::domain::history::DEFAULT_HISTORY_CAPACITY;
use purerate_core::domain::logs::LogSourceError;
use purerate_core::domain::{ReconcileOutcome, ReconciliationEngine, SampleRate, Settings};
use std::sync::Arc;

fn rate(hz: u32) -> SampleRate {
    SampleRate::from_hz(hz)
}

struct Rig {
    controller: Arc<FakeController>,
    notifier: Arc<RecordingNotifier>,
    engine: ReconciliationEngine,
}

fn rig(settings: Settings) -> Rig {
    let controller = Arc::new(FakeController::studio());
    let notifier = Arc::new(RecordingNotifier::default());
    let engine = ReconciliationEngine::new(
        controller.clone(),
        notifier.clone(),
        &settings,
        DEFAULT_HISTORY_CAPACITY,
    );
    Rig {
        controller,
        notifier,
        engine,
    }
}

fn notifying() -> Settings {
    Settings {
        notifications_enabled: true,
        ..Settings::default()
    }
}

// ============================================================================
// BASIC SWITCHING
// ============================================================================

#[test]
fn test_track_change_switches_default_device() {
    let mut rig = rig(notifying());
    assert_eq!(rig.engine.snapshot().current_sample_rate, Some(rate(44100)));

    let outcome = rig.engine.process_entries(&[lines::NOISE, lines::QUEUE_48]);

    assert!(matches!(outcome, Some(ReconcileOutcome::Switched(_))));
    assert_eq!(rig.controller.writes(), vec![(SPEAKERS, rate(48000))]);
    assert_eq!(rig.controller.rate_of(SPEAKERS), Some(rate(48000)));

    let state = rig.engine.snapshot();
    assert_eq!(state.current_sample_rate, Some(rate(48000)));
    assert_eq!(state.total_switches, 1);
    assert_eq!(state.last_error, None);

    let event = state.history.latest().unwrap();
    assert_eq!(event.from_rate, Some(rate(44100)));
    assert_eq!(event.to_rate, rate(48000));
    assert_eq!(event.device_name.as_deref(), Some("MacBook Pro Speakers"));
    assert!(event.success);

    assert_eq!(rig.notifier.titles(), ["PureRate"]);
    assert_eq!(
        rig.notifier.bodies(),
        ["Switched to 48.0 kHz on MacBook Pro Speakers"]
    );
}

#[test]
fn test_same_window_read_twice_switches_once() {
    let mut rig = rig(Settings::default());
    let batch = [lines::CAPS_96];

    rig.engine.process_entries(&batch);
    let second = rig.engine.process_entries(&batch);

    assert_eq!(second, Some(ReconcileOutcome::Duplicate));
    assert_eq!(rig.controller.writes().len(), 1);
    assert_eq!(rig.engine.snapshot().history.len(), 1);
}

#[test]
fn test_last_match_in_window_wins() {
    let mut rig = rig(Settings::default());

    rig.engine
        .process_entries(&[lines::OUTPUT_192, lines::NOISE, lines::ALAC_88, lines::NOISE]);

    assert_eq!(rig.controller.writes(), vec![(SPEAKERS, rate(88200))]);
}

#[test]
fn test_implausible_rate_is_ignored() {
    let mut rig = rig(Settings::default());

    assert_eq!(rig.engine.process_entries(&[lines::FLAC_CHANNELS]), None);
    assert!(rig.controller.writes().is_empty());
    assert_eq!(rig.engine.last_observed_rate(), None);
}

#[test]
fn test_matching_rate_needs_no_write() {
    let mut rig = rig(Settings::default());

    let outcome = rig.engine.process_entries(&[lines::QUEUE_44]);

    assert_eq!(outcome, Some(ReconcileOutcome::InSync));
    assert!(rig.controller.writes().is_empty());
    assert!(rig.engine.snapshot().history.is_empty());
}

#[test]
fn test_returning_to_previous_rate_switches_again() {
    let mut rig = rig(Settings::default());

    rig.engine.process_entries(&[lines::QUEUE_48]);
    rig.engine.process_entries(&[lines::QUEUE_44]);
    rig.engine.process_entries(&[lines::QUEUE_48]);

    let to: Vec<u32> = rig.controller.writes().iter().map(|(_, r)| r.hz()).collect();
    assert_eq!(to, [48000, 44100, 48000]);
    assert_eq!(rig.engine.snapshot().total_switches, 3);
}

// ============================================================================
// DEVICE SELECTION
// ============================================================================

#[test]
fn test_explicit_target_overrides_default() {
    let mut rig = rig(Settings {
        target_device_id: Some(DAC),
        ..Settings::default()
    });

    let state = rig.engine.snapshot();
    assert_eq!(state.active_device_name.as_deref(), Some("USB DAC"));
    assert_eq!(state.current_sample_rate, Some(rate(48000)));
    assert_eq!(state.bit_depth, Some(32));
    assert!(state.supported_rates.contains(&rate(384000)));
    assert_eq!(state.available_devices.len(), 2);

    rig.engine.process_entries(&[lines::OUTPUT_192]);
    assert_eq!(rig.controller.writes(), vec![(DAC, rate(192000))]);
    assert_eq!(rig.controller.rate_of(SPEAKERS), Some(rate(44100)));
}

#[test]
fn test_retargeting_does_not_replay_last_candidate() {
    let mut rig = rig(Settings::default());
    rig.engine.process_entries(&[lines::CAPS_96]);

    rig.engine.set_target_device(Some(DAC));

    let state = rig.engine.snapshot();
    assert_eq!(state.active_device_name.as_deref(), Some("USB DAC"));
    assert_eq!(state.current_sample_rate, Some(rate(48000)));
    assert_eq!(rig.controller.writes().len(), 1);

    assert_eq!(
        rig.engine.process_entries(&[lines::CAPS_96]),
        Some(ReconcileOutcome::Duplicate)
    );
}

#[test]
fn test_default_device_change_is_followed() {
    let mut rig = rig(Settings::default());

    rig.controller.set_default(Some(DAC));
    rig.engine.process_entries(&[lines::CAPS_96]);

    assert_eq!(rig.controller.writes(), vec![(DAC, rate(96000))]);
}

#[test]
fn test_no_output_device_skips_but_remembers_candidate() {
    let mut rig = rig(Settings::default());
    rig.controller.set_default(None);

    assert_eq!(
        rig.engine.process_entries(&[lines::QUEUE_48]),
        Some(ReconcileOutcome::NoDevice)
    );

    rig.controller.set_default(Some(SPEAKERS));
    assert_eq!(
        rig.engine.process_entries(&[lines::QUEUE_48]),
        Some(ReconcileOutcome::Duplicate)
    );
    assert!(rig.controller.writes().is_empty());
}

#[test]
fn test_losing_every_device_clears_description() {
    let mut rig = rig(Settings::default());
    assert_eq!(
        rig.engine.snapshot().active_device_name.as_deref(),
        Some("MacBook Pro Speakers")
    );

    rig.controller.set_default(None);
    rig.engine.update_current_state();

    let state = rig.engine.snapshot();
    assert_eq!(state.active_device_name, None);
    assert_eq!(state.current_sample_rate, None);
    assert_eq!(state.bit_depth, None);
    assert!(state.supported_rates.is_empty());
}

// ============================================================================
// FAILURES
// ============================================================================

#[test]
fn test_rejected_rate_is_recorded_as_failure() {
    let mut rig = rig(notifying());
    rig.controller.reject(SPEAKERS, rate(192000));

    let outcome = rig.engine.process_entries(&[lines::OUTPUT_192]);

    let Some(ReconcileOutcome::Failed(event)) = &outcome else {
        panic!("expected failure, got {:?}", outcome);
    };
    assert!(!event.success);
    assert_eq!(event.to_rate, rate(192000));

    let state = rig.engine.snapshot();
    assert_eq!(state.current_sample_rate, Some(rate(44100)));
    assert_eq!(state.total_switches, 0);
    assert_eq!(state.last_error.as_deref(), Some("Failed to set 192.0 kHz"));
    assert!(rig.notifier.bodies().is_empty());
}

#[test]
fn test_next_success_clears_failure() {
    let mut rig = rig(Settings::default());
    rig.controller.reject(SPEAKERS, rate(192000));

    rig.engine.process_entries(&[lines::OUTPUT_192]);
    rig.engine.process_entries(&[lines::OUTPUT_192]);
    assert_eq!(rig.controller.writes().len(), 1);

    rig.engine.process_entries(&[lines::QUEUE_48]);

    let state = rig.engine.snapshot();
    assert_eq!(state.last_error, None);
    assert_eq!(state.history.len(), 2);
    assert!(state.history.latest().unwrap().success);
}

#[test]
fn test_log_failure_does_not_hide_write_failure() {
    let mut rig = rig(Settings::default());

    rig.engine
        .record_log_failure(&LogSourceError::AccessDenied("Operation not permitted".to_string()));
    assert!(rig
        .engine
        .snapshot()
        .last_error
        .unwrap()
        .contains("Operation not permitted"));

    rig.controller.reject(SPEAKERS, rate(96000));
    rig.engine.record_log_success();
    rig.engine.process_entries(&[lines::CAPS_96]);
    rig.engine.record_log_success();

    assert_eq!(
        rig.engine.snapshot().last_error.as_deref(),
        Some("Failed to set 96.0 kHz")
    );
}

// ============================================================================
// HISTORY
// ============================================================================

#[test]
fn test_history_keeps_newest_events() {
    let mut rig = rig(Settings::default());
    let cycle = [48000, 96000, 44100, 88200, 192000];

    for i in 0..(DEFAULT_HISTORY_CAPACITY + 5) {
        rig.engine.observe_candidate(rate(cycle[i % cycle.len()]));
    }

    let state = rig.engine.snapshot();
    assert_eq!(state.history.len(), DEFAULT_HISTORY_CAPACITY);
    assert_eq!(state.total_switches, (DEFAULT_HISTORY_CAPACITY + 5) as u64);

    let events: Vec<_> = state.history.iter().collect();
    assert_eq!(events[0].to_rate, rate(192000));
    assert!(events
        .windows(2)
        .all(|pair| pair[0].timestamp >= pair[1].timestamp));
}
