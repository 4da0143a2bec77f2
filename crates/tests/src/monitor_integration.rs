//! Monitor lifecycle and settings tests
//!
//! The polling loop runs for real here, against a scripted log source and a
//! fake host, with a short interval.

use crate::fakes::{lines, FakeController, MemoryStore, RecordingNotifier, ScriptedLogSource, DAC};
use purerate_core::domain::logs::LogSourceError;
use purerate_core::domain::{
    Command, CommandExecutor, CommandResult, ConfigManager, Monitor, MonitorConfig, MonitorState,
    ReconcileOutcome, ReconciliationEngine, SampleRate, Settings, SettingsStore,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;

struct Rig {
    controller: Arc<FakeController>,
    source: Arc<ScriptedLogSource>,
    notifier: Arc<RecordingNotifier>,
    monitor: Monitor,
}

fn fast() -> MonitorConfig {
    MonitorConfig {
        poll_interval_ms: 100,
        ..MonitorConfig::default()
    }
}

fn rig_with_store(settings: Settings, store: Arc<dyn SettingsStore>) -> Rig {
    let controller = Arc::new(FakeController::studio());
    let source = Arc::new(ScriptedLogSource::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let config = fast();

    let engine = ReconciliationEngine::new(
        controller.clone(),
        notifier.clone(),
        &settings,
        config.history_capacity,
    );
    let monitor = Monitor::new(engine, source.clone(), store, settings, &config);

    Rig {
        controller,
        source,
        notifier,
        monitor,
    }
}

fn rig(settings: Settings) -> Rig {
    rig_with_store(settings, Arc::new(MemoryStore::default()))
}

async fn wait_until(
    rx: &mut watch::Receiver<MonitorState>,
    condition: impl FnMut(&MonitorState) -> bool,
) -> bool {
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(condition))
        .await
        .is_ok_and(|r| r.is_ok())
}

fn rate(hz: u32) -> SampleRate {
    SampleRate::from_hz(hz)
}

// ============================================================================
// POLLING LOOP
// ============================================================================

#[tokio::test]
async fn test_loop_switches_on_new_track() {
    let rig = rig(Settings {
        notifications_enabled: true,
        ..Settings::default()
    });
    rig.source.push_lines(&[lines::NOISE]);
    rig.source.push_lines(&[lines::CAPS_96]);
    let mut rx = rig.monitor.subscribe();

    rig.monitor.start().await;
    let switched = wait_until(&mut rx, |s| s.total_switches == 1).await;
    rig.monitor.shutdown().await;

    assert!(switched);
    let state = rig.monitor.snapshot();
    assert_eq!(state.current_sample_rate, Some(rate(96000)));
    assert!(!state.monitoring_active);
    assert_eq!(rig.notifier.bodies().len(), 1);
}

#[tokio::test]
async fn test_loop_does_not_repeat_switches() {
    let rig = rig(Settings::default());
    for _ in 0..4 {
        rig.source.push_lines(&[lines::QUEUE_48]);
    }
    let mut rx = rig.monitor.subscribe();

    rig.monitor.enable().await;
    let drained = {
        let source = rig.source.clone();
        tokio::time::timeout(Duration::from_secs(5), async move {
            while source.fetches() < 5 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .is_ok()
    };
    assert!(wait_until(&mut rx, |s| s.total_switches >= 1).await);
    rig.monitor.disable().await;

    assert!(drained);
    assert_eq!(rig.controller.writes().len(), 1);
    assert_eq!(rig.monitor.snapshot().total_switches, 1);
}

#[tokio::test]
async fn test_disabled_monitor_does_not_poll() {
    let rig = rig(Settings {
        enabled: false,
        ..Settings::default()
    });
    rig.source.push_lines(&[lines::QUEUE_48]);

    rig.monitor.start().await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(rig.source.fetches(), 0);
    assert!(rig.controller.writes().is_empty());
    assert!(!rig.monitor.snapshot().monitoring_active);
}

#[tokio::test]
async fn test_log_errors_surface_and_recover() {
    let rig = rig(Settings::default());
    rig.source
        .push(Err(LogSourceError::AccessDenied("Operation not permitted".to_string())));

    assert_eq!(rig.monitor.poll_once().await, None);
    assert!(rig.monitor.snapshot().last_error.is_some());

    rig.source.push_lines(&[lines::QUEUE_48]);
    let outcome = rig.monitor.poll_once().await;

    assert!(matches!(outcome, Some(ReconcileOutcome::Switched(_))));
    assert_eq!(rig.monitor.snapshot().last_error, None);
}

// ============================================================================
// COMMANDS AND SETTINGS
// ============================================================================

#[tokio::test]
async fn test_toggle_monitoring_by_command() {
    let store = Arc::new(MemoryStore::default());
    let rig = rig_with_store(Settings::default(), store.clone());

    rig.monitor.start().await;
    assert!(rig.monitor.snapshot().monitoring_active);

    let result = rig.monitor.execute(Command::SetEnabled(false)).await;
    assert_eq!(result, CommandResult::EnabledChanged(false));
    assert!(!rig.monitor.is_running());
    assert!(!rig.monitor.snapshot().monitoring_active);
    assert!(!store.saved().unwrap().enabled);

    rig.monitor.execute(Command::SetEnabled(true)).await;
    assert!(rig.monitor.is_running());
    assert!(store.saved().unwrap().enabled);

    rig.monitor.shutdown().await;
}

#[tokio::test]
async fn test_target_command_redirects_switches() {
    let rig = rig(Settings::default());

    let result = rig.monitor.execute(Command::SetTargetDevice(Some(DAC))).await;
    assert_eq!(result, CommandResult::TargetDeviceChanged(Some(DAC)));
    assert_eq!(
        rig.monitor.snapshot().active_device_name.as_deref(),
        Some("USB DAC")
    );

    rig.source.push_lines(&[lines::OUTPUT_192]);
    rig.monitor.poll_once().await;

    assert_eq!(rig.controller.writes(), vec![(DAC, rate(192000))]);
}

#[tokio::test]
async fn test_settings_round_trip_through_config_file() {
    let dir = TempDir::new().unwrap();
    let manager = Arc::new(ConfigManager::new(dir.path().to_path_buf()));
    let initial = manager.load().await;
    let rig = rig_with_store(initial.settings.clone(), manager.clone());

    rig.monitor
        .execute(Command::SetNotificationsEnabled(true))
        .await;
    rig.monitor
        .execute(Command::SetTargetDevice(Some(DAC)))
        .await;

    let reloaded = ConfigManager::new(dir.path().to_path_buf()).load().await;
    assert!(reloaded.settings.notifications_enabled);
    assert_eq!(reloaded.settings.target_device_id, Some(DAC));
    assert_eq!(reloaded.monitor, initial.monitor);
}

#[tokio::test]
async fn test_external_edit_is_applied() {
    let dir = TempDir::new().unwrap();
    let manager = Arc::new(ConfigManager::new(dir.path().to_path_buf()));
    manager.load().await;
    let rig = rig_with_store(Settings::default(), manager.clone());
    rig.monitor.start().await;

    let edited = Settings {
        enabled: false,
        notifications_enabled: true,
        target_device_id: Some(DAC),
    };
    manager.save_settings(&edited).await.unwrap();

    let from_disk = manager.load_settings().await.unwrap();
    let result = rig.monitor.execute(Command::ApplySettings(from_disk)).await;

    assert_eq!(result, CommandResult::SettingsApplied);
    assert_eq!(rig.monitor.settings().await, edited);
    assert!(!rig.monitor.is_running());

    let state = rig.monitor.snapshot();
    assert!(!state.monitoring_active);
    assert_eq!(state.active_device_name.as_deref(), Some("USB DAC"));
}

#[tokio::test]
async fn test_refresh_devices_command() {
    let rig = rig(Settings::default());

    let result = rig.monitor.execute(Command::RefreshDevices).await;

    assert_eq!(result, CommandResult::DevicesRefreshed(2));
    let names: Vec<String> = rig
        .monitor
        .snapshot()
        .available_devices
        .into_iter()
        .map(|d| d.name)
        .collect();
    assert_eq!(names, ["MacBook Pro Speakers", "USB DAC"]);
}
