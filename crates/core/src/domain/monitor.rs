//! Periodic log polling and runtime control
//!
//! A [`Monitor`] owns the [`ReconciliationEngine`] and drives it from a timer.
//! Each tick reads the trailing log window on a blocking worker and hands the
//! entries to the engine. A tick that finds the previous one still running is
//! skipped rather than queued.

use crate::domain::config::{
    Command, CommandExecutor, CommandResult, MonitorConfig, Settings, SettingsStore,
};
use crate::domain::engine::{ReconcileOutcome, ReconciliationEngine};
use crate::domain::logs::{LogQuery, LogSource};
use crate::domain::state::MonitorState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{self, JoinHandle};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// State shared between the monitor and its polling task
struct PollContext {
    engine: Mutex<ReconciliationEngine>,
    source: Arc<dyn LogSource>,
    query: LogQuery,
    in_flight: AtomicBool,
}

struct PollTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Releases the in-flight flag when a cycle ends, including on panic
struct CycleGuard<'a>(&'a AtomicBool);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Monitor {
    context: Arc<PollContext>,
    store: Arc<dyn SettingsStore>,
    settings: tokio::sync::Mutex<Settings>,
    poll_interval: Duration,
    state: watch::Receiver<MonitorState>,
    task: Mutex<Option<PollTask>>,
    /// Serializes enable/disable so the task slot and the active flag agree
    lifecycle: tokio::sync::Mutex<()>,
}

impl Monitor {
    pub fn new(
        engine: ReconciliationEngine,
        source: Arc<dyn LogSource>,
        store: Arc<dyn SettingsStore>,
        settings: Settings,
        config: &MonitorConfig,
    ) -> Self {
        let state = engine.subscribe();

        Self {
            context: Arc::new(PollContext {
                engine: Mutex::new(engine),
                source,
                query: LogQuery::from(config),
                in_flight: AtomicBool::new(false),
            }),
            store,
            settings: tokio::sync::Mutex::new(settings),
            poll_interval: config.poll_interval(),
            state,
            task: Mutex::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<MonitorState> {
        self.state.clone()
    }

    pub fn snapshot(&self) -> MonitorState {
        self.state.borrow().clone()
    }

    pub async fn settings(&self) -> Settings {
        self.settings.lock().await.clone()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.task).is_some()
    }

    /// Start polling if the persisted settings ask for it
    pub async fn start(&self) {
        if self.settings.lock().await.enabled {
            self.enable().await;
        } else {
            info!("Monitoring disabled in settings");
        }
    }

    /// Start the polling timer, then mark monitoring active. No-op when running.
    pub async fn enable(&self) {
        let _transition = self.lifecycle.lock().await;
        if self.is_running() {
            debug!("Monitor already running");
            return;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_poll_loop(
            Arc::clone(&self.context),
            self.poll_interval,
            shutdown_rx,
        ));
        *lock(&self.task) = Some(PollTask { shutdown, handle });

        self.with_engine(|engine| engine.set_monitoring_active(true))
            .await;
        info!(interval_ms = self.poll_interval.as_millis() as u64, "Monitoring started");
    }

    /// Stop the timer, wait for an in-flight tick, then mark monitoring inactive
    pub async fn disable(&self) {
        let _transition = self.lifecycle.lock().await;
        let task = lock(&self.task).take();

        if let Some(PollTask { shutdown, handle }) = task {
            let _ = shutdown.send(true);
            if let Err(e) = handle.await {
                error!(error = %e, "Polling task ended abnormally");
            }
            info!("Monitoring stopped");
        }

        self.with_engine(|engine| engine.set_monitoring_active(false))
            .await;
    }

    pub async fn shutdown(&self) {
        self.disable().await;
    }

    /// Run a single poll cycle outside the timer
    pub async fn poll_once(&self) -> Option<ReconcileOutcome> {
        poll_cycle(Arc::clone(&self.context)).await
    }

    async fn with_engine<T, F>(&self, f: F) -> Option<T>
    where
        F: FnOnce(&mut ReconciliationEngine) -> T + Send + 'static,
        T: Send + 'static,
    {
        let context = Arc::clone(&self.context);
        task::spawn_blocking(move || f(&mut lock(&context.engine)))
            .await
            .map_err(|e| error!(error = %e, "Engine task failed"))
            .ok()
    }

    async fn persist(&self, update: impl FnOnce(&mut Settings)) -> Result<(), String> {
        let snapshot = {
            let mut settings = self.settings.lock().await;
            update(&mut settings);
            settings.clone()
        };

        self.store.save_settings(&snapshot).await.map_err(|e| {
            warn!(error = %e, "Failed to persist settings");
            format!("Settings not saved: {}", e)
        })
    }

    async fn apply_settings(&self, new: Settings) {
        let old = std::mem::replace(&mut *self.settings.lock().await, new.clone());

        if old.notifications_enabled != new.notifications_enabled {
            let enabled = new.notifications_enabled;
            self.with_engine(move |engine| engine.set_notifications_enabled(enabled))
                .await;
        }

        if old.target_device_id != new.target_device_id {
            let target = new.target_device_id;
            self.with_engine(move |engine| engine.set_target_device(target))
                .await;
        }

        if new.enabled {
            self.enable().await;
        } else {
            self.disable().await;
        }
    }
}

#[async_trait::async_trait]
impl CommandExecutor for Monitor {
    async fn execute(&self, command: Command) -> CommandResult {
        debug!(?command, "Executing command");

        match command {
            Command::SetEnabled(enabled) => {
                if enabled {
                    self.enable().await;
                } else {
                    self.disable().await;
                }
                match self.persist(|s| s.enabled = enabled).await {
                    Ok(()) => CommandResult::EnabledChanged(enabled),
                    Err(message) => CommandResult::Error(message),
                }
            }
            Command::SetNotificationsEnabled(enabled) => {
                self.with_engine(move |engine| engine.set_notifications_enabled(enabled))
                    .await;
                match self.persist(|s| s.notifications_enabled = enabled).await {
                    Ok(()) => CommandResult::NotificationsChanged(enabled),
                    Err(message) => CommandResult::Error(message),
                }
            }
            Command::SetTargetDevice(target) => {
                self.with_engine(move |engine| engine.set_target_device(target))
                    .await;
                match self.persist(|s| s.target_device_id = target).await {
                    Ok(()) => CommandResult::TargetDeviceChanged(target),
                    Err(message) => CommandResult::Error(message),
                }
            }
            Command::RefreshDevices => {
                match self.with_engine(|engine| engine.refresh_devices()).await {
                    Some(count) => CommandResult::DevicesRefreshed(count),
                    None => CommandResult::Error("Device refresh failed".to_string()),
                }
            }
            Command::ApplySettings(settings) => {
                self.apply_settings(settings).await;
                CommandResult::SettingsApplied
            }
        }
    }
}

async fn run_poll_loop(
    context: Arc<PollContext>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                poll_cycle(Arc::clone(&context)).await;
            }
            _ = shutdown.changed() => {
                debug!("Polling loop received shutdown");
                break;
            }
        }
    }
}

async fn poll_cycle(context: Arc<PollContext>) -> Option<ReconcileOutcome> {
    if context
        .in_flight
        .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
        .is_err()
    {
        debug!("Previous poll cycle still running, skipping tick");
        return None;
    }

    let result = task::spawn_blocking(move || {
        let _guard = CycleGuard(&context.in_flight);

        match context.source.fetch(&context.query) {
            Ok(entries) => {
                let mut engine = lock(&context.engine);
                engine.record_log_success();
                engine.process_entries(&entries)
            }
            Err(e) => {
                warn!(error = %e, "Failed to read system log");
                lock(&context.engine).record_log_failure(&e);
                None
            }
        }
    })
    .await;

    match result {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(error = %e, "Poll cycle panicked");
            None
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
