//! Reconciliation of candidate rates against the hardware
//!
//! The engine is the single writer of [`MonitorState`]. It receives candidate
//! rates (usually from a batch of log entries), suppresses repeats of the last
//! candidate it acted on, and drives the [`DeviceController`] when the
//! hardware disagrees. Observers read snapshots through a `watch` channel.

use crate::domain::audio::{DeviceCapabilities, DeviceController, DeviceId, SampleRate};
use crate::domain::config::Settings;
use crate::domain::history::RateChangeEvent;
use crate::domain::logs::LogSourceError;
use crate::domain::notifier::{switch_message, Notifier, NOTIFICATION_TITLE};
use crate::domain::parser;
use crate::domain::state::{MonitorState, StateChange};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// What a reconciliation step did
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// Candidate equals the last one acted on
    Duplicate,
    /// Neither a target nor a default output device could be resolved
    NoDevice,
    /// Hardware already runs at the candidate rate
    InSync,
    Switched(RateChangeEvent),
    Failed(RateChangeEvent),
}

/// Where the current `last_error` came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorOrigin {
    LogSource,
    RateWrite,
}

pub struct ReconciliationEngine {
    controller: Arc<dyn DeviceController>,
    notifier: Arc<dyn Notifier>,
    state: watch::Sender<MonitorState>,
    last_observed_rate: Option<SampleRate>,
    target_device: Option<DeviceId>,
    notifications_enabled: bool,
    error_origin: Option<ErrorOrigin>,
}

impl ReconciliationEngine {
    /// Create an engine and resolve the initial device state
    pub fn new(
        controller: Arc<dyn DeviceController>,
        notifier: Arc<dyn Notifier>,
        settings: &Settings,
        history_capacity: usize,
    ) -> Self {
        let (state, _) = watch::channel(MonitorState::with_history_capacity(history_capacity));

        let mut engine = Self {
            controller,
            notifier,
            state,
            last_observed_rate: None,
            target_device: settings.target_device_id,
            notifications_enabled: settings.notifications_enabled,
            error_origin: None,
        };

        engine.refresh_devices();
        engine.update_current_state();
        engine
    }

    /// Receive every future state change
    pub fn subscribe(&self) -> watch::Receiver<MonitorState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> MonitorState {
        self.state.borrow().clone()
    }

    pub fn last_observed_rate(&self) -> Option<SampleRate> {
        self.last_observed_rate
    }

    pub fn target_device(&self) -> Option<DeviceId> {
        self.target_device
    }

    /// Explicit target, else the system default output
    pub fn resolve_device(&self) -> Option<DeviceId> {
        self.target_device
            .or_else(|| self.controller.default_output_device())
    }

    /// Parse a batch of log entries and reconcile its candidate, if any
    pub fn process_entries<S: AsRef<str>>(&mut self, entries: &[S]) -> Option<ReconcileOutcome> {
        let candidate = parser::extract_candidate_rate(entries)?;
        Some(self.observe_candidate(candidate))
    }

    /// Debounce a candidate and apply it when it is new
    pub fn observe_candidate(&mut self, rate: SampleRate) -> ReconcileOutcome {
        if self.last_observed_rate == Some(rate) {
            debug!(rate = rate.hz(), "Candidate already handled");
            return ReconcileOutcome::Duplicate;
        }

        self.last_observed_rate = Some(rate);
        self.apply_rate(rate)
    }

    fn apply_rate(&mut self, rate: SampleRate) -> ReconcileOutcome {
        let Some(device) = self.resolve_device() else {
            warn!(rate = rate.hz(), "No output device to reconcile");
            return ReconcileOutcome::NoDevice;
        };

        let current = self.controller.nominal_rate(device);
        let name = self.controller.name(device);
        self.update(StateChange::DeviceNamed(name.clone()));

        if current == Some(rate) {
            debug!(rate = rate.hz(), %device, "Hardware already at candidate rate");
            let bit_depth = self.controller.bit_depth(device);
            self.update(StateChange::RateSynced { rate, bit_depth });
            return ReconcileOutcome::InSync;
        }

        info!(
            from = current.map(|r| r.hz()),
            to = rate.hz(),
            device = name.as_deref().unwrap_or("unknown"),
            "Switching sample rate"
        );

        let success = self.controller.set_nominal_rate(device, rate);
        let event = RateChangeEvent::new(current, rate, name.clone(), success);

        if success {
            let bit_depth = self.controller.bit_depth(device);
            self.error_origin = None;
            self.update(StateChange::SwitchSucceeded {
                event: event.clone(),
                bit_depth,
            });

            if self.notifications_enabled {
                self.notifier
                    .notify(NOTIFICATION_TITLE, &switch_message(rate, name.as_deref()));
            }

            ReconcileOutcome::Switched(event)
        } else {
            let message = format!("Failed to set {:.1} kHz", rate.khz());
            warn!(rate = rate.hz(), %device, "{}", message);
            self.error_origin = Some(ErrorOrigin::RateWrite);
            self.update(StateChange::SwitchFailed {
                event: event.clone(),
                message,
            });

            ReconcileOutcome::Failed(event)
        }
    }

    /// Re-enumerate output devices. Returns how many were found.
    pub fn refresh_devices(&mut self) -> usize {
        let devices = self.controller.list_output_devices();
        let count = devices.len();
        debug!(count, "Refreshed output devices");
        self.update(StateChange::DevicesListed(devices));
        count
    }

    /// Re-read name, rate and capabilities of the resolved device
    pub fn update_current_state(&mut self) {
        let Some(device) = self.resolve_device() else {
            debug!("No output device to describe");
            self.update(StateChange::DeviceResolved {
                name: None,
                capabilities: DeviceCapabilities::default(),
            });
            return;
        };

        let name = self.controller.name(device);
        let capabilities = self.controller.capabilities(device);
        self.update(StateChange::DeviceResolved { name, capabilities });
    }

    pub fn set_target_device(&mut self, target: Option<DeviceId>) {
        info!(target = ?target.map(|d| d.as_u32()), "Target device changed");
        self.target_device = target;
        self.update_current_state();
    }

    pub fn set_notifications_enabled(&mut self, enabled: bool) {
        self.notifications_enabled = enabled;
    }

    pub fn set_monitoring_active(&mut self, active: bool) {
        self.update(StateChange::MonitoringActive(active));
    }

    pub fn record_log_failure(&mut self, error: &LogSourceError) {
        self.error_origin = Some(ErrorOrigin::LogSource);
        self.update(StateChange::ErrorRaised(error.to_string()));
    }

    /// Clear an error left by an earlier log read; rate-write errors stay
    pub fn record_log_success(&mut self) {
        if self.error_origin == Some(ErrorOrigin::LogSource) {
            self.error_origin = None;
            self.update(StateChange::ErrorCleared);
        }
    }

    fn update(&self, change: StateChange) {
        self.state.send_modify(|state| state.apply(change));
    }
}
