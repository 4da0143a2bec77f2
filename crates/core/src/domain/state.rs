//! Observable monitoring state
//!
//! [`MonitorState`] is the snapshot handed to observers. It is only ever
//! changed through [`MonitorState::apply`], so every transition is a named
//! [`StateChange`] that can be logged and tested in isolation.

use crate::domain::audio::{AudioDevice, DeviceCapabilities, SampleRate};
use crate::domain::history::{RateChangeEvent, RateHistory};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Snapshot of what the monitor currently knows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorState {
    pub current_sample_rate: Option<SampleRate>,
    pub active_device_name: Option<String>,
    pub bit_depth: Option<u32>,
    pub supported_rates: BTreeSet<SampleRate>,
    pub available_devices: Vec<AudioDevice>,
    pub monitoring_active: bool,
    pub last_error: Option<String>,
    /// Successful hardware switches since start
    pub total_switches: u64,
    pub history: RateHistory,
}

impl MonitorState {
    pub fn with_history_capacity(capacity: usize) -> Self {
        Self {
            history: RateHistory::with_capacity(capacity),
            ..Self::default()
        }
    }

    pub fn apply(&mut self, change: StateChange) {
        match change {
            StateChange::DevicesListed(devices) => {
                self.available_devices = devices;
            }
            StateChange::DeviceResolved { name, capabilities } => {
                self.active_device_name = name;
                self.current_sample_rate = capabilities.nominal_rate;
                self.bit_depth = capabilities.bit_depth;
                self.supported_rates = capabilities.supported_rates;
            }
            StateChange::DeviceNamed(name) => {
                self.active_device_name = name;
            }
            StateChange::RateSynced { rate, bit_depth } => {
                self.current_sample_rate = Some(rate);
                self.bit_depth = bit_depth;
            }
            StateChange::SwitchSucceeded { event, bit_depth } => {
                self.current_sample_rate = Some(event.to_rate);
                self.bit_depth = bit_depth;
                self.total_switches += 1;
                self.last_error = None;
                self.history.record(event);
            }
            StateChange::SwitchFailed { event, message } => {
                self.last_error = Some(message);
                self.history.record(event);
            }
            StateChange::MonitoringActive(active) => {
                self.monitoring_active = active;
            }
            StateChange::ErrorRaised(message) => {
                self.last_error = Some(message);
            }
            StateChange::ErrorCleared => {
                self.last_error = None;
            }
        }
    }
}

/// A single transition of [`MonitorState`]
#[derive(Debug, Clone)]
pub enum StateChange {
    /// Device list replaced wholesale
    DevicesListed(Vec<AudioDevice>),
    /// Target device re-resolved outside the candidate path
    DeviceResolved {
        name: Option<String>,
        capabilities: DeviceCapabilities,
    },
    DeviceNamed(Option<String>),
    /// Candidate already matched the hardware
    RateSynced {
        rate: SampleRate,
        bit_depth: Option<u32>,
    },
    SwitchSucceeded {
        event: RateChangeEvent,
        bit_depth: Option<u32>,
    },
    SwitchFailed {
        event: RateChangeEvent,
        message: String,
    },
    MonitoringActive(bool),
    ErrorRaised(String),
    ErrorCleared,
}
