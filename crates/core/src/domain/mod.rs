//! Domain entities and business rules

pub mod audio;
pub mod config;
pub mod engine;
pub mod history;
pub mod logs;
pub mod monitor;
pub mod notifier;
pub mod parser;
pub mod state;

// Re-export specific items to avoid ambiguous glob imports
pub use audio::{
    AudioDevice, AudioError, DeviceCapabilities, DeviceController, DeviceId, RateClass, RateRange,
    SampleRate,
};
pub use config::*;
pub use engine::{ReconcileOutcome, ReconciliationEngine};
pub use history::{RateChangeEvent, RateHistory};
pub use logs::{LogQuery, LogSource, LogSourceError};
pub use monitor::Monitor;
pub use notifier::{Notifier, SilentNotifier};
pub use parser::{extract_candidate_rate, RateMatch};
pub use state::{MonitorState, StateChange};
