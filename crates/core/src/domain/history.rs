//! Record of reconciliation attempts

use crate::domain::audio::SampleRate;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of events kept
pub const DEFAULT_HISTORY_CAPACITY: usize = 30;

/// One attempt to switch the hardware rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateChangeEvent {
    pub timestamp: DateTime<Utc>,
    /// Hardware rate before the attempt, if it could be read
    pub from_rate: Option<SampleRate>,
    pub to_rate: SampleRate,
    pub device_name: Option<String>,
    pub success: bool,
}

impl RateChangeEvent {
    pub fn new(
        from_rate: Option<SampleRate>,
        to_rate: SampleRate,
        device_name: Option<String>,
        success: bool,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            from_rate,
            to_rate,
            device_name,
            success,
        }
    }
}

/// Bounded list of events, newest first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateHistory {
    events: VecDeque<RateChangeEvent>,
    capacity: usize,
}

impl RateHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Insert at the front, dropping the oldest event past capacity
    pub fn record(&mut self, event: RateChangeEvent) {
        self.events.push_front(event);
        self.events.truncate(self.capacity);
    }

    pub fn latest(&self) -> Option<&RateChangeEvent> {
        self.events.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RateChangeEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for RateHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}
