//! Log source abstraction
//!
//! The monitor never reads the system log itself; it asks a [`LogSource`] for
//! the messages of a trailing window matching a [`LogQuery`].

use crate::domain::config::MonitorConfig;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while reading diagnostics
#[derive(Debug, Error)]
pub enum LogSourceError {
    /// The reader process could not be started
    #[error("Failed to launch log reader: {0}")]
    Spawn(#[from] std::io::Error),

    /// The backend refused access to the log store
    #[error("Access to the system log was denied: {0}")]
    AccessDenied(String),

    /// The reader ran but reported failure
    #[error("Log reader exited with {status}: {stderr}")]
    Exited { status: String, stderr: String },

    /// Output could not be decoded
    #[error("Malformed log output: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, LogSourceError>;

/// Which messages to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    /// How far back from now to read
    pub window: Duration,
    /// Exact subsystem names
    pub subsystems: Vec<String>,
    /// Subsystem name prefixes
    pub subsystem_prefixes: Vec<String>,
    /// Emitting process, if restricted
    pub process: Option<String>,
}

impl LogQuery {
    /// Render the query as a unified-log predicate.
    ///
    /// Returns an empty string when the query has no filter at all.
    pub fn predicate(&self) -> String {
        let subsystem_terms: Vec<String> = self
            .subsystems
            .iter()
            .map(|s| format!("subsystem == '{}'", escape(s)))
            .chain(
                self.subsystem_prefixes
                    .iter()
                    .map(|p| format!("subsystem BEGINSWITH '{}'", escape(p))),
            )
            .collect();

        let process_term = self
            .process
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(|p| format!("process == '{}'", escape(p)));

        match (subsystem_terms.is_empty(), process_term) {
            (true, None) => String::new(),
            (true, Some(process)) => process,
            (false, None) => subsystem_terms.join(" OR "),
            (false, Some(process)) => format!("({}) AND {}", subsystem_terms.join(" OR "), process),
        }
    }
}

impl From<&MonitorConfig> for LogQuery {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            window: Duration::from_secs(config.log_window_secs),
            subsystems: config.subsystems.clone(),
            subsystem_prefixes: config.subsystem_prefixes.clone(),
            process: config.process.clone(),
        }
    }
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Source of raw diagnostic messages
///
/// Implementations block; the monitor calls them from a blocking worker.
pub trait LogSource: Send + Sync {
    /// Messages in the query window, oldest first
    fn fetch(&self, query: &LogQuery) -> Result<Vec<String>>;
}
