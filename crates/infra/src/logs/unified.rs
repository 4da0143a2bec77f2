//! macOS unified-log reader
//!
//! Shells out to `log show` for the trailing window and keeps the message
//! text of each NDJSON record.

use purerate_core::domain::logs::{LogQuery, LogSource, LogSourceError, Result};
use serde::Deserialize;
use std::process::Command;
use tracing::{debug, trace};

const LOG_BINARY: &str = "/usr/bin/log";

/// One record of `log show --style ndjson`
#[derive(Debug, Deserialize)]
struct LogRecord {
    #[serde(rename = "eventMessage", default)]
    event_message: Option<String>,
}

/// Reads the unified log through the `log` command-line tool
#[derive(Debug, Clone)]
pub struct UnifiedLogSource {
    binary: String,
}

impl Default for UnifiedLogSource {
    fn default() -> Self {
        Self::new()
    }
}

impl UnifiedLogSource {
    pub fn new() -> Self {
        Self {
            binary: LOG_BINARY.to_string(),
        }
    }

    /// Use a different `log` executable
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Arguments passed to `log` for a query
    pub fn arguments(query: &LogQuery) -> Vec<String> {
        let seconds = query.window.as_secs().max(1);
        let mut args = vec![
            "show".to_string(),
            "--last".to_string(),
            format!("{}s", seconds),
            "--style".to_string(),
            "ndjson".to_string(),
        ];

        let predicate = query.predicate();
        if !predicate.is_empty() {
            args.push("--predicate".to_string());
            args.push(predicate);
        }

        args
    }
}

/// Extract event messages from NDJSON output, oldest first.
///
/// Lines that are not JSON objects (banners, blank lines) are skipped; an
/// object that fails to decode is an error.
pub fn parse_ndjson(output: &str) -> Result<Vec<String>> {
    let mut messages = Vec::new();

    for line in output.lines() {
        let line = line.trim();
        if !line.starts_with('{') {
            if !line.is_empty() {
                trace!(line, "Skipping non-record line");
            }
            continue;
        }

        let record: LogRecord =
            serde_json::from_str(line).map_err(|e| LogSourceError::Malformed(e.to_string()))?;
        if let Some(message) = record.event_message {
            messages.push(message);
        }
    }

    Ok(messages)
}

fn is_access_denied(stderr: &str) -> bool {
    let stderr = stderr.to_ascii_lowercase();
    stderr.contains("not permitted") || stderr.contains("must be admin")
}

impl LogSource for UnifiedLogSource {
    fn fetch(&self, query: &LogQuery) -> Result<Vec<String>> {
        let output = Command::new(&self.binary)
            .args(Self::arguments(query))
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if is_access_denied(&stderr) {
                return Err(LogSourceError::AccessDenied(stderr));
            }
            return Err(LogSourceError::Exited {
                status: output.status.to_string(),
                stderr,
            });
        }

        let messages = parse_ndjson(&String::from_utf8_lossy(&output.stdout))?;
        debug!(count = messages.len(), "Read log window");
        Ok(messages)
    }
}
