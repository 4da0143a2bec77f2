//! Notification delivery

use purerate_core::domain::notifier::Notifier;
use std::process::{Command, Stdio};
use tracing::{info, warn};

/// Posts macOS user notifications through `osascript`
#[derive(Debug, Default, Clone, Copy)]
pub struct OsascriptNotifier;

impl OsascriptNotifier {
    /// AppleScript that displays a notification
    pub fn script(title: &str, body: &str) -> String {
        format!(
            "display notification \"{}\" with title \"{}\"",
            escape(body),
            escape(title)
        )
    }
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

impl Notifier for OsascriptNotifier {
    fn notify(&self, title: &str, body: &str) {
        let spawned = Command::new("osascript")
            .arg("-e")
            .arg(Self::script(title, body))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        // Reaped on a detached thread so the caller never waits on delivery
        match spawned {
            Ok(mut child) => {
                std::thread::spawn(move || {
                    let _ = child.wait();
                });
            }
            Err(e) => warn!(error = %e, "Failed to post notification"),
        }
    }
}

/// Writes notices to the tracing log instead of the desktop
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: &str) {
        info!(title, "{}", body);
    }
}
