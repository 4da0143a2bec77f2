//! User-facing notification of successful switches

use crate::domain::audio::SampleRate;

/// Title used for switch notifications
pub const NOTIFICATION_TITLE: &str = "PureRate";

/// Delivers a short notice to the user. Best-effort: delivery failures are
/// the implementation's concern and never reach the caller.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str);
}

/// Body of the notice sent after a successful switch
pub fn switch_message(rate: SampleRate, device_name: Option<&str>) -> String {
    format!(
        "Switched to {:.1} kHz on {}",
        rate.khz(),
        device_name.unwrap_or("device")
    )
}

/// Notifier that drops every notice
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentNotifier;

impl Notifier for SilentNotifier {
    fn notify(&self, _title: &str, _body: &str) {}
}
