//! PureRate platform adapters
//!
//! Concrete implementations of the device, log and notification ports
//! declared in `purerate-core`.

pub mod audio;
pub mod logs;
pub mod notifier;

pub use audio::{platform_controller, CpalController};
pub use logs::UnifiedLogSource;
pub use notifier::{LogNotifier, OsascriptNotifier};
