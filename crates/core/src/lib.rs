//! PureRate core
//!
//! Sample-rate detection from playback diagnostics and reconciliation of the
//! output device's nominal rate. Platform access sits behind the traits in
//! [`domain::audio`], [`domain::logs`] and [`domain::notifier`].

pub mod domain;

pub use domain::{Monitor, MonitorState, ReconciliationEngine};
