//! Cross-crate scenario tests for PureRate
//!
//! Everything here runs against in-memory fakes of the device, log and
//! notification ports; no audio hardware or system log is touched.


#[cfg(test)]
mod reconciliation_integration;

#[cfg(test)]
mod monitor_integration;
