//! Audio device abstractions and domain models
//!
//! This module defines the platform-agnostic view of output hardware: sample
//! rates, device handles, capability snapshots and the [`DeviceController`]
//! trait. Implementations for specific platforms (CoreAudio, cpal) live in the
//! `infra` crate.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur in the audio subsystem
#[derive(Debug, Error)]
pub enum AudioError {
    /// Requested audio device was not found
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// A hardware property query or write returned a non-zero status
    #[error("{operation} failed on device {device} (status {status})")]
    Status {
        operation: &'static str,
        device: u32,
        status: i32,
    },

    /// Device exposes no output streams
    #[error("Device {0} has no output streams")]
    NoOutputStreams(u32),

    /// Input/Output error at the OS level
    #[error("OS error: {0}")]
    OsError(String),

    /// Backend cannot perform the requested operation
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

pub type Result<T> = std::result::Result<T, AudioError>;

/// Opaque handle of an audio device (a CoreAudio `AudioObjectID` on macOS)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(u32);

impl DeviceId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Audio sample rate in whole Hz
///
/// Hardware and log text report rates as reals; they are rounded to the
/// nearest Hz so that equality and ordering are exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleRate(u32);

impl SampleRate {
    pub const fn from_hz(hz: u32) -> Self {
        Self(hz)
    }

    /// Build a rate from a real-valued reading. Non-finite, non-positive and
    /// out-of-range values are rejected.
    pub fn from_hz_f64(hz: f64) -> Option<Self> {
        if !hz.is_finite() || hz < 0.5 || hz > u32::MAX as f64 {
            return None;
        }
        Some(Self(hz.round() as u32))
    }

    pub fn hz(&self) -> u32 {
        self.0
    }

    pub fn as_f64(&self) -> f64 {
        self.0 as f64
    }

    pub fn khz(&self) -> f64 {
        self.0 as f64 / 1000.0
    }

    pub fn class(&self) -> RateClass {
        match self.0 {
            0..=48_000 => RateClass::Standard,
            48_001..=96_000 => RateClass::HiRes,
            _ => RateClass::UltraHiRes,
        }
    }
}

/// Compact form: `48 kHz`, `44.1 kHz`
impl fmt::Display for SampleRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 % 1000 == 0 {
            write!(f, "{} kHz", self.0 / 1000)
        } else {
            write!(f, "{:.1} kHz", self.khz())
        }
    }
}

/// Rough quality tier of a sample rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateClass {
    /// Up to 48 kHz
    Standard,
    /// Above 48 kHz, up to 96 kHz
    HiRes,
    /// Above 96 kHz
    UltraHiRes,
}

impl RateClass {
    pub fn label(&self) -> &'static str {
        match self {
            RateClass::Standard => "Lossless",
            RateClass::HiRes => "Hi-Res",
            RateClass::UltraHiRes => "Ultra Hi-Res",
        }
    }
}

/// Standard rates offered when a device declares a continuous range
pub const STANDARD_RATES: [u32; 15] = [
    8_000, 11_025, 16_000, 22_050, 32_000, 44_100, 48_000, 88_200, 96_000, 176_400, 192_000,
    352_800, 384_000, 705_600, 768_000,
];

/// Inclusive range of nominal rates declared by a device
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateRange {
    pub min: f64,
    pub max: f64,
}

impl RateRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn discrete(hz: f64) -> Self {
        Self { min: hz, max: hz }
    }

    pub fn is_discrete(&self) -> bool {
        self.min == self.max
    }

    pub fn contains(&self, hz: f64) -> bool {
        hz >= self.min && hz <= self.max
    }
}

/// Expand declared ranges into a concrete set of rates.
///
/// Discrete entries are taken as-is; continuous ranges contribute every
/// [`STANDARD_RATES`] value they contain.
pub fn rates_from_ranges(ranges: &[RateRange]) -> BTreeSet<SampleRate> {
    let mut rates = BTreeSet::new();

    for range in ranges {
        if range.is_discrete() {
            if let Some(rate) = SampleRate::from_hz_f64(range.min) {
                rates.insert(rate);
            }
        } else {
            rates.extend(
                STANDARD_RATES
                    .iter()
                    .filter(|&&hz| range.contains(hz as f64))
                    .map(|&hz| SampleRate::from_hz(hz)),
            );
        }
    }

    rates
}

/// An enumerated output device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioDevice {
    pub id: DeviceId,
    pub name: String,
}

/// Capability snapshot of a device, derived on demand
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    pub nominal_rate: Option<SampleRate>,
    pub supported_rates: BTreeSet<SampleRate>,
    pub bit_depth: Option<u32>,
}

/// Access to output hardware
///
/// Backends implement the `query_*`/`write_*` methods and report failures with
/// [`AudioError`]. Callers use the provided best-effort methods, which log the
/// failure and degrade to `None`, an empty set or `false`.
pub trait DeviceController: Send + Sync {
    /// System default output device
    fn query_default_output(&self) -> Result<DeviceId>;

    /// All devices with at least one output stream and a resolvable name
    fn query_output_devices(&self) -> Result<Vec<AudioDevice>>;

    fn query_name(&self, device: DeviceId) -> Result<String>;

    fn query_nominal_rate(&self, device: DeviceId) -> Result<SampleRate>;

    fn write_nominal_rate(&self, device: DeviceId, rate: SampleRate) -> Result<()>;

    /// Raw `[min, max]` ranges as declared by the hardware
    fn query_rate_ranges(&self, device: DeviceId) -> Result<Vec<RateRange>>;

    /// Physical bit depth of the first output stream
    fn query_bit_depth(&self, device: DeviceId) -> Result<u32>;

    fn default_output_device(&self) -> Option<DeviceId> {
        self.query_default_output()
            .map_err(|e| warn!(error = %e, "Failed to resolve default output device"))
            .ok()
    }

    fn list_output_devices(&self) -> Vec<AudioDevice> {
        self.query_output_devices().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to enumerate output devices");
            Vec::new()
        })
    }

    fn name(&self, device: DeviceId) -> Option<String> {
        self.query_name(device)
            .map_err(|e| debug!(%device, error = %e, "Device name unavailable"))
            .ok()
    }

    fn nominal_rate(&self, device: DeviceId) -> Option<SampleRate> {
        self.query_nominal_rate(device)
            .map_err(|e| warn!(%device, error = %e, "Nominal rate unavailable"))
            .ok()
    }

    /// Returns `true` iff the hardware accepted the new rate
    fn set_nominal_rate(&self, device: DeviceId, rate: SampleRate) -> bool {
        match self.write_nominal_rate(device, rate) {
            Ok(()) => true,
            Err(e) => {
                warn!(%device, rate = rate.hz(), error = %e, "Hardware rejected nominal rate");
                false
            }
        }
    }

    fn supported_rates(&self, device: DeviceId) -> BTreeSet<SampleRate> {
        match self.query_rate_ranges(device) {
            Ok(ranges) => rates_from_ranges(&ranges),
            Err(e) => {
                debug!(%device, error = %e, "Supported rates unavailable");
                BTreeSet::new()
            }
        }
    }

    fn bit_depth(&self, device: DeviceId) -> Option<u32> {
        self.query_bit_depth(device)
            .map_err(|e| debug!(%device, error = %e, "Bit depth unavailable"))
            .ok()
    }

    fn capabilities(&self, device: DeviceId) -> DeviceCapabilities {
        DeviceCapabilities {
            nominal_rate: self.nominal_rate(device),
            supported_rates: self.supported_rates(device),
            bit_depth: self.bit_depth(device),
        }
    }
}
