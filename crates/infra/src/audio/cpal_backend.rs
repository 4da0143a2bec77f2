//! CPAL-based device controller
//!
//! Portable, read-only view of the output devices. CPAL reports the format a
//! device would open with rather than the hardware's nominal rate, and it has
//! no way to change that rate, so writes return [`AudioError::Unsupported`].
//! Device handles are positions in the host's output enumeration and are only
//! stable while the device list does not change.

use cpal::traits::{DeviceTrait, HostTrait};
use purerate_core::domain::audio::{
    AudioDevice, AudioError, DeviceController, DeviceId, RateRange, Result, SampleRate,
};
use tracing::{debug, info};

/// CPAL-based controller over the default host
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalController;

impl CpalController {
    pub fn new() -> Self {
        info!(host = ?cpal::default_host().id(), "Initializing CPAL controller");
        Self
    }

    fn output_devices(&self) -> Result<Vec<cpal::Device>> {
        cpal::default_host()
            .output_devices()
            .map(|devices| devices.collect())
            .map_err(|e| AudioError::OsError(e.to_string()))
    }

    fn device(&self, id: DeviceId) -> Result<cpal::Device> {
        self.output_devices()?
            .into_iter()
            .nth(id.as_u32() as usize)
            .ok_or_else(|| AudioError::DeviceNotFound(id.to_string()))
    }

    fn default_config(&self, id: DeviceId) -> Result<cpal::SupportedStreamConfig> {
        self.device(id)?
            .default_output_config()
            .map_err(|e| AudioError::OsError(e.to_string()))
    }
}

fn device_name(device: &cpal::Device) -> Option<String> {
    #[allow(deprecated)]
    device.name().ok()
}

/// Devices with a resolvable name, keyed by their enumeration position
fn named_outputs<I>(names: I) -> Vec<AudioDevice>
where
    I: IntoIterator<Item = Option<String>>,
{
    names
        .into_iter()
        .enumerate()
        .filter_map(|(index, name)| {
            name.map(|name| AudioDevice {
                id: DeviceId::new(index as u32),
                name,
            })
        })
        .collect()
}

impl DeviceController for CpalController {
    fn query_default_output(&self) -> Result<DeviceId> {
        let default = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| AudioError::DeviceNotFound("No default output device".to_string()))?;
        let default_name = device_name(&default);

        self.output_devices()?
            .iter()
            .position(|device| device_name(device) == default_name)
            .map(|index| DeviceId::new(index as u32))
            .ok_or_else(|| {
                AudioError::DeviceNotFound("Default output not in device list".to_string())
            })
    }

    fn query_output_devices(&self) -> Result<Vec<AudioDevice>> {
        let devices = named_outputs(self.output_devices()?.iter().map(device_name));

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    fn query_name(&self, id: DeviceId) -> Result<String> {
        let device = self.device(id)?;
        #[allow(deprecated)]
        device.name().map_err(|e| AudioError::OsError(e.to_string()))
    }

    fn query_nominal_rate(&self, id: DeviceId) -> Result<SampleRate> {
        Ok(SampleRate::from_hz(self.default_config(id)?.sample_rate()))
    }

    fn write_nominal_rate(&self, _id: DeviceId, rate: SampleRate) -> Result<()> {
        Err(AudioError::Unsupported(format!(
            "CPAL cannot change the nominal rate (requested {})",
            rate
        )))
    }

    fn query_rate_ranges(&self, id: DeviceId) -> Result<Vec<RateRange>> {
        let configs = self
            .device(id)?
            .supported_output_configs()
            .map_err(|e| AudioError::OsError(e.to_string()))?;

        Ok(configs
            .map(|config| {
                RateRange::new(
                    config.min_sample_rate() as f64,
                    config.max_sample_rate() as f64,
                )
            })
            .collect())
    }

    fn query_bit_depth(&self, id: DeviceId) -> Result<u32> {
        let config = self.default_config(id)?;
        Ok(config.sample_format().sample_size() as u32 * 8)
    }
}
