//! CoreAudio device controller
//!
//! Reads and writes device properties through the HAL property API. Every
//! call is a synchronous round trip to the audio server, so callers keep these
//! off the async runtime.

use core_foundation::base::TCFType;
use core_foundation::string::{CFString, CFStringRef};
use coreaudio_sys::{
    kAudioDevicePropertyAvailableNominalSampleRates, kAudioDevicePropertyDeviceNameCFString,
    kAudioDevicePropertyNominalSampleRate, kAudioDevicePropertyStreams,
    kAudioHardwarePropertyDefaultOutputDevice, kAudioHardwarePropertyDevices,
    kAudioObjectPropertyElementMaster, kAudioObjectPropertyScopeGlobal,
    kAudioObjectPropertyScopeOutput, kAudioObjectSystemObject, kAudioStreamPropertyPhysicalFormat,
    AudioDeviceID, AudioObjectGetPropertyData, AudioObjectGetPropertyDataSize, AudioObjectID,
    AudioObjectPropertyAddress, AudioObjectPropertyScope, AudioObjectPropertySelector,
    AudioObjectSetPropertyData, AudioStreamBasicDescription, AudioStreamID, AudioValueRange,
    OSStatus,
};
use purerate_core::domain::audio::{
    AudioDevice, AudioError, DeviceController, DeviceId, RateRange, Result, SampleRate,
};
use std::{mem, ptr};
use tracing::{debug, info};

/// Controller backed by the CoreAudio HAL
#[derive(Debug, Default, Clone, Copy)]
pub struct CoreAudioController;

impl CoreAudioController {
    pub fn new() -> Self {
        info!("Initializing CoreAudio controller");
        Self
    }
}

fn address(
    selector: AudioObjectPropertySelector,
    scope: AudioObjectPropertyScope,
) -> AudioObjectPropertyAddress {
    AudioObjectPropertyAddress {
        mSelector: selector,
        mScope: scope,
        mElement: kAudioObjectPropertyElementMaster,
    }
}

fn check(status: OSStatus, operation: &'static str, object: AudioObjectID) -> Result<()> {
    if status == 0 {
        Ok(())
    } else {
        Err(AudioError::Status {
            operation,
            device: object,
            status,
        })
    }
}

/// Read a fixed-size property into `value`
fn read_property<T>(
    object: AudioObjectID,
    address: &AudioObjectPropertyAddress,
    operation: &'static str,
    value: &mut T,
) -> Result<()> {
    let mut size = mem::size_of::<T>() as u32;
    let status = unsafe {
        AudioObjectGetPropertyData(
            object,
            address as *const _,
            0,
            ptr::null(),
            &mut size as *mut _,
            value as *mut T as *mut _,
        )
    };
    check(status, operation, object)
}

/// Byte size of a variable-length property
fn property_size(
    object: AudioObjectID,
    address: &AudioObjectPropertyAddress,
    operation: &'static str,
) -> Result<u32> {
    let mut size: u32 = 0;
    let status = unsafe {
        AudioObjectGetPropertyDataSize(object, address as *const _, 0, ptr::null(), &mut size as *mut _)
    };
    check(status, operation, object)?;
    Ok(size)
}

/// Read an array property, filling a buffer of `zero` values
fn read_array<T: Clone>(
    object: AudioObjectID,
    address: &AudioObjectPropertyAddress,
    operation: &'static str,
    zero: T,
) -> Result<Vec<T>> {
    let size = property_size(object, address, operation)?;
    let count = size as usize / mem::size_of::<T>();
    if count == 0 {
        return Ok(Vec::new());
    }

    let mut items = vec![zero; count];
    let mut actual_size = size;
    let status = unsafe {
        AudioObjectGetPropertyData(
            object,
            address as *const _,
            0,
            ptr::null(),
            &mut actual_size as *mut _,
            items.as_mut_ptr() as *mut _,
        )
    };
    check(status, operation, object)?;

    items.truncate(actual_size as usize / mem::size_of::<T>());
    Ok(items)
}

fn has_output_streams(device: AudioDeviceID) -> bool {
    let streams = address(kAudioDevicePropertyStreams, kAudioObjectPropertyScopeOutput);
    property_size(device, &streams, "output stream size").is_ok_and(|size| size > 0)
}

impl DeviceController for CoreAudioController {
    fn query_default_output(&self) -> Result<DeviceId> {
        let mut device: AudioDeviceID = 0;
        read_property(
            kAudioObjectSystemObject,
            &address(kAudioHardwarePropertyDefaultOutputDevice, kAudioObjectPropertyScopeGlobal),
            "default output device",
            &mut device,
        )?;

        if device == 0 {
            return Err(AudioError::DeviceNotFound("No default output device".to_string()));
        }
        Ok(DeviceId::new(device))
    }

    fn query_output_devices(&self) -> Result<Vec<AudioDevice>> {
        let ids: Vec<AudioDeviceID> = read_array(
            kAudioObjectSystemObject,
            &address(kAudioHardwarePropertyDevices, kAudioObjectPropertyScopeGlobal),
            "device list",
            0,
        )?;

        let devices: Vec<AudioDevice> = ids
            .into_iter()
            .filter(|&id| has_output_streams(id))
            .filter_map(|id| {
                let id = DeviceId::new(id);
                self.query_name(id).ok().map(|name| AudioDevice { id, name })
            })
            .collect();

        debug!("CoreAudio reports {} output devices", devices.len());
        Ok(devices)
    }

    fn query_name(&self, device: DeviceId) -> Result<String> {
        let mut name_ref: CFStringRef = ptr::null();
        read_property(
            device.as_u32(),
            &address(kAudioDevicePropertyDeviceNameCFString, kAudioObjectPropertyScopeGlobal),
            "device name",
            &mut name_ref,
        )?;

        if name_ref.is_null() {
            return Err(AudioError::OsError(format!("Device {} has no name", device)));
        }

        // The HAL hands over a retained string
        let name = unsafe { CFString::wrap_under_create_rule(name_ref) };
        Ok(name.to_string())
    }

    fn query_nominal_rate(&self, device: DeviceId) -> Result<SampleRate> {
        let mut rate: f64 = 0.0;
        read_property(
            device.as_u32(),
            &address(kAudioDevicePropertyNominalSampleRate, kAudioObjectPropertyScopeGlobal),
            "nominal sample rate",
            &mut rate,
        )?;

        SampleRate::from_hz_f64(rate)
            .ok_or_else(|| AudioError::OsError(format!("Device {} reported rate {}", device, rate)))
    }

    fn write_nominal_rate(&self, device: DeviceId, rate: SampleRate) -> Result<()> {
        let value: f64 = rate.as_f64();
        let property = address(kAudioDevicePropertyNominalSampleRate, kAudioObjectPropertyScopeGlobal);

        let status = unsafe {
            AudioObjectSetPropertyData(
                device.as_u32(),
                &property as *const _,
                0,
                ptr::null(),
                mem::size_of::<f64>() as u32,
                &value as *const f64 as *const _,
            )
        };
        check(status, "set nominal sample rate", device.as_u32())
    }

    fn query_rate_ranges(&self, device: DeviceId) -> Result<Vec<RateRange>> {
        let ranges = read_array(
            device.as_u32(),
            &address(
                kAudioDevicePropertyAvailableNominalSampleRates,
                kAudioObjectPropertyScopeGlobal,
            ),
            "available sample rates",
            AudioValueRange {
                mMinimum: 0.0,
                mMaximum: 0.0,
            },
        )?;

        Ok(ranges
            .into_iter()
            .map(|r| RateRange::new(r.mMinimum, r.mMaximum))
            .collect())
    }

    fn query_bit_depth(&self, device: DeviceId) -> Result<u32> {
        let streams: Vec<AudioStreamID> = read_array(
            device.as_u32(),
            &address(kAudioDevicePropertyStreams, kAudioObjectPropertyScopeOutput),
            "output streams",
            0,
        )?;
        let first = streams
            .first()
            .copied()
            .ok_or(AudioError::NoOutputStreams(device.as_u32()))?;

        let mut format: AudioStreamBasicDescription = unsafe { mem::zeroed() };
        read_property(
            first,
            &address(kAudioStreamPropertyPhysicalFormat, kAudioObjectPropertyScopeGlobal),
            "physical format",
            &mut format,
        )?;
        Ok(format.mBitsPerChannel)
    }
}
