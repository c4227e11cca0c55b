//! Output device enumeration and lookup

use cpal::traits::{DeviceTrait, HostTrait};

use crate::error::BackendError;
use crate::protocol::rates::SAMPLE_RATES;

/// Description of an output device
#[derive(Debug, Clone)]
pub struct OutputDeviceInfo {
    pub name: String,
    pub is_default: bool,
    /// Protocol sample rates the device can play
    pub sample_rates: Vec<u32>,
    pub channels: Vec<u16>,
}

/// List all available output devices
pub fn list_output_devices() -> Vec<OutputDeviceInfo> {
    let host = cpal::default_host();
    let mut devices = Vec::new();

    let default_name = host.default_output_device().and_then(|d| d.name().ok());

    if let Ok(outputs) = host.output_devices() {
        for device in outputs {
            if let Ok(name) = device.name() {
                let (sample_rates, channels) = get_device_capabilities(&device);
                devices.push(OutputDeviceInfo {
                    is_default: default_name.as_ref() == Some(&name),
                    name,
                    sample_rates,
                    channels,
                });
            }
        }
    }

    devices
}

/// Get device capabilities restricted to the protocol rate table
fn get_device_capabilities(device: &cpal::Device) -> (Vec<u32>, Vec<u16>) {
    let mut sample_rates = Vec::new();
    let mut channels = Vec::new();

    if let Ok(configs) = device.supported_output_configs() {
        for config in configs {
            for &rate_val in SAMPLE_RATES.iter() {
                let rate = cpal::SampleRate(rate_val);
                if rate >= config.min_sample_rate()
                    && rate <= config.max_sample_rate()
                    && !sample_rates.contains(&rate_val)
                {
                    sample_rates.push(rate_val);
                }
            }

            let ch = config.channels();
            if !channels.contains(&ch) {
                channels.push(ch);
            }
        }
    }

    sample_rates.sort_unstable();
    channels.sort_unstable();

    (sample_rates, channels)
}

/// Whether `device` offers an output with `channels` channels at `sample_rate`
///
/// True when the configurations cannot be listed; stream creation decides.
pub fn supports_output(device: &cpal::Device, channels: u16, sample_rate: u32) -> bool {
    let Ok(mut configs) = device.supported_output_configs() else {
        return true;
    };
    let rate = cpal::SampleRate(sample_rate);
    configs.any(|config| {
        config.channels() == channels
            && rate >= config.min_sample_rate()
            && rate <= config.max_sample_rate()
    })
}

/// Find an output device by exact name, or the default output when `None`
pub fn get_output_device(name: Option<&str>) -> Result<cpal::Device, BackendError> {
    let host = cpal::default_host();

    let Some(name) = name else {
        return host
            .default_output_device()
            .ok_or_else(|| BackendError::DeviceNotFound("No default output device".to_string()));
    };

    let devices = host
        .output_devices()
        .map_err(|e| BackendError::DeviceNotFound(e.to_string()))?;

    for device in devices {
        if device.name().map(|n| n == name).unwrap_or(false) {
            return Ok(device);
        }
    }

    let available: Vec<String> = list_output_devices().into_iter().map(|d| d.name).collect();
    tracing::error!("Output device {:?} not found, available: {:?}", name, available);
    Err(BackendError::DeviceNotFound(name.to_string()))
}
