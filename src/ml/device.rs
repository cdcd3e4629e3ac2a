//! Compute device selection for embedding inference
//!
//! GPU backends are only available when the crate is built with the `cuda`
//! or `metal` feature. A requested GPU that cannot be opened falls back to
//! the CPU.

use candle_core::Device;
use serde::{Deserialize, Serialize};

/// Device types supported for ML inference
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    /// CPU inference
    #[default]
    Cpu,
    /// CUDA GPU inference
    Cuda(usize),
    /// Metal GPU inference (macOS)
    Metal,
}

impl DeviceType {
    /// Human-readable device name
    pub fn name(&self) -> String {
        match self {
            DeviceType::Cpu => "CPU".to_string(),
            DeviceType::Cuda(id) => format!("CUDA GPU {}", id),
            DeviceType::Metal => "Metal GPU".to_string(),
        }
    }
}

/// Open the requested device, falling back to the CPU
pub fn select_device(device_type: &DeviceType) -> Device {
    let opened = match device_type {
        DeviceType::Cpu => return Device::Cpu,
        DeviceType::Cuda(id) => Device::new_cuda(*id),
        DeviceType::Metal => Device::new_metal(0),
    };

    match opened {
        Ok(device) => {
            log::info!("Using device: {}", device_type.name());
            device
        }
        Err(e) => {
            log::warn!("{} unavailable ({}), using CPU", device_type.name(), e);
            Device::Cpu
        }
    }
}
