//! # Device Detection and Management
//!
//! Handles detection and selection of compute devices (CPU/GPU) for model
//! inference, plus the numeric precision the weights are loaded with.

use candle_core::{DType, Device};
use std::sync::OnceLock;
use tracing::{debug, info};

/// Cached best available device to avoid repeated detection
static BEST_DEVICE: OnceLock<Device> = OnceLock::new();

/// Device preferences for model inference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DevicePreference {
    /// Automatically select the best available device
    #[default]
    Auto,
    /// Force CPU usage
    Cpu,
    /// Force CUDA GPU usage
    Cuda,
    /// Force Metal GPU usage
    Metal,
}

impl std::str::FromStr for DevicePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" | "automatic" => Ok(DevicePreference::Auto),
            "cpu" => Ok(DevicePreference::Cpu),
            "cuda" | "gpu" => Ok(DevicePreference::Cuda),
            "metal" => Ok(DevicePreference::Metal),
            _ => Err(format!("Unknown device preference: {}", s)),
        }
    }
}

/// Numeric precision for model weights.
///
/// Half precision roughly halves memory and is the usual choice on GPUs;
/// CPUs run float32. The engine falls back to CPU + float32 when the
/// preferred combination cannot be initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComputeType {
    #[default]
    Float16,
    Float32,
}

impl ComputeType {
    pub fn dtype(&self) -> DType {
        match self {
            ComputeType::Float16 => DType::F16,
            ComputeType::Float32 => DType::F32,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ComputeType::Float16 => "float16",
            ComputeType::Float32 => "float32",
        }
    }
}

impl std::str::FromStr for ComputeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "float16" | "f16" | "half" => Ok(ComputeType::Float16),
            "float32" | "f32" | "full" => Ok(ComputeType::Float32),
            _ => Err(format!("Unknown compute type: {}", s)),
        }
    }
}

/// Device detection and selection utilities
pub struct DeviceManager;

impl DeviceManager {
    /// Resolve a preference to a concrete device. A forced GPU preference
    /// that is unavailable yields an error so the caller can apply its own
    /// fallback policy (the engine falls back to CPU exactly once).
    pub fn resolve(preference: DevicePreference) -> Result<Device, candle_core::Error> {
        match preference {
            DevicePreference::Auto => Ok(Self::best_device()),
            DevicePreference::Cpu => Ok(Device::Cpu),
            DevicePreference::Cuda => Device::new_cuda(0),
            DevicePreference::Metal => Device::new_metal(0),
        }
    }

    /// Get the best available device (cached)
    pub fn best_device() -> Device {
        BEST_DEVICE.get_or_init(Self::detect_best_device).clone()
    }

    fn detect_best_device() -> Device {
        info!("Detecting best available compute device...");

        if let Some(device) = Self::cuda_device() {
            info!("Selected CUDA GPU for inference");
            return device;
        }

        if let Some(device) = Self::metal_device() {
            info!("Selected Metal GPU for inference");
            return device;
        }

        info!("Using CPU for inference (no GPU acceleration available)");
        Device::Cpu
    }

    fn cuda_device() -> Option<Device> {
        match Device::new_cuda(0) {
            Ok(device) => {
                debug!("CUDA device 0 available");
                Some(device)
            }
            Err(e) => {
                debug!("CUDA not available: {}", e);
                None
            }
        }
    }

    fn metal_device() -> Option<Device> {
        match Device::new_metal(0) {
            Ok(device) => {
                debug!("Metal device 0 available");
                Some(device)
            }
            Err(e) => {
                debug!("Metal not available: {}", e);
                None
            }
        }
    }

    /// Short device label for the health endpoint and logs.
    pub fn device_label(device: &Device) -> &'static str {
        match device {
            Device::Cpu => "cpu",
            Device::Cuda(_) => "cuda",
            Device::Metal(_) => "metal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_preference_parsing() {
        assert_eq!("auto".parse::<DevicePreference>().unwrap(), DevicePreference::Auto);
        assert_eq!("cpu".parse::<DevicePreference>().unwrap(), DevicePreference::Cpu);
        assert_eq!("CUDA".parse::<DevicePreference>().unwrap(), DevicePreference::Cuda);
        assert_eq!("metal".parse::<DevicePreference>().unwrap(), DevicePreference::Metal);
        assert!("invalid".parse::<DevicePreference>().is_err());
    }

    #[test]
    fn test_compute_type_parsing() {
        assert_eq!("float16".parse::<ComputeType>().unwrap(), ComputeType::Float16);
        assert_eq!("f32".parse::<ComputeType>().unwrap(), ComputeType::Float32);
        assert!("int8".parse::<ComputeType>().is_err());
    }

    #[test]
    fn test_cpu_always_resolves() {
        let device = DeviceManager::resolve(DevicePreference::Cpu).unwrap();
        assert_eq!(DeviceManager::device_label(&device), "cpu");
    }

    #[test]
    fn test_best_device_has_label() {
        let device = DeviceManager::best_device();
        assert!(!DeviceManager::device_label(&device).is_empty());
    }
}
