use std::fmt;
use std::str::FromStr;

use ort::execution_providers::ExecutionProviderDispatch;

/// Where a model runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Device {
    #[default]
    Cpu,
    /// Platform preferred accelerator, falling back to CPU.
    Auto,
    CoreMl,
    DirectMl,
}

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("unknown device '{0}' (expected CPU, AUTO, COREML or DIRECTML)")]
    Unknown(String),
    #[error("device {0} is not available on this platform")]
    Unavailable(Device),
}

impl FromStr for Device {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CPU" => Ok(Device::Cpu),
            "AUTO" => Ok(Device::Auto),
            "COREML" => Ok(Device::CoreMl),
            "DIRECTML" | "DML" => Ok(Device::DirectMl),
            _ => Err(DeviceError::Unknown(s.to_string())),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Device::Cpu => "CPU",
            Device::Auto => "AUTO",
            Device::CoreMl => "COREML",
            Device::DirectMl => "DIRECTML",
        })
    }
}

/// Execution providers to register for `device`. An empty list means the
/// default CPU provider.
pub fn execution_providers(device: Device) -> Result<Vec<ExecutionProviderDispatch>, DeviceError> {
    match device {
        Device::Cpu => Ok(Vec::new()),
        Device::Auto => Ok(preferred_execution_providers()),
        Device::CoreMl => {
            #[cfg(target_os = "macos")]
            {
                Ok(vec![ort::execution_providers::CoreMLExecutionProvider::default().build()])
            }
            #[cfg(not(target_os = "macos"))]
            {
                Err(DeviceError::Unavailable(device))
            }
        }
        Device::DirectMl => {
            #[cfg(target_os = "windows")]
            {
                Ok(vec![ort::execution_providers::DirectMLExecutionProvider::default().build()])
            }
            #[cfg(not(target_os = "windows"))]
            {
                Err(DeviceError::Unavailable(device))
            }
        }
    }
}

/// Preferred providers for the current platform; empty on Linux.
pub fn preferred_execution_providers() -> Vec<ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        vec![]
    }
}
