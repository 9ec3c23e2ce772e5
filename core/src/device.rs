//! Host hardware detection.

use serde::{Deserialize, Serialize};

/// Which execution path synthesis runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Cpu,
    Accelerated,
}

/// Record of the hardware path detected at initialization.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub device: DeviceKind,
    pub device_name: String,
}

/// Raw platform identifiers of the host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostPlatform {
    pub os: String,
    pub arch: String,
}

impl Default for HostPlatform {
    fn default() -> Self {
        Self::detect()
    }
}

impl HostPlatform {
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// Platform this binary was compiled for.
    pub fn detect() -> Self {
        Self::new(std::env::consts::OS, std::env::consts::ARCH)
    }

    pub fn is_apple_silicon(&self) -> bool {
        self.os == "macos" && self.arch == "aarch64"
    }

    /// Build the descriptor for this host.
    ///
    /// The accelerated path is only reported when a backend is present to use
    /// it; the name always carries the raw architecture.
    pub fn describe(&self, backend_available: bool) -> DeviceDescriptor {
        if !backend_available {
            return DeviceDescriptor {
                device: DeviceKind::Cpu,
                device_name: format!("CPU ({}, synthesis backend not available)", self.arch),
            };
        }
        if self.is_apple_silicon() {
            DeviceDescriptor {
                device: DeviceKind::Accelerated,
                device_name: format!("Apple Silicon ({})", self.arch),
            }
        } else {
            DeviceDescriptor {
                device: DeviceKind::Cpu,
                device_name: format!("CPU ({})", self.arch),
            }
        }
    }
}
