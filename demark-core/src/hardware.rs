// ============================================================================
// demark-core/src/hardware.rs
// ============================================================================
//
// HARDWARE DETECTION: Execution device inference at startup
//
// The pipeline infers the execution device class exactly once at startup and
// derives its batching and precision defaults from it. Detection is
// deliberately coarse: macOS machines carry VideoToolbox-class acceleration,
// machines with a visible NVIDIA driver carry CUDA-class acceleration, and
// everything else runs plain CPU.

use std::env;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::frame::Precision;

/// Default batch size when an accelerator-class device is present.
const ACCEL_BATCH_SIZE: usize = 12;

/// Default batch size for CPU-only execution.
const CPU_BATCH_SIZE: usize = 4;

/// Execution device class detected once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    VideoToolbox,
    Cuda,
    Cpu,
}

impl Device {
    /// Detects the device class for the current machine.
    pub fn detect() -> Self {
        if is_macos() {
            Device::VideoToolbox
        } else if nvidia_driver_present() {
            Device::Cuda
        } else {
            Device::Cpu
        }
    }

    pub fn is_accelerator(&self) -> bool {
        !matches!(self, Device::Cpu)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Device::VideoToolbox => "videotoolbox",
            Device::Cuda => "cuda",
            Device::Cpu => "cpu",
        }
    }

    /// Batch size used when the caller does not override it.
    pub fn default_batch_size(&self) -> usize {
        if self.is_accelerator() {
            ACCEL_BATCH_SIZE
        } else {
            CPU_BATCH_SIZE
        }
    }

    /// Numeric precision for oracle invocations on this device.
    pub fn preferred_precision(&self) -> Precision {
        if self.is_accelerator() {
            Precision::Half
        } else {
            Precision::Full
        }
    }
}

/// Checks if the current platform is macOS.
pub fn is_macos() -> bool {
    env::consts::OS == "macos"
}

/// Checks whether an NVIDIA driver is visible, either through the kernel
/// interface or a runnable nvidia-smi.
fn nvidia_driver_present() -> bool {
    if Path::new("/proc/driver/nvidia").exists() {
        return true;
    }
    Command::new("nvidia-smi")
        .arg("-L")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}
