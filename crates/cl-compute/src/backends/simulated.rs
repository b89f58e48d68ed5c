//! Simulated backend
//!
//! Fallback that always works: a `SimulatedDriver` describing an OpenCL 2.0
//! device backed by host memory.

use cl_memory::{ClVersion, DeviceProfile, SimulatedDriver, SvmCapabilities};

/// Largest single allocation the host driver accepts
pub const HOST_MAX_ALLOC_BYTES: u64 = 1 << 30;

/// Simulated OpenCL 2.0 device named after the host it runs on
pub fn host_driver() -> SimulatedDriver {
    let cores = num_cpus::get();
    SimulatedDriver::new(DeviceProfile::new(
        format!("Simulated OpenCL 2.0 device ({} host cores)", cores),
        ClVersion::V2_0,
        SvmCapabilities::COARSE_GRAIN_BUFFER | SvmCapabilities::FINE_GRAIN_BUFFER,
        HOST_MAX_ALLOC_BYTES,
    ))
}

/// Simulated OpenCL 1.2 device: no SVM, images need explicit copies
pub fn legacy_host_driver() -> SimulatedDriver {
    let cores = num_cpus::get();
    SimulatedDriver::new(DeviceProfile::new(
        format!("Simulated OpenCL 1.2 device ({} host cores)", cores),
        ClVersion::V1_2,
        SvmCapabilities::NONE,
        HOST_MAX_ALLOC_BYTES,
    ))
}
