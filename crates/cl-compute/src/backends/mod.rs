//! Compute backends
//!
//! The simulated backend is always compiled. The OpenCL backend detects
//! hardware at runtime and falls back to the simulated one when absent.

pub mod simulated;

#[cfg(feature = "opencl")]
pub mod opencl;
