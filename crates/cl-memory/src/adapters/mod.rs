//! Adapters Layer
//!
//! - `SimulatedDriver`: host memory implementation of `ClDriver` used by
//!   tests and by machines without an OpenCL runtime

pub mod simulated;

pub use simulated::{
    CallCounts, DriverOp, InvocationArg, KernelInvocation, ResourceCounts, SimulatedDriver,
};
