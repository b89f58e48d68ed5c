//! Ports Layer
//!
//! - Driving Ports (inbound) - API for task schedulers
//! - Driven Ports (outbound) - accelerator driver and device capabilities

pub mod inbound;
pub mod outbound;

pub use inbound::{AllocationRequest, MemoryApi};
pub use outbound::{BufferBacking, ClDriver, DeviceCapabilities, DriverArg, ImageDescriptor};
