//! # cl-memory
//!
//! Ownership and synchronization of memory shared between the host and an
//! OpenCL device.
//!
//! ## Architecture
//!
//! This crate follows Hexagonal Architecture (Ports & Adapters):
//!
//! - **Domain Layer** (`domain/`): Pure logic, no driver calls
//!   - `AccessLease`: Host/device exclusion state machine
//!   - `ImageProjection`: Copy-avoidance policy for image views
//!   - `KernelParam`: Declared kernel parameter and its kind
//!   - `DeviceProfile`: Static device description
//!   - `MemoryConfig` / `MemoryConfigBuilder`: Queue and sharing settings
//!
//! - **Ports Layer** (`ports/`): Trait definitions
//!   - `MemoryApi`: Driving port (async API)
//!   - `ClDriver`: Driven port (OpenCL entry points)
//!   - `DeviceCapabilities`: Driven port (device feature queries)
//!
//! - **Service Layer** (`service/`): Orchestration
//!   - `MemoryAllocation`: One logical buffer with its leases
//!   - `KernelArgumentBinder`: Binds allocations to kernel slots
//!   - `KernelDispatcher`: Binds a full argument set and launches
//!   - `MemoryService`: Implements `MemoryApi`
//!
//! - **Adapters Layer** (`adapters/`):
//!   - `SimulatedDriver`: Host memory driver for tests and CPU-only hosts
//!
//! ## Invariants
//!
//! - Host and device leases are never held at the same time.
//! - The host pointer of an allocation never changes across map cycles.
//! - A linear buffer and its image projection are never both stale.
//!
//! ## Usage Example
//!
//! ```ignore
//! use cl_memory::{
//!     AccessQualifier, AllocationContext, AllocationRequest, Direction, KernelArg,
//!     KernelArgs, KernelDispatcher, KernelParam, MemoryAllocation, RunOptions,
//!     SimulatedDriver,
//! };
//! use std::sync::Arc;
//!
//! let driver = Arc::new(SimulatedDriver::opencl_2());
//! let context = AllocationContext::new(driver.clone(), Arc::new(driver.profile().clone()));
//!
//! let input = MemoryAllocation::create(&context, AllocationRequest::new(1024, Direction::ReadOnly))?;
//! input.acquire_host_lease(Direction::WriteOnly)?.copy_from(&bytes)?;
//!
//! let params = [KernelParam::new("src", "float*", AccessQualifier::ReadOnly)];
//! let args = KernelArgs::new().with("src", KernelArg::Buffer(&input));
//! KernelDispatcher::new(&context).run(kernel, &params, &args, &RunOptions::new(vec![256]))?;
//! ```

pub mod adapters;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod ports;
pub mod service;

// Re-exports for convenience
pub use adapters::{DriverOp, KernelInvocation, SimulatedDriver};
pub use domain::{
    AccessQualifier, AllocationId, ClVersion, DeviceProfile, Direction, HostPtr, ImageDims,
    ImageFormat, KernelHandle, KernelParam, LeaseState, MemoryConfig, MemoryConfigBuilder,
    ParamKind, QueueId, ScalarType, ScalarValue, SharingStrategy, SvmCapabilities,
};
pub use error::{DriverError, MemoryError};
pub use metrics::{Metrics, MetricsRecorder, MetricsSnapshot, NoOpMetrics};
pub use ports::{AllocationRequest, ClDriver, DeviceCapabilities, MemoryApi};
pub use service::{
    AllocationContext, DeviceLease, HostLease, KernelArg, KernelArgs, KernelArgumentBinder,
    KernelDispatcher, MemoryAllocation, MemoryService, RunOptions, RunTimings, SlotBinding,
};
