//! Service Layer
//!
//! Allocation lifecycle, kernel binding and dispatch, and the async
//! `MemoryApi` front end.

pub mod allocation;
pub mod binder;
pub mod dispatch;
pub mod memory_service;

pub use allocation::{AllocationContext, DeviceLease, HostLease, MemoryAllocation};
pub use binder::{KernelArgumentBinder, SlotBinding};
pub use dispatch::{KernelArg, KernelArgs, KernelDispatcher, RunOptions, RunTimings};
pub use memory_service::MemoryService;
