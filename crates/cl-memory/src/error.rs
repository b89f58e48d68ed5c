//! Error types for the memory subsystem

use crate::domain::{Direction, LeaseKind, LeaseState, QueueId, SharingStrategy};
use std::fmt;
use std::panic::Location;
use thiserror::Error;

/// OpenCL status codes surfaced by drivers
pub mod status {
    pub const MEM_OBJECT_ALLOCATION_FAILURE: i32 = -4;
    pub const OUT_OF_RESOURCES: i32 = -5;
    pub const OUT_OF_HOST_MEMORY: i32 = -6;
    pub const MAP_FAILURE: i32 = -12;
    pub const INVALID_VALUE: i32 = -30;
    pub const INVALID_COMMAND_QUEUE: i32 = -36;
    pub const INVALID_MEM_OBJECT: i32 = -38;
    pub const INVALID_IMAGE_SIZE: i32 = -40;
    pub const INVALID_KERNEL: i32 = -48;
    pub const INVALID_ARG_INDEX: i32 = -49;
    pub const INVALID_ARG_VALUE: i32 = -50;
    pub const INVALID_KERNEL_ARGS: i32 = -52;
    pub const INVALID_WORK_DIMENSION: i32 = -53;
    pub const INVALID_OPERATION: i32 = -59;
    pub const INVALID_BUFFER_SIZE: i32 = -61;
    pub const INVALID_GLOBAL_WORK_SIZE: i32 = -63;

    /// Symbolic name of a status code, `"CL_UNKNOWN_ERROR"` when unrecognised
    pub fn name(code: i32) -> &'static str {
        match code {
            0 => "CL_SUCCESS",
            MEM_OBJECT_ALLOCATION_FAILURE => "CL_MEM_OBJECT_ALLOCATION_FAILURE",
            OUT_OF_RESOURCES => "CL_OUT_OF_RESOURCES",
            OUT_OF_HOST_MEMORY => "CL_OUT_OF_HOST_MEMORY",
            MAP_FAILURE => "CL_MAP_FAILURE",
            INVALID_VALUE => "CL_INVALID_VALUE",
            INVALID_COMMAND_QUEUE => "CL_INVALID_COMMAND_QUEUE",
            INVALID_MEM_OBJECT => "CL_INVALID_MEM_OBJECT",
            INVALID_IMAGE_SIZE => "CL_INVALID_IMAGE_SIZE",
            INVALID_KERNEL => "CL_INVALID_KERNEL",
            INVALID_ARG_INDEX => "CL_INVALID_ARG_INDEX",
            INVALID_ARG_VALUE => "CL_INVALID_ARG_VALUE",
            INVALID_KERNEL_ARGS => "CL_INVALID_KERNEL_ARGS",
            INVALID_WORK_DIMENSION => "CL_INVALID_WORK_DIMENSION",
            INVALID_OPERATION => "CL_INVALID_OPERATION",
            INVALID_BUFFER_SIZE => "CL_INVALID_BUFFER_SIZE",
            INVALID_GLOBAL_WORK_SIZE => "CL_INVALID_GLOBAL_WORK_SIZE",
            _ => "CL_UNKNOWN_ERROR",
        }
    }
}

/// Failure reported by an OpenCL driver call
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub struct DriverError {
    /// Raw OpenCL status code
    pub code: i32,
    /// Driver supplied context
    pub detail: String,
}

impl DriverError {
    pub fn new(code: i32, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        status::name(self.code)
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.name(), self.code, self.detail)
    }
}

/// Result alias for driver calls
pub type DriverResult<T> = Result<T, DriverError>;

/// Errors that can occur while managing shared allocations
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Sharing strategy {strategy} is not supported by device '{device}'")]
    UnsupportedSharingStrategy {
        strategy: SharingStrategy,
        device: String,
    },

    #[error("Failed to allocate {size} bytes with sharing strategy {strategy}: {source}")]
    AllocationFailure {
        size: usize,
        strategy: SharingStrategy,
        #[source]
        source: DriverError,
    },

    #[error("Cannot acquire {requested} lease while allocation is {state}")]
    LockViolation {
        requested: LeaseKind,
        state: LeaseState,
    },

    #[error("No {0} lease is held on this allocation")]
    LeaseNotHeld(LeaseKind),

    #[error("Image dimensions are required to bind argument {slot} as an image")]
    MissingImageDimensions { slot: u32 },

    #[error("Invalid image dimensions: {0}")]
    InvalidImageDimensions(String),

    #[error("Host mapping moved from {expected:#x} to {actual:#x}")]
    AddressIntegrityViolation { expected: usize, actual: usize },

    #[error("Allocation is unusable after an address integrity violation")]
    Corrupted,

    #[error("Host lease for {granted} does not permit {requested} access")]
    HostAccessDenied {
        requested: Direction,
        granted: Direction,
    },

    #[error("Invalid kernel argument: {0}")]
    InvalidKernelArgument(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Queue {queue} is out of range (configured queues: {count})")]
    InvalidQueue { queue: QueueId, count: u32 },

    #[error("{operation} failed at {location}: {source}")]
    Driver {
        operation: &'static str,
        location: &'static Location<'static>,
        #[source]
        source: DriverError,
    },

    #[error("Blocking task failed: {0}")]
    TaskFailed(String),
}

impl MemoryError {
    /// OpenCL status code carried by this error, if any
    pub fn status_code(&self) -> Option<i32> {
        match self {
            Self::AllocationFailure { source, .. } | Self::Driver { source, .. } => {
                Some(source.code)
            }
            _ => None,
        }
    }
}

/// Attaches the failing operation and call site to a driver error
pub(crate) trait DriverContext<T> {
    fn context(self, operation: &'static str) -> Result<T, MemoryError>;
}

impl<T> DriverContext<T> for DriverResult<T> {
    #[track_caller]
    fn context(self, operation: &'static str) -> Result<T, MemoryError> {
        match self {
            Ok(value) => Ok(value),
            Err(source) => Err(MemoryError::Driver {
                operation,
                location: Location::caller(),
                source,
            }),
        }
    }
}
