//! Inbound Ports (Driving Ports)
//!
//! Asynchronous API used by task schedulers. Each call runs its driver work
//! on a blocking worker and resolves once that work has completed.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::{Direction, SharingStrategy};
use crate::error::MemoryError;
use crate::service::MemoryAllocation;

/// Parameters of a new allocation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocationRequest {
    pub size_bytes: usize,
    pub direction: Direction,
    /// Caller preference, validated against the device
    pub sharing: Option<SharingStrategy>,
}

impl AllocationRequest {
    pub fn new(size_bytes: usize, direction: Direction) -> Self {
        Self {
            size_bytes,
            direction,
            sharing: None,
        }
    }

    pub fn with_sharing(mut self, strategy: SharingStrategy) -> Self {
        self.sharing = Some(strategy);
        self
    }
}

/// Primary memory API (Driving Port)
#[async_trait]
pub trait MemoryApi: Send + Sync {
    /// Create and materialize an allocation
    async fn create_allocation(
        &self,
        request: AllocationRequest,
    ) -> Result<Arc<MemoryAllocation>, MemoryError>;

    /// Copy `data` into the allocation under a write-only host lease
    async fn write_host(
        &self,
        allocation: Arc<MemoryAllocation>,
        data: Vec<u8>,
    ) -> Result<(), MemoryError>;

    /// Read the whole allocation under a read-only host lease
    async fn host_snapshot(
        &self,
        allocation: Arc<MemoryAllocation>,
    ) -> Result<Vec<u8>, MemoryError>;
}
