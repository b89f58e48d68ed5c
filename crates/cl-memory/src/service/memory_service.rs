//! Async front end over the blocking allocation API
//!
//! Driver calls block, so every request is moved onto tokio's blocking pool.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::error::MemoryError;
use crate::ports::{AllocationRequest, MemoryApi};
use crate::service::allocation::{AllocationContext, MemoryAllocation};
use crate::service::dispatch::KernelDispatcher;
use crate::domain::Direction;

pub struct MemoryService {
    context: AllocationContext,
}

impl MemoryService {
    pub fn new(context: AllocationContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &AllocationContext {
        &self.context
    }

    pub fn dispatcher(&self) -> KernelDispatcher {
        KernelDispatcher::new(&self.context)
    }
}

async fn blocking<T, F>(task: F) -> Result<T, MemoryError>
where
    F: FnOnce() -> Result<T, MemoryError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| MemoryError::TaskFailed(e.to_string()))?
}

#[async_trait]
impl MemoryApi for MemoryService {
    async fn create_allocation(
        &self,
        request: AllocationRequest,
    ) -> Result<Arc<MemoryAllocation>, MemoryError> {
        let context = self.context.clone();
        let allocation = blocking(move || MemoryAllocation::create(&context, request)).await?;
        Ok(Arc::new(allocation))
    }

    async fn write_host(
        &self,
        allocation: Arc<MemoryAllocation>,
        data: Vec<u8>,
    ) -> Result<(), MemoryError> {
        debug!("[cl-memory] async write of {} bytes to {}", data.len(), allocation.id());
        blocking(move || {
            let mut lease = allocation.acquire_host_lease(Direction::WriteOnly)?;
            lease.copy_from(&data)?;
            lease.release()
        })
        .await
    }

    async fn host_snapshot(
        &self,
        allocation: Arc<MemoryAllocation>,
    ) -> Result<Vec<u8>, MemoryError> {
        blocking(move || {
            let lease = allocation.acquire_host_lease(Direction::ReadOnly)?;
            let bytes = lease.as_slice()?.to_vec();
            lease.release()?;
            Ok(bytes)
        })
        .await
    }
}
