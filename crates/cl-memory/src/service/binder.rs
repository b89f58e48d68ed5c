//! Kernel argument binding

use tracing::debug;

use crate::domain::{AccessQualifier, ImageDims, KernelHandle, QueueId};
use crate::error::MemoryError;
use crate::service::allocation::{DeviceLease, MemoryAllocation};

/// How a kernel slot wants to see an allocation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotBinding {
    pub slot: u32,
    pub is_image: bool,
    pub access: AccessQualifier,
    /// Required when `is_image` is set
    pub dims: Option<ImageDims>,
}

impl SlotBinding {
    pub fn buffer(slot: u32, access: AccessQualifier) -> Self {
        Self {
            slot,
            is_image: false,
            access,
            dims: None,
        }
    }

    pub fn image(slot: u32, access: AccessQualifier, dims: Option<ImageDims>) -> Self {
        Self {
            slot,
            is_image: true,
            access,
            dims,
        }
    }

    pub fn validate(&self) -> Result<(), MemoryError> {
        if self.is_image && self.dims.is_none() {
            return Err(MemoryError::MissingImageDimensions { slot: self.slot });
        }
        Ok(())
    }
}

/// Makes allocations visible to the slots of one kernel
#[derive(Clone, Copy, Debug)]
pub struct KernelArgumentBinder {
    kernel: KernelHandle,
    queue: Option<QueueId>,
}

impl KernelArgumentBinder {
    pub fn new(kernel: KernelHandle) -> Self {
        Self {
            kernel,
            queue: None,
        }
    }

    /// Take device leases on `queue` instead of the configured default
    pub fn on_queue(mut self, queue: QueueId) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn kernel(&self) -> KernelHandle {
        self.kernel
    }

    /// Acquire a device lease on `allocation` and bind it to `binding.slot`.
    ///
    /// The returned lease must be held until the kernel has been enqueued;
    /// releasing it is the caller's job. Missing image dimensions are
    /// reported before the lease is taken.
    pub fn bind<'a>(
        &self,
        allocation: &'a MemoryAllocation,
        binding: &SlotBinding,
    ) -> Result<DeviceLease<'a>, MemoryError> {
        binding.validate()?;
        let lease = match self.queue {
            Some(queue) => allocation.acquire_device_lease_on(queue)?,
            None => allocation.acquire_device_lease()?,
        };
        self.bind_leased(&lease, binding)?;
        Ok(lease)
    }

    /// Bind through a device lease the caller already holds
    pub fn bind_leased(
        &self,
        lease: &DeviceLease<'_>,
        binding: &SlotBinding,
    ) -> Result<(), MemoryError> {
        binding.validate()?;
        debug!(
            "[cl-memory] binding {} to kernel {} slot {}",
            lease.allocation().id(),
            self.kernel.0,
            binding.slot
        );
        lease
            .allocation()
            .bind_to_kernel(self.kernel, lease.queue(), binding)
    }
}
