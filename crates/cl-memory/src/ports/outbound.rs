//! Outbound Ports (Driven Ports)
//!
//! Everything the memory subsystem needs from the accelerator runtime.
//! Implementations block until the driver call has completed.

use crate::domain::{
    ClVersion, Direction, HostPtr, ImageDims, ImageFormat, ImageHandle, KernelHandle, MapAccess,
    MemHandle, QueueId, ScalarValue, SharingStrategy,
};
use crate::error::DriverResult;
use std::fmt;

/// Where a device buffer gets its host-visible storage
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferBacking {
    /// Driver allocates pinned host memory
    AllocHostPtr,
    /// Wrap memory the caller already owns, such as an SVM region
    UseHostPtr(HostPtr),
}

/// Parameters of a new image object
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageDescriptor {
    pub dims: ImageDims,
    pub format: ImageFormat,
    pub access: Direction,
    /// Buffer whose storage the image shares
    pub alias: Option<MemHandle>,
}

/// Value bound to a kernel argument slot
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DriverArg {
    Buffer(MemHandle),
    Image(ImageHandle),
    SvmPointer(HostPtr),
    Scalar(ScalarValue),
}

/// Accelerator driver (Driven Port)
pub trait ClDriver: Send + Sync {
    // SVM

    fn svm_alloc(&self, access: Direction, fine_grain: bool, size: usize) -> DriverResult<HostPtr>;

    fn svm_free(&self, ptr: HostPtr) -> DriverResult<()>;

    fn enqueue_svm_map(
        &self,
        queue: QueueId,
        ptr: HostPtr,
        size: usize,
        access: MapAccess,
    ) -> DriverResult<()>;

    fn enqueue_svm_unmap(&self, queue: QueueId, ptr: HostPtr) -> DriverResult<()>;

    // Buffers

    fn create_buffer(
        &self,
        access: Direction,
        backing: BufferBacking,
        size: usize,
    ) -> DriverResult<MemHandle>;

    /// Map `size` bytes of `mem` and return the host address of the mapping
    fn enqueue_map_buffer(
        &self,
        queue: QueueId,
        mem: MemHandle,
        access: MapAccess,
        size: usize,
    ) -> DriverResult<HostPtr>;

    fn enqueue_unmap_buffer(&self, queue: QueueId, mem: MemHandle, ptr: HostPtr)
        -> DriverResult<()>;

    fn release_buffer(&self, mem: MemHandle) -> DriverResult<()>;

    // Images

    fn create_image(&self, descriptor: &ImageDescriptor) -> DriverResult<ImageHandle>;

    fn release_image(&self, image: ImageHandle) -> DriverResult<()>;

    fn enqueue_copy_buffer_to_image(
        &self,
        queue: QueueId,
        src: MemHandle,
        dst: ImageHandle,
        region: [usize; 3],
    ) -> DriverResult<()>;

    fn enqueue_copy_image_to_buffer(
        &self,
        queue: QueueId,
        src: ImageHandle,
        dst: MemHandle,
        region: [usize; 3],
    ) -> DriverResult<()>;

    // Kernels

    fn set_kernel_arg(&self, kernel: KernelHandle, slot: u32, arg: DriverArg) -> DriverResult<()>;

    fn enqueue_kernel(
        &self,
        queue: QueueId,
        kernel: KernelHandle,
        global_work: &[usize],
        local_work: Option<&[usize]>,
    ) -> DriverResult<()>;

    /// Block until all work on `queue` has completed
    fn finish(&self, queue: QueueId) -> DriverResult<()>;
}

/// What the device can do (Driven Port)
pub trait DeviceCapabilities: Send + Sync + fmt::Debug {
    fn device_name(&self) -> &str;

    fn version(&self) -> ClVersion;

    fn supports_sharing_strategy(&self, strategy: SharingStrategy) -> bool;

    fn supports_buffer_image_aliasing(&self) -> bool;

    fn max_alloc_bytes(&self) -> u64;

    /// Fine grain first, then coarse grain, then pinned buffers
    fn preferred_sharing_strategy(&self) -> SharingStrategy {
        [SharingStrategy::FineGrainSvm, SharingStrategy::CoarseGrainSvm]
            .into_iter()
            .find(|strategy| self.supports_sharing_strategy(*strategy))
            .unwrap_or(SharingStrategy::None)
    }
}
