//! Shared allocation and its lease guards
//!
//! A `MemoryAllocation` owns one logical buffer: the host pointer, the device
//! buffer or SVM region behind it, and at most one image projection. All
//! mutable state sits behind a single mutex; guards returned by the acquire
//! calls borrow the allocation and hand the lease back when dropped.

use std::fmt;

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::domain::{
    AccessLease, AccessQualifier, AllocationId, Direction, HostMapPlan, HostPtr, ImageDims,
    ImageHandle, ImageProjection, KernelHandle, LeaseKind, LeaseState, MapAccess, MemHandle,
    MemoryConfig, QueueId, SharingStrategy,
};
use crate::error::{status, DriverContext, DriverError, MemoryError};
use crate::metrics::{CopyDirection, MetricsRecorder, NoOpMetrics};
use crate::ports::{
    AllocationRequest, BufferBacking, ClDriver, DeviceCapabilities, DriverArg, ImageDescriptor,
};
use crate::service::binder::SlotBinding;

/// Driver, device description, configuration and metrics shared by the
/// allocations of one device
#[derive(Clone)]
pub struct AllocationContext {
    driver: Arc<dyn ClDriver>,
    capabilities: Arc<dyn DeviceCapabilities>,
    config: MemoryConfig,
    metrics: Arc<dyn MetricsRecorder>,
}

impl AllocationContext {
    pub fn new(driver: Arc<dyn ClDriver>, capabilities: Arc<dyn DeviceCapabilities>) -> Self {
        Self {
            driver,
            capabilities,
            config: MemoryConfig::default(),
            metrics: Arc::new(NoOpMetrics),
        }
    }

    pub fn with_config(mut self, config: MemoryConfig) -> Result<Self, MemoryError> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsRecorder>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn driver(&self) -> &Arc<dyn ClDriver> {
        &self.driver
    }

    pub fn capabilities(&self) -> &Arc<dyn DeviceCapabilities> {
        &self.capabilities
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }
}

impl fmt::Debug for AllocationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllocationContext")
            .field("device", &self.capabilities.device_name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct AllocationState {
    lease: AccessLease,
    /// Present only for pinned buffers
    device_buffer: Option<MemHandle>,
    /// Address of an outstanding map that landed away from `host_ptr`
    stray_map: Option<HostPtr>,
    image: Option<ImageProjection>,
    /// Queue with device work not yet waited for
    pending_queue: Option<QueueId>,
    corrupt: bool,
}

/// One logical buffer shared between host and device
pub struct MemoryAllocation {
    id: AllocationId,
    size_bytes: usize,
    direction: Direction,
    strategy: SharingStrategy,
    host_ptr: HostPtr,
    aliasing: bool,
    context: AllocationContext,
    state: Mutex<AllocationState>,
}

impl MemoryAllocation {
    /// Choose a sharing strategy and materialize host and device storage.
    ///
    /// Pinned buffers come back mapped for the host in the direction the
    /// host is expected to use: filled for kernel inputs, read back for
    /// kernel outputs. SVM allocations start unmapped.
    pub fn create(context: &AllocationContext, request: AllocationRequest) -> Result<Self, MemoryError> {
        let capabilities = &context.capabilities;
        let strategy = request
            .sharing
            .or(context.config.default_sharing)
            .unwrap_or_else(|| capabilities.preferred_sharing_strategy());
        if !capabilities.supports_sharing_strategy(strategy) {
            return Err(MemoryError::UnsupportedSharingStrategy {
                strategy,
                device: capabilities.device_name().to_string(),
            });
        }

        let size = request.size_bytes;
        let failure = |source: DriverError| MemoryError::AllocationFailure {
            size,
            strategy,
            source,
        };
        if size as u64 > capabilities.max_alloc_bytes() {
            return Err(failure(DriverError::new(
                status::INVALID_BUFFER_SIZE,
                format!("device limit is {} bytes", capabilities.max_alloc_bytes()),
            )));
        }

        let driver = &context.driver;
        let (host_ptr, device_buffer, lease) = match strategy {
            SharingStrategy::None => {
                let mem = driver
                    .create_buffer(request.direction, BufferBacking::AllocHostPtr, size)
                    .map_err(failure)?;
                let access = MapAccess::initial_for(request.direction);
                match driver.enqueue_map_buffer(context.config.default_queue, mem, access, size) {
                    Ok(ptr) => (
                        ptr,
                        Some(mem),
                        AccessLease::with_host_map(request.direction.host_counterpart()),
                    ),
                    Err(source) => {
                        if let Err(e) = driver.release_buffer(mem) {
                            warn!("[cl-memory] Failed to release buffer after map failure: {}", e);
                        }
                        return Err(failure(source));
                    }
                }
            }
            SharingStrategy::CoarseGrainSvm | SharingStrategy::FineGrainSvm => {
                let fine = strategy == SharingStrategy::FineGrainSvm;
                let ptr = driver
                    .svm_alloc(request.direction, fine, size)
                    .map_err(failure)?;
                (ptr, None, AccessLease::new())
            }
        };

        let allocation = Self {
            id: AllocationId::next(),
            size_bytes: size,
            direction: request.direction,
            strategy,
            host_ptr,
            aliasing: capabilities.supports_buffer_image_aliasing(),
            context: context.clone(),
            state: Mutex::new(AllocationState {
                lease,
                device_buffer,
                stray_map: None,
                image: None,
                pending_queue: None,
                corrupt: false,
            }),
        };
        context.metrics.record_allocation_created(size);
        info!(
            "[cl-memory] {} materialized: {} bytes, {}, sharing {} at {}",
            allocation.id, size, allocation.direction, strategy, host_ptr
        );
        Ok(allocation)
    }

    pub fn id(&self) -> AllocationId {
        self.id
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn sharing_strategy(&self) -> SharingStrategy {
        self.strategy
    }

    /// Host address of the allocation; identical for its whole lifetime
    pub fn host_ptr(&self) -> HostPtr {
        self.host_ptr
    }

    pub fn lease_state(&self) -> LeaseState {
        self.state.lock().lease.state()
    }

    /// Direction of the current host map, if any
    pub fn host_map(&self) -> Option<Direction> {
        self.state.lock().lease.host_map()
    }

    pub fn image_dims(&self) -> Option<ImageDims> {
        self.state.lock().image.as_ref().map(ImageProjection::dims)
    }

    pub fn is_corrupt(&self) -> bool {
        self.state.lock().corrupt
    }

    /// Take the allocation for host access in `direction`.
    ///
    /// Waits for outstanding device work first. No driver call is made
    /// when the memory is already mapped in exactly this direction.
    pub fn acquire_host_lease(&self, direction: Direction) -> Result<HostLease<'_>, MemoryError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.corrupt {
            return Err(MemoryError::Corrupted);
        }
        let plan = state
            .lease
            .plan_host(direction)
            .map_err(|e| self.lock_violation(e))?;

        let queue = self.context.config.default_queue;
        if let Some(pending) = state.pending_queue {
            self.context
                .driver
                .finish(pending)
                .context("finish pending queue")?;
            state.pending_queue = None;
        }

        let fast_path = if self.strategy == SharingStrategy::FineGrainSvm {
            self.refresh_buffer_for_host(state, queue, direction)?;
            true
        } else {
            match plan {
                HostMapPlan::Reuse => true,
                HostMapPlan::Remap => {
                    self.unmap_host(state, queue)?;
                    self.map_host(state, queue, direction)?;
                    false
                }
                HostMapPlan::Map => {
                    self.map_host(state, queue, direction)?;
                    false
                }
            }
        };

        state.lease.grant_host()?;
        self.context.metrics.record_host_lease(fast_path);
        debug!(
            "[cl-memory] {} host lease {} granted (fast path: {})",
            self.id, direction, fast_path
        );
        Ok(HostLease {
            allocation: self,
            direction,
            released: false,
        })
    }

    /// Take the allocation for device access on the default queue
    pub fn acquire_device_lease(&self) -> Result<DeviceLease<'_>, MemoryError> {
        self.acquire_device_lease_on(self.context.config.default_queue)
    }

    /// Take the allocation for device access on `queue`, unmapping any
    /// host map first
    pub fn acquire_device_lease_on(&self, queue: QueueId) -> Result<DeviceLease<'_>, MemoryError> {
        self.context.config.check_queue(queue)?;
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.corrupt {
            return Err(MemoryError::Corrupted);
        }
        let mapped = state
            .lease
            .plan_device()
            .map_err(|e| self.lock_violation(e))?;

        if let Some(pending) = state.pending_queue.filter(|pending| *pending != queue) {
            self.context
                .driver
                .finish(pending)
                .context("finish pending queue")?;
            state.pending_queue = None;
        }
        if mapped {
            self.unmap_host(state, queue)?;
        }

        state.lease.grant_device()?;
        self.context.metrics.record_device_lease();
        debug!("[cl-memory] {} device lease granted on {}", self.id, queue);
        Ok(DeviceLease {
            allocation: self,
            queue,
            released: false,
        })
    }

    /// Tear down the allocation; failures are logged, not returned
    pub fn destroy(self) {
        drop(self);
    }

    /// Bind the allocation to a kernel slot under a held device lease
    pub(crate) fn bind_to_kernel(
        &self,
        kernel: KernelHandle,
        queue: QueueId,
        binding: &SlotBinding,
    ) -> Result<(), MemoryError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.corrupt {
            return Err(MemoryError::Corrupted);
        }
        if !state.lease.is_device_locked() {
            return Err(MemoryError::LeaseNotHeld(LeaseKind::Device));
        }

        let arg = if binding.is_image {
            let dims = binding
                .dims
                .ok_or(MemoryError::MissingImageDimensions { slot: binding.slot })?;
            DriverArg::Image(self.project_image(state, queue, dims, binding.access)?)
        } else {
            self.sync_image_to_buffer(state, queue)?;
            if binding.access != AccessQualifier::ReadOnly {
                if let Some(projection) = state.image.as_mut() {
                    projection.record_buffer_written();
                }
            }
            match self.strategy {
                SharingStrategy::None => DriverArg::Buffer(self.device_buffer(state)?),
                SharingStrategy::CoarseGrainSvm | SharingStrategy::FineGrainSvm => {
                    DriverArg::SvmPointer(self.host_ptr)
                }
            }
        };

        self.context
            .driver
            .set_kernel_arg(kernel, binding.slot, arg)
            .context("set kernel argument")?;
        debug!(
            "[cl-memory] {} bound to slot {} as {:?}",
            self.id, binding.slot, arg
        );
        Ok(())
    }

    fn lock_violation(&self, err: MemoryError) -> MemoryError {
        if matches!(err, MemoryError::LockViolation { .. }) {
            self.context.metrics.record_lock_violation();
            warn!("[cl-memory] {}: {}", self.id, err);
        }
        err
    }

    fn device_buffer(&self, state: &AllocationState) -> Result<MemHandle, MemoryError> {
        state.device_buffer.ok_or_else(|| {
            MemoryError::InvalidRequest(format!("{} has no device buffer", self.id))
        })
    }

    fn map_host(
        &self,
        state: &mut AllocationState,
        queue: QueueId,
        direction: Direction,
    ) -> Result<(), MemoryError> {
        self.refresh_buffer_for_host(state, queue, direction)?;
        let access = MapAccess::for_host(direction);
        let driver = &self.context.driver;
        match self.strategy {
            SharingStrategy::None => {
                let mem = self.device_buffer(state)?;
                let ptr = driver
                    .enqueue_map_buffer(queue, mem, access, self.size_bytes)
                    .context("map buffer")?;
                if ptr != self.host_ptr {
                    state.lease.record_mapped(direction);
                    state.stray_map = Some(ptr);
                    state.corrupt = true;
                    self.context.metrics.record_integrity_violation();
                    error!(
                        "[cl-memory] {} remapped at {} instead of {}",
                        self.id, ptr, self.host_ptr
                    );
                    return Err(MemoryError::AddressIntegrityViolation {
                        expected: self.host_ptr.addr(),
                        actual: ptr.addr(),
                    });
                }
            }
            SharingStrategy::CoarseGrainSvm => driver
                .enqueue_svm_map(queue, self.host_ptr, self.size_bytes, access)
                .context("map SVM region")?,
            SharingStrategy::FineGrainSvm => return Ok(()),
        }
        state.lease.record_mapped(direction);
        debug!("[cl-memory] {} mapped {} for host", self.id, direction);
        Ok(())
    }

    fn unmap_host(&self, state: &mut AllocationState, queue: QueueId) -> Result<(), MemoryError> {
        if state.lease.host_map().is_none() {
            return Ok(());
        }
        let driver = &self.context.driver;
        match self.strategy {
            SharingStrategy::None => {
                let mem = self.device_buffer(state)?;
                let ptr = state.stray_map.unwrap_or(self.host_ptr);
                driver
                    .enqueue_unmap_buffer(queue, mem, ptr)
                    .context("unmap buffer")?;
                state.stray_map = None;
            }
            SharingStrategy::CoarseGrainSvm => driver
                .enqueue_svm_unmap(queue, self.host_ptr)
                .context("unmap SVM region")?,
            SharingStrategy::FineGrainSvm => {}
        }
        state.lease.record_unmapped();
        debug!("[cl-memory] {} unmapped from host", self.id);
        Ok(())
    }

    /// Make the linear buffer current before the host looks at it.
    ///
    /// A host lease that can write leaves the buffer newer than the image,
    /// so the next image read uploads what the host stored.
    fn refresh_buffer_for_host(
        &self,
        state: &mut AllocationState,
        queue: QueueId,
        direction: Direction,
    ) -> Result<(), MemoryError> {
        self.sync_image_to_buffer(state, queue)?;
        if direction.is_writable() {
            if let Some(projection) = state.image.as_mut() {
                projection.record_buffer_written();
            }
        }
        Ok(())
    }

    fn sync_image_to_buffer(
        &self,
        state: &mut AllocationState,
        queue: QueueId,
    ) -> Result<(), MemoryError> {
        let device_buffer = state.device_buffer;
        let Some(projection) = state.image.as_mut() else {
            return Ok(());
        };
        if projection.needs_download() {
            let target = projection
                .backing()
                .or(device_buffer)
                .ok_or_else(|| MemoryError::InvalidRequest("image has no linear partner".into()))?;
            self.context
                .driver
                .enqueue_copy_image_to_buffer(queue, projection.image(), target, projection.dims().region())
                .context("copy image to buffer")?;
            self.context.metrics.record_copy(CopyDirection::ImageToBuffer, true);
            projection.record_synced();
            debug!("[cl-memory] {} copied image back to buffer", self.id);
        } else if !projection.is_aliased() {
            self.context.metrics.record_copy(CopyDirection::ImageToBuffer, false);
            debug!(
                "[cl-memory] {} image was bound {:?}, buffer already current",
                self.id,
                projection.last_access()
            );
        }
        Ok(())
    }

    fn project_image(
        &self,
        state: &mut AllocationState,
        queue: QueueId,
        dims: ImageDims,
        access: AccessQualifier,
    ) -> Result<ImageHandle, MemoryError> {
        if let Some(existing) = &state.image {
            if existing.dims() != dims {
                return Err(MemoryError::InvalidImageDimensions(format!(
                    "{} is already projected as {}, requested {}",
                    self.id,
                    existing.dims(),
                    dims
                )));
            }
        } else {
            let projection = self.create_projection(state.device_buffer, dims)?;
            state.image = Some(projection);
        }

        let device_buffer = state.device_buffer;
        let Some(projection) = state.image.as_mut() else {
            return Err(MemoryError::InvalidRequest("image projection missing".into()));
        };
        if projection.needs_upload(access) {
            let source = projection
                .backing()
                .or(device_buffer)
                .ok_or_else(|| MemoryError::InvalidRequest("image has no linear partner".into()))?;
            self.context
                .driver
                .enqueue_copy_buffer_to_image(queue, source, projection.image(), dims.region())
                .context("copy buffer to image")?;
            self.context.metrics.record_copy(CopyDirection::BufferToImage, true);
            projection.record_synced();
            debug!("[cl-memory] {} copied buffer into image", self.id);
        } else if !projection.is_aliased() {
            self.context.metrics.record_copy(CopyDirection::BufferToImage, false);
            debug!(
                "[cl-memory] {} upload skipped ({:?} bind, {:?} is newer)",
                self.id,
                access,
                projection.freshness()
            );
        }
        projection.record_image_bind(access);
        Ok(projection.image())
    }

    fn create_projection(
        &self,
        device_buffer: Option<MemHandle>,
        dims: ImageDims,
    ) -> Result<ImageProjection, MemoryError> {
        let format = self.context.config.image_format;
        let bytes = format.image_bytes(&dims);
        if bytes > self.size_bytes {
            return Err(MemoryError::InvalidImageDimensions(format!(
                "{dims} image needs {bytes} bytes, {} holds {}",
                self.id, self.size_bytes
            )));
        }

        let driver = &self.context.driver;
        let (partner, backing) = match self.strategy {
            SharingStrategy::None => (
                device_buffer.ok_or_else(|| {
                    MemoryError::InvalidRequest(format!("{} has no device buffer", self.id))
                })?,
                None,
            ),
            SharingStrategy::CoarseGrainSvm | SharingStrategy::FineGrainSvm => {
                let mem = driver
                    .create_buffer(
                        self.direction,
                        BufferBacking::UseHostPtr(self.host_ptr),
                        self.size_bytes,
                    )
                    .context("wrap SVM region in buffer")?;
                (mem, Some(mem))
            }
        };

        let descriptor = ImageDescriptor {
            dims,
            format,
            access: self.direction,
            alias: self.aliasing.then_some(partner),
        };
        let image = match driver.create_image(&descriptor) {
            Ok(image) => image,
            Err(source) => {
                if let Some(mem) = backing {
                    if let Err(e) = driver.release_buffer(mem) {
                        warn!("[cl-memory] Failed to release image backing buffer: {}", e);
                    }
                }
                return Err(source).context("create image");
            }
        };
        info!(
            "[cl-memory] {} projected as {} image (aliased: {})",
            self.id, dims, self.aliasing
        );
        Ok(ImageProjection::new(image, dims, self.aliasing, backing))
    }

    fn release_host(&self) -> Result<(), MemoryError> {
        self.state.lock().lease.release(LeaseKind::Host)?;
        debug!("[cl-memory] {} host lease released", self.id);
        Ok(())
    }

    fn release_device(&self, queue: QueueId, completed: bool) -> Result<(), MemoryError> {
        let mut state = self.state.lock();
        state.lease.release(LeaseKind::Device)?;
        if completed {
            if state.pending_queue == Some(queue) {
                state.pending_queue = None;
            }
        } else {
            state.pending_queue = Some(queue);
        }
        debug!("[cl-memory] {} device lease released on {}", self.id, queue);
        Ok(())
    }
}

impl fmt::Debug for MemoryAllocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryAllocation")
            .field("id", &self.id)
            .field("size_bytes", &self.size_bytes)
            .field("direction", &self.direction)
            .field("strategy", &self.strategy)
            .field("host_ptr", &self.host_ptr)
            .finish_non_exhaustive()
    }
}

impl Drop for MemoryAllocation {
    fn drop(&mut self) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let driver = &self.context.driver;
        let queue = self.context.config.default_queue;

        if let Some(kind) = state.lease.force_release() {
            warn!("[cl-memory] {} destroyed with {} lease outstanding", self.id, kind);
        }
        if let Some(pending) = state.pending_queue.take() {
            if let Err(e) = driver.finish(pending) {
                warn!("[cl-memory] {} failed to drain {}: {}", self.id, pending, e);
            }
        }
        if let Err(e) = self.unmap_host(state, queue) {
            warn!("[cl-memory] {} failed to unmap during teardown: {}", self.id, e);
        }
        if let Some(projection) = state.image.take() {
            if let Err(e) = driver.release_image(projection.image()) {
                warn!("[cl-memory] {} failed to release image: {}", self.id, e);
            }
            if let Some(mem) = projection.backing() {
                if let Err(e) = driver.release_buffer(mem) {
                    warn!("[cl-memory] {} failed to release image backing: {}", self.id, e);
                }
            }
        }
        match self.strategy {
            SharingStrategy::None => {
                if let Some(mem) = state.device_buffer.take() {
                    if let Err(e) = driver.release_buffer(mem) {
                        warn!("[cl-memory] {} failed to release buffer: {}", self.id, e);
                    }
                }
            }
            SharingStrategy::CoarseGrainSvm | SharingStrategy::FineGrainSvm => {
                if let Err(e) = driver.svm_free(self.host_ptr) {
                    warn!("[cl-memory] {} failed to free SVM region: {}", self.id, e);
                }
            }
        }
        self.context.metrics.record_allocation_destroyed(self.size_bytes);
        info!("[cl-memory] {} destroyed", self.id);
    }
}

/// Host access to an allocation, released on drop
pub struct HostLease<'a> {
    allocation: &'a MemoryAllocation,
    direction: Direction,
    released: bool,
}

impl<'a> HostLease<'a> {
    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn allocation(&self) -> &'a MemoryAllocation {
        self.allocation
    }

    pub fn host_ptr(&self) -> HostPtr {
        self.allocation.host_ptr
    }

    pub fn len(&self) -> usize {
        self.allocation.size_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> Result<&[u8], MemoryError> {
        if !self.direction.is_readable() {
            return Err(MemoryError::HostAccessDenied {
                requested: Direction::ReadOnly,
                granted: self.direction,
            });
        }
        // SAFETY: the host pointer covers `size_bytes` for the allocation's
        // lifetime, and while this lease is held neither the device nor
        // another host lease can touch the memory
        Ok(unsafe { std::slice::from_raw_parts(self.host_ptr().as_ptr(), self.len()) })
    }

    pub fn as_mut_slice(&mut self) -> Result<&mut [u8], MemoryError> {
        if !self.direction.is_writable() {
            return Err(MemoryError::HostAccessDenied {
                requested: Direction::WriteOnly,
                granted: self.direction,
            });
        }
        // SAFETY: as in `as_slice`, and `&mut self` rules out a second view
        Ok(unsafe { std::slice::from_raw_parts_mut(self.host_ptr().as_ptr(), self.len()) })
    }

    /// Copy `src` to the start of the allocation
    pub fn copy_from(&mut self, src: &[u8]) -> Result<(), MemoryError> {
        if src.len() > self.len() {
            return Err(MemoryError::InvalidRequest(format!(
                "source of {} bytes does not fit {} bytes",
                src.len(),
                self.len()
            )));
        }
        self.as_mut_slice()?[..src.len()].copy_from_slice(src);
        Ok(())
    }

    pub fn release(mut self) -> Result<(), MemoryError> {
        self.released = true;
        self.allocation.release_host()
    }
}

impl fmt::Debug for HostLease<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostLease")
            .field("allocation", &self.allocation.id)
            .field("direction", &self.direction)
            .finish()
    }
}

impl Drop for HostLease<'_> {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.allocation.release_host() {
                warn!("[cl-memory] Host lease release failed: {}", e);
            }
        }
    }
}

/// Device access to an allocation, released on drop
///
/// Dropping or calling [`DeviceLease::release`] marks the lease queue as
/// having outstanding work; the next host lease waits for it.
pub struct DeviceLease<'a> {
    allocation: &'a MemoryAllocation,
    queue: QueueId,
    released: bool,
}

impl<'a> DeviceLease<'a> {
    pub fn allocation(&self) -> &'a MemoryAllocation {
        self.allocation
    }

    pub fn queue(&self) -> QueueId {
        self.queue
    }

    pub fn release(mut self) -> Result<(), MemoryError> {
        self.released = true;
        self.allocation.release_device(self.queue, false)
    }

    /// Release after the caller has already waited for the queue
    pub fn complete(mut self) -> Result<(), MemoryError> {
        self.released = true;
        self.allocation.release_device(self.queue, true)
    }
}

impl fmt::Debug for DeviceLease<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceLease")
            .field("allocation", &self.allocation.id)
            .field("queue", &self.queue)
            .finish()
    }
}

impl Drop for DeviceLease<'_> {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.allocation.release_device(self.queue, false) {
                warn!("[cl-memory] Device lease release failed: {}", e);
            }
        }
    }
}
