//! In-process driver over host memory
//!
//! Buffers, SVM regions and images are heap storage with stable addresses.
//! Images created over a buffer share its storage. Kernels are Rust closures
//! registered up front and run synchronously by `enqueue_kernel` against the
//! bound argument memory.
//!
//! The driver enforces the rules a real runtime leaves undefined: launching a
//! kernel over memory that is still mapped for the host, or with unbound
//! argument slots, is an error. Every call is counted, and individual calls
//! can be made to fail for error path tests.

use crate::domain::{
    checked_product, ClVersion, DeviceProfile, Direction, HostPtr, ImageHandle, KernelHandle,
    MapAccess, MemHandle, QueueId, ScalarValue, SharingStrategy, SvmCapabilities,
};
use crate::error::{status, DriverError, DriverResult};
use crate::ports::{BufferBacking, ClDriver, DeviceCapabilities, DriverArg, ImageDescriptor};
use parking_lot::Mutex;
use std::alloc::{self, Layout};
use std::collections::{HashMap, HashSet};
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

const OP_COUNT: usize = 15;

/// Alignment of simulated device storage
const REGION_ALIGN: usize = 4096;

/// Driver entry points, for call counting and fault injection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DriverOp {
    SvmAlloc,
    SvmFree,
    SvmMap,
    SvmUnmap,
    CreateBuffer,
    MapBuffer,
    UnmapBuffer,
    ReleaseBuffer,
    CreateImage,
    ReleaseImage,
    CopyBufferToImage,
    CopyImageToBuffer,
    SetKernelArg,
    EnqueueKernel,
    Finish,
}

impl DriverOp {
    pub const ALL: [DriverOp; OP_COUNT] = [
        Self::SvmAlloc,
        Self::SvmFree,
        Self::SvmMap,
        Self::SvmUnmap,
        Self::CreateBuffer,
        Self::MapBuffer,
        Self::UnmapBuffer,
        Self::ReleaseBuffer,
        Self::CreateImage,
        Self::ReleaseImage,
        Self::CopyBufferToImage,
        Self::CopyImageToBuffer,
        Self::SetKernelArg,
        Self::EnqueueKernel,
        Self::Finish,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// Snapshot of driver call counts
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallCounts([u64; OP_COUNT]);

impl CallCounts {
    pub fn get(&self, op: DriverOp) -> u64 {
        self.0[op.index()]
    }

    pub fn total(&self) -> u64 {
        self.0.iter().sum()
    }

    /// Calls made between `earlier` and this snapshot
    pub fn since(&self, earlier: &CallCounts) -> CallCounts {
        let mut delta = [0; OP_COUNT];
        for (i, slot) in delta.iter_mut().enumerate() {
            *slot = self.0[i].saturating_sub(earlier.0[i]);
        }
        CallCounts(delta)
    }

    /// Map and unmap calls of both buffer and SVM flavour
    pub fn map_traffic(&self) -> u64 {
        self.get(DriverOp::MapBuffer)
            + self.get(DriverOp::UnmapBuffer)
            + self.get(DriverOp::SvmMap)
            + self.get(DriverOp::SvmUnmap)
    }
}

/// Objects currently alive in the driver
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResourceCounts {
    pub buffers: usize,
    pub images: usize,
    pub svm_regions: usize,
}

impl ResourceCounts {
    pub fn is_empty(&self) -> bool {
        self.buffers == 0 && self.images == 0 && self.svm_regions == 0
    }
}

/// Zeroed heap storage standing in for device memory
struct HostRegion {
    ptr: NonNull<u8>,
    layout: Layout,
}

// The region is plain heap memory; access is serialised by the driver lock
// and by the callers' lease protocol.
unsafe impl Send for HostRegion {}
unsafe impl Sync for HostRegion {}

impl HostRegion {
    fn zeroed(size: usize) -> DriverResult<Self> {
        if size == 0 {
            return Err(DriverError::new(status::INVALID_BUFFER_SIZE, "zero-sized region"));
        }
        let layout = Layout::from_size_align(size, REGION_ALIGN)
            .map_err(|e| DriverError::new(status::INVALID_BUFFER_SIZE, e.to_string()))?;
        // SAFETY: layout has a non-zero size
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or_else(|| {
            DriverError::new(status::OUT_OF_HOST_MEMORY, format!("cannot allocate {size} bytes"))
        })?;
        Ok(Self { ptr, layout })
    }

    fn host_ptr(&self) -> HostPtr {
        HostPtr::from_non_null(self.ptr)
    }

    fn len(&self) -> usize {
        self.layout.size()
    }
}

impl Drop for HostRegion {
    fn drop(&mut self) {
        // SAFETY: allocated in `zeroed` with this exact layout
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

enum Storage {
    Owned(HostRegion),
    Borrowed(HostPtr),
}

impl Storage {
    fn ptr(&self) -> HostPtr {
        match self {
            Self::Owned(region) => region.host_ptr(),
            Self::Borrowed(ptr) => *ptr,
        }
    }
}

struct BufferMap {
    access: MapAccess,
    ptr: HostPtr,
    /// Storage of a mapping that was placed away from the buffer
    shadow: Option<HostRegion>,
}

struct SimBuffer {
    size: usize,
    storage: Storage,
    map: Option<BufferMap>,
}

struct SvmRegion {
    region: HostRegion,
    fine: bool,
    mapped: Option<MapAccess>,
}

enum ImageStorage {
    Owned(HostRegion),
    Alias(MemHandle),
}

struct SimImage {
    bytes: usize,
    bytes_per_pixel: usize,
    storage: ImageStorage,
}

type KernelBody = Arc<dyn Fn(&mut KernelInvocation<'_>) -> DriverResult<()> + Send + Sync>;

struct SimKernel {
    name: String,
    arity: u32,
    body: KernelBody,
    args: HashMap<u32, DriverArg>,
}

#[derive(Default)]
struct SimState {
    next_handle: u64,
    svm: HashMap<usize, SvmRegion>,
    buffers: HashMap<MemHandle, SimBuffer>,
    images: HashMap<ImageHandle, SimImage>,
    kernels: HashMap<KernelHandle, SimKernel>,
}

impl SimState {
    fn next_handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn buffer(&self, mem: MemHandle) -> DriverResult<&SimBuffer> {
        self.buffers.get(&mem).ok_or_else(|| unknown_mem(mem))
    }

    fn buffer_mut(&mut self, mem: MemHandle) -> DriverResult<&mut SimBuffer> {
        self.buffers.get_mut(&mem).ok_or_else(|| unknown_mem(mem))
    }

    fn image(&self, image: ImageHandle) -> DriverResult<&SimImage> {
        self.images.get(&image).ok_or_else(|| {
            DriverError::new(status::INVALID_MEM_OBJECT, format!("unknown image {}", image.0))
        })
    }

    fn svm_region(&self, ptr: HostPtr) -> DriverResult<&SvmRegion> {
        self.svm.get(&ptr.addr()).ok_or_else(|| unknown_svm(ptr))
    }

    fn image_storage(&self, image: &SimImage) -> DriverResult<HostPtr> {
        match &image.storage {
            ImageStorage::Owned(region) => Ok(region.host_ptr()),
            ImageStorage::Alias(mem) => Ok(self.buffer(*mem)?.storage.ptr()),
        }
    }

    /// Buffer memory as a kernel sees it, refusing host-mapped memory
    fn kernel_buffer(&self, mem: MemHandle) -> DriverResult<(HostPtr, usize)> {
        let buffer = self.buffer(mem)?;
        if buffer.map.is_some() {
            return Err(DriverError::new(
                status::INVALID_OPERATION,
                format!("buffer {} is mapped for host access", mem.0),
            ));
        }
        let ptr = buffer.storage.ptr();
        if let Some(region) = self.svm.get(&ptr.addr()) {
            ensure_svm_unmapped(ptr, region)?;
        }
        Ok((ptr, buffer.size))
    }

    fn kernel_image(&self, handle: ImageHandle) -> DriverResult<(HostPtr, usize)> {
        let image = self.image(handle)?;
        match &image.storage {
            ImageStorage::Owned(region) => Ok((region.host_ptr(), image.bytes)),
            ImageStorage::Alias(mem) => {
                let (ptr, _) = self.kernel_buffer(*mem)?;
                Ok((ptr, image.bytes))
            }
        }
    }

    fn kernel_svm(&self, ptr: HostPtr) -> DriverResult<(HostPtr, usize)> {
        let region = self.svm_region(ptr)?;
        ensure_svm_unmapped(ptr, region)?;
        Ok((ptr, region.region.len()))
    }
}

fn ensure_svm_unmapped(ptr: HostPtr, region: &SvmRegion) -> DriverResult<()> {
    if !region.fine && region.mapped.is_some() {
        return Err(DriverError::new(
            status::INVALID_OPERATION,
            format!("coarse SVM region {ptr} is mapped for host access"),
        ));
    }
    Ok(())
}

fn unknown_mem(mem: MemHandle) -> DriverError {
    DriverError::new(status::INVALID_MEM_OBJECT, format!("unknown buffer {}", mem.0))
}

fn unknown_svm(ptr: HostPtr) -> DriverError {
    DriverError::new(status::INVALID_VALUE, format!("{ptr} is not an SVM allocation"))
}

#[derive(Default)]
struct Faults {
    fail: HashMap<DriverOp, i32>,
    relocate_next_map: bool,
}

/// Argument memory handed to a simulated kernel
pub enum InvocationArg<'a> {
    Memory(&'a mut [u8]),
    Scalar(ScalarValue),
}

/// One kernel launch as seen by a registered kernel body
pub struct KernelInvocation<'a> {
    global_work: &'a [usize],
    args: Vec<InvocationArg<'a>>,
}

impl<'a> KernelInvocation<'a> {
    pub fn global_work(&self) -> &[usize] {
        self.global_work
    }

    /// Total number of work items
    pub fn work_items(&self) -> usize {
        checked_product(self.global_work).unwrap_or(usize::MAX)
    }

    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    pub fn memory(&self, slot: u32) -> DriverResult<&[u8]> {
        match self.args.get(slot as usize) {
            Some(InvocationArg::Memory(bytes)) => Ok(&**bytes),
            _ => Err(not_memory(slot)),
        }
    }

    pub fn memory_mut(&mut self, slot: u32) -> DriverResult<&mut [u8]> {
        match self.args.get_mut(slot as usize) {
            Some(InvocationArg::Memory(bytes)) => Ok(&mut **bytes),
            _ => Err(not_memory(slot)),
        }
    }

    pub fn scalar(&self, slot: u32) -> DriverResult<ScalarValue> {
        match self.args.get(slot as usize) {
            Some(InvocationArg::Scalar(value)) => Ok(*value),
            _ => Err(DriverError::new(
                status::INVALID_ARG_VALUE,
                format!("slot {slot} is not a scalar"),
            )),
        }
    }

    /// Borrow one slot for reading and another for writing
    pub fn input_output(&mut self, input: u32, output: u32) -> DriverResult<(&[u8], &mut [u8])> {
        let (i, o) = (input as usize, output as usize);
        if i == o || i.max(o) >= self.args.len() {
            return Err(DriverError::new(
                status::INVALID_ARG_INDEX,
                format!("cannot split slots {input} and {output}"),
            ));
        }
        let (low, high) = self.args.split_at_mut(i.max(o));
        let (first, second) = (&mut low[i.min(o)], &mut high[0]);
        let (src, dst) = if i < o { (first, second) } else { (second, first) };
        match (src, dst) {
            (InvocationArg::Memory(src), InvocationArg::Memory(dst)) => Ok((&**src, &mut **dst)),
            _ => Err(not_memory(if i < o { input } else { output })),
        }
    }
}

fn not_memory(slot: u32) -> DriverError {
    DriverError::new(
        status::INVALID_ARG_VALUE,
        format!("slot {slot} is not bound to memory"),
    )
}

/// Host memory backed implementation of [`ClDriver`]
pub struct SimulatedDriver {
    profile: DeviceProfile,
    state: Mutex<SimState>,
    calls: [AtomicU64; OP_COUNT],
    faults: Mutex<Faults>,
}

impl SimulatedDriver {
    pub fn new(profile: DeviceProfile) -> Self {
        Self {
            profile,
            state: Mutex::new(SimState::default()),
            calls: std::array::from_fn(|_| AtomicU64::new(0)),
            faults: Mutex::new(Faults::default()),
        }
    }

    /// OpenCL 2.0 device with coarse and fine grain SVM and image aliasing
    pub fn opencl_2() -> Self {
        Self::new(DeviceProfile::new(
            "Simulated OpenCL 2.0 device",
            ClVersion::V2_0,
            SvmCapabilities::COARSE_GRAIN_BUFFER | SvmCapabilities::FINE_GRAIN_BUFFER,
            1 << 30,
        ))
    }

    /// OpenCL 1.2 device: pinned buffers only, images need explicit copies
    pub fn opencl_1_2() -> Self {
        Self::new(DeviceProfile::new(
            "Simulated OpenCL 1.2 device",
            ClVersion::V1_2,
            SvmCapabilities::NONE,
            1 << 30,
        ))
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    pub fn calls(&self) -> CallCounts {
        let mut counts = [0; OP_COUNT];
        for op in DriverOp::ALL {
            counts[op.index()] = self.calls[op.index()].load(Ordering::Relaxed);
        }
        CallCounts(counts)
    }

    pub fn live_resources(&self) -> ResourceCounts {
        let state = self.state.lock();
        ResourceCounts {
            buffers: state.buffers.len(),
            images: state.images.len(),
            svm_regions: state.svm.len(),
        }
    }

    /// Make the next call of `op` fail with `code`
    pub fn fail_next(&self, op: DriverOp, code: i32) {
        self.faults.lock().fail.insert(op, code);
    }

    /// Place the next buffer mapping at a different host address
    pub fn relocate_next_map(&self) {
        self.faults.lock().relocate_next_map = true;
    }

    /// Register a kernel body taking `arity` arguments
    pub fn register_kernel<F>(&self, name: &str, arity: u32, body: F) -> KernelHandle
    where
        F: Fn(&mut KernelInvocation<'_>) -> DriverResult<()> + Send + Sync + 'static,
    {
        let mut state = self.state.lock();
        let handle = KernelHandle(state.next_handle());
        state.kernels.insert(
            handle,
            SimKernel {
                name: name.to_string(),
                arity,
                body: Arc::new(body),
                args: HashMap::new(),
            },
        );
        handle
    }

    fn enter(&self, op: DriverOp) -> DriverResult<()> {
        self.calls[op.index()].fetch_add(1, Ordering::Relaxed);
        match self.faults.lock().fail.remove(&op) {
            Some(code) => Err(DriverError::new(code, format!("injected failure in {op:?}"))),
            None => Ok(()),
        }
    }

    fn check_size(&self, size: usize) -> DriverResult<()> {
        if size == 0 || size as u64 > self.profile.max_alloc_bytes {
            return Err(DriverError::new(
                status::INVALID_BUFFER_SIZE,
                format!(
                    "size {size} outside 1..={}",
                    self.profile.max_alloc_bytes
                ),
            ));
        }
        Ok(())
    }
}

impl Default for SimulatedDriver {
    fn default() -> Self {
        Self::opencl_2()
    }
}

impl ClDriver for SimulatedDriver {
    fn svm_alloc(&self, _access: Direction, fine_grain: bool, size: usize) -> DriverResult<HostPtr> {
        self.enter(DriverOp::SvmAlloc)?;
        let strategy = if fine_grain {
            SharingStrategy::FineGrainSvm
        } else {
            SharingStrategy::CoarseGrainSvm
        };
        if !self.profile.supports_sharing_strategy(strategy) {
            return Err(DriverError::new(
                status::INVALID_OPERATION,
                format!("{strategy} grain SVM is not supported"),
            ));
        }
        self.check_size(size)?;
        let region = HostRegion::zeroed(size)?;
        let ptr = region.host_ptr();
        self.state.lock().svm.insert(
            ptr.addr(),
            SvmRegion {
                region,
                fine: fine_grain,
                mapped: None,
            },
        );
        Ok(ptr)
    }

    fn svm_free(&self, ptr: HostPtr) -> DriverResult<()> {
        self.enter(DriverOp::SvmFree)?;
        self.state
            .lock()
            .svm
            .remove(&ptr.addr())
            .map(drop)
            .ok_or_else(|| unknown_svm(ptr))
    }

    fn enqueue_svm_map(
        &self,
        _queue: QueueId,
        ptr: HostPtr,
        size: usize,
        access: MapAccess,
    ) -> DriverResult<()> {
        self.enter(DriverOp::SvmMap)?;
        let mut state = self.state.lock();
        let region = state.svm.get_mut(&ptr.addr()).ok_or_else(|| unknown_svm(ptr))?;
        if size > region.region.len() {
            return Err(DriverError::new(status::INVALID_VALUE, "map exceeds SVM region"));
        }
        if region.mapped.is_some() {
            return Err(DriverError::new(
                status::INVALID_OPERATION,
                format!("SVM region {ptr} is already mapped"),
            ));
        }
        region.mapped = Some(access);
        Ok(())
    }

    fn enqueue_svm_unmap(&self, _queue: QueueId, ptr: HostPtr) -> DriverResult<()> {
        self.enter(DriverOp::SvmUnmap)?;
        let mut state = self.state.lock();
        let region = state.svm.get_mut(&ptr.addr()).ok_or_else(|| unknown_svm(ptr))?;
        region.mapped.take().map(drop).ok_or_else(|| {
            DriverError::new(
                status::INVALID_OPERATION,
                format!("SVM region {ptr} is not mapped"),
            )
        })
    }

    fn create_buffer(
        &self,
        _access: Direction,
        backing: BufferBacking,
        size: usize,
    ) -> DriverResult<MemHandle> {
        self.enter(DriverOp::CreateBuffer)?;
        self.check_size(size)?;
        let storage = match backing {
            BufferBacking::AllocHostPtr => Storage::Owned(HostRegion::zeroed(size)?),
            BufferBacking::UseHostPtr(ptr) => Storage::Borrowed(ptr),
        };
        let mut state = self.state.lock();
        let handle = MemHandle(state.next_handle());
        state.buffers.insert(
            handle,
            SimBuffer {
                size,
                storage,
                map: None,
            },
        );
        Ok(handle)
    }

    fn enqueue_map_buffer(
        &self,
        _queue: QueueId,
        mem: MemHandle,
        access: MapAccess,
        size: usize,
    ) -> DriverResult<HostPtr> {
        self.enter(DriverOp::MapBuffer)?;
        let relocate = std::mem::take(&mut self.faults.lock().relocate_next_map);
        let mut state = self.state.lock();
        let buffer = state.buffer_mut(mem)?;
        if size > buffer.size {
            return Err(DriverError::new(status::INVALID_VALUE, "map exceeds buffer"));
        }
        if buffer.map.is_some() {
            return Err(DriverError::new(
                status::INVALID_OPERATION,
                format!("buffer {} is already mapped", mem.0),
            ));
        }
        let map = if relocate {
            let shadow = HostRegion::zeroed(buffer.size)?;
            // SAFETY: both regions hold `buffer.size` bytes and are distinct allocations
            unsafe {
                ptr::copy_nonoverlapping(
                    buffer.storage.ptr().as_ptr(),
                    shadow.ptr.as_ptr(),
                    buffer.size,
                )
            };
            debug!("[cl-memory] simulated map of buffer {} relocated", mem.0);
            BufferMap {
                access,
                ptr: shadow.host_ptr(),
                shadow: Some(shadow),
            }
        } else {
            BufferMap {
                access,
                ptr: buffer.storage.ptr(),
                shadow: None,
            }
        };
        let ptr = map.ptr;
        buffer.map = Some(map);
        Ok(ptr)
    }

    fn enqueue_unmap_buffer(
        &self,
        _queue: QueueId,
        mem: MemHandle,
        ptr: HostPtr,
    ) -> DriverResult<()> {
        self.enter(DriverOp::UnmapBuffer)?;
        let mut state = self.state.lock();
        let buffer = state.buffer_mut(mem)?;
        let map = buffer.map.take().ok_or_else(|| {
            DriverError::new(
                status::INVALID_OPERATION,
                format!("buffer {} is not mapped", mem.0),
            )
        })?;
        if map.ptr != ptr {
            buffer.map = Some(map);
            return Err(DriverError::new(
                status::INVALID_VALUE,
                format!("{ptr} is not the mapped address of buffer {}", mem.0),
            ));
        }
        if let Some(shadow) = map.shadow {
            if map.access.writes() {
                // SAFETY: both regions hold `buffer.size` bytes and are distinct allocations
                unsafe {
                    ptr::copy_nonoverlapping(
                        shadow.ptr.as_ptr(),
                        buffer.storage.ptr().as_ptr(),
                        buffer.size,
                    )
                };
            }
        }
        Ok(())
    }

    fn release_buffer(&self, mem: MemHandle) -> DriverResult<()> {
        self.enter(DriverOp::ReleaseBuffer)?;
        self.state
            .lock()
            .buffers
            .remove(&mem)
            .map(drop)
            .ok_or_else(|| unknown_mem(mem))
    }

    fn create_image(&self, descriptor: &ImageDescriptor) -> DriverResult<ImageHandle> {
        self.enter(DriverOp::CreateImage)?;
        let bytes = descriptor.format.image_bytes(&descriptor.dims);
        let mut state = self.state.lock();
        let storage = match descriptor.alias {
            Some(mem) => {
                if !self.profile.supports_buffer_image_aliasing() {
                    return Err(DriverError::new(
                        status::INVALID_OPERATION,
                        "images over buffers need OpenCL 2.0",
                    ));
                }
                if bytes > state.buffer(mem)?.size {
                    return Err(DriverError::new(
                        status::INVALID_IMAGE_SIZE,
                        format!("{} image does not fit buffer {}", descriptor.dims, mem.0),
                    ));
                }
                ImageStorage::Alias(mem)
            }
            None => ImageStorage::Owned(HostRegion::zeroed(bytes).map_err(|e| {
                DriverError::new(status::INVALID_IMAGE_SIZE, e.detail)
            })?),
        };
        let handle = ImageHandle(state.next_handle());
        state.images.insert(
            handle,
            SimImage {
                bytes,
                bytes_per_pixel: descriptor.format.bytes_per_pixel(),
                storage,
            },
        );
        Ok(handle)
    }

    fn release_image(&self, image: ImageHandle) -> DriverResult<()> {
        self.enter(DriverOp::ReleaseImage)?;
        let mut state = self.state.lock();
        state.image(image)?;
        state.images.remove(&image);
        Ok(())
    }

    fn enqueue_copy_buffer_to_image(
        &self,
        _queue: QueueId,
        src: MemHandle,
        dst: ImageHandle,
        region: [usize; 3],
    ) -> DriverResult<()> {
        self.enter(DriverOp::CopyBufferToImage)?;
        let state = self.state.lock();
        let image = state.image(dst)?;
        let buffer = state.buffer(src)?;
        let bytes = region.iter().product::<usize>() * image.bytes_per_pixel;
        if bytes > image.bytes || bytes > buffer.size {
            return Err(DriverError::new(status::INVALID_VALUE, "copy region out of bounds"));
        }
        let dst_ptr = state.image_storage(image)?;
        // SAFETY: both ranges lie within live storage; `copy` tolerates the
        // overlap of an image aliasing its own buffer
        unsafe { ptr::copy(buffer.storage.ptr().as_ptr(), dst_ptr.as_ptr(), bytes) };
        Ok(())
    }

    fn enqueue_copy_image_to_buffer(
        &self,
        _queue: QueueId,
        src: ImageHandle,
        dst: MemHandle,
        region: [usize; 3],
    ) -> DriverResult<()> {
        self.enter(DriverOp::CopyImageToBuffer)?;
        let state = self.state.lock();
        let image = state.image(src)?;
        let buffer = state.buffer(dst)?;
        let bytes = region.iter().product::<usize>() * image.bytes_per_pixel;
        if bytes > image.bytes || bytes > buffer.size {
            return Err(DriverError::new(status::INVALID_VALUE, "copy region out of bounds"));
        }
        let src_ptr = state.image_storage(image)?;
        // SAFETY: see `enqueue_copy_buffer_to_image`
        unsafe { ptr::copy(src_ptr.as_ptr(), buffer.storage.ptr().as_ptr(), bytes) };
        Ok(())
    }

    fn set_kernel_arg(&self, kernel: KernelHandle, slot: u32, arg: DriverArg) -> DriverResult<()> {
        self.enter(DriverOp::SetKernelArg)?;
        let mut state = self.state.lock();
        match arg {
            DriverArg::Buffer(mem) => {
                state.buffer(mem)?;
            }
            DriverArg::Image(image) => {
                state.image(image)?;
            }
            DriverArg::SvmPointer(ptr) => {
                state.svm_region(ptr)?;
            }
            DriverArg::Scalar(_) => {}
        }
        let sim = state.kernels.get_mut(&kernel).ok_or_else(|| {
            DriverError::new(status::INVALID_KERNEL, format!("unknown kernel {}", kernel.0))
        })?;
        if slot >= sim.arity {
            return Err(DriverError::new(
                status::INVALID_ARG_INDEX,
                format!("kernel '{}' takes {} arguments", sim.name, sim.arity),
            ));
        }
        sim.args.insert(slot, arg);
        Ok(())
    }

    fn enqueue_kernel(
        &self,
        _queue: QueueId,
        kernel: KernelHandle,
        global_work: &[usize],
        local_work: Option<&[usize]>,
    ) -> DriverResult<()> {
        self.enter(DriverOp::EnqueueKernel)?;
        if global_work.is_empty()
            || global_work.len() > 3
            || local_work.is_some_and(|local| local.len() != global_work.len())
        {
            return Err(DriverError::new(
                status::INVALID_WORK_DIMENSION,
                format!("bad work size {global_work:?}"),
            ));
        }
        if global_work.contains(&0) || checked_product(global_work).is_none() {
            return Err(DriverError::new(
                status::INVALID_GLOBAL_WORK_SIZE,
                format!("global work {global_work:?} is empty or overflows"),
            ));
        }

        let state = self.state.lock();
        let sim = state.kernels.get(&kernel).ok_or_else(|| {
            DriverError::new(status::INVALID_KERNEL, format!("unknown kernel {}", kernel.0))
        })?;

        enum Resolved {
            Memory(HostPtr, usize),
            Scalar(ScalarValue),
        }

        let mut resolved = Vec::with_capacity(sim.arity as usize);
        let mut seen = HashSet::new();
        for slot in 0..sim.arity {
            let arg = sim.args.get(&slot).ok_or_else(|| {
                DriverError::new(
                    status::INVALID_KERNEL_ARGS,
                    format!("argument {slot} of kernel '{}' is not set", sim.name),
                )
            })?;
            let (ptr, len) = match *arg {
                DriverArg::Scalar(value) => {
                    resolved.push(Resolved::Scalar(value));
                    continue;
                }
                DriverArg::Buffer(mem) => state.kernel_buffer(mem)?,
                DriverArg::Image(image) => state.kernel_image(image)?,
                DriverArg::SvmPointer(ptr) => state.kernel_svm(ptr)?,
            };
            if !seen.insert(ptr.addr()) {
                return Err(DriverError::new(
                    status::INVALID_KERNEL_ARGS,
                    format!("memory at {ptr} is bound to more than one argument"),
                ));
            }
            resolved.push(Resolved::Memory(ptr, len));
        }

        let args = resolved
            .into_iter()
            .map(|arg| match arg {
                // SAFETY: every region is live while the driver lock is held,
                // is not mapped for the host and appears in exactly one slot
                Resolved::Memory(ptr, len) => InvocationArg::Memory(unsafe {
                    std::slice::from_raw_parts_mut(ptr.as_ptr(), len)
                }),
                Resolved::Scalar(value) => InvocationArg::Scalar(value),
            })
            .collect();

        debug!(
            "[cl-memory] simulated kernel '{}' over {:?}",
            sim.name, global_work
        );
        let body = Arc::clone(&sim.body);
        let mut invocation = KernelInvocation { global_work, args };
        body(&mut invocation)
    }

    fn finish(&self, _queue: QueueId) -> DriverResult<()> {
        self.enter(DriverOp::Finish)
    }
}
