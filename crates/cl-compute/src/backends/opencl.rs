//! OpenCL backend
//!
//! `ClDriver` over the `ocl` crate's core API. Handles handed to
//! `cl-memory` are keys into a registry of live OpenCL objects; mappings are
//! kept there until unmapped.
//!
//! NOTE: Shared virtual memory is not exposed through this adapter, so the
//! device profile reports no SVM capability and allocations use pinned
//! buffers.

use std::collections::HashMap;
use std::ffi::CString;
use std::sync::Arc;

use cl_memory::domain::{ChannelOrder, ChannelType, ImageHandle, MapAccess, MemHandle, QueueId};
use cl_memory::error::{status, DriverError, DriverResult};
use cl_memory::ports::{BufferBacking, DriverArg, ImageDescriptor};
use cl_memory::{
    ClDriver, ClVersion, DeviceProfile, Direction, HostPtr, KernelHandle, ScalarValue,
    SvmCapabilities,
};
use ocl::core;
use ocl::flags::{MapFlags, MemFlags};
use parking_lot::Mutex;

use crate::{Backend, ComputeBackend, ComputeError};

fn cl_error(e: core::Error) -> DriverError {
    let code = e
        .api_status()
        .map(|s| s as i32)
        .unwrap_or(status::OUT_OF_RESOURCES);
    DriverError::new(code, e.to_string())
}

fn no_svm() -> DriverError {
    DriverError::new(
        status::INVALID_OPERATION,
        "shared virtual memory is not available through the OpenCL backend",
    )
}

fn mem_flags(access: Direction) -> MemFlags {
    match access {
        Direction::ReadOnly => MemFlags::new().read_only(),
        Direction::WriteOnly => MemFlags::new().write_only(),
        Direction::ReadWrite => MemFlags::new().read_write(),
    }
}

fn map_flags(access: MapAccess) -> MapFlags {
    match access {
        MapAccess::Read => MapFlags::new().read(),
        MapAccess::Write => MapFlags::new().write(),
        MapAccess::ReadWrite => MapFlags::new().read().write(),
        MapAccess::WriteInvalidateRegion => MapFlags::new().write_invalidate_region(),
    }
}

#[derive(Default)]
struct Registry {
    next: u64,
    buffers: HashMap<MemHandle, core::Mem>,
    maps: HashMap<MemHandle, core::MemMap<u8>>,
    images: HashMap<ImageHandle, core::Mem>,
    kernels: HashMap<KernelHandle, core::Kernel>,
}

impl Registry {
    fn next_handle(&mut self) -> u64 {
        self.next += 1;
        self.next
    }

    fn buffer(&self, mem: MemHandle) -> DriverResult<&core::Mem> {
        self.buffers.get(&mem).ok_or_else(|| {
            DriverError::new(status::INVALID_MEM_OBJECT, format!("unknown buffer {}", mem.0))
        })
    }

    fn image(&self, image: ImageHandle) -> DriverResult<&core::Mem> {
        self.images.get(&image).ok_or_else(|| {
            DriverError::new(status::INVALID_MEM_OBJECT, format!("unknown image {}", image.0))
        })
    }

    fn kernel(&self, kernel: KernelHandle) -> DriverResult<&core::Kernel> {
        self.kernels.get(&kernel).ok_or_else(|| {
            DriverError::new(status::INVALID_KERNEL, format!("unknown kernel {}", kernel.0))
        })
    }
}

/// OpenCL device driven through `ocl::core`
pub struct OpenClDriver {
    profile: DeviceProfile,
    context: core::Context,
    device: core::DeviceId,
    queues: Vec<core::CommandQueue>,
    registry: Mutex<Registry>,
}

impl OpenClDriver {
    /// Open the first GPU (or any device) of the first platform with
    /// `queue_count` in-order command queues
    pub fn new(queue_count: u32) -> Result<Self, ComputeError> {
        let init = |e: core::Error| ComputeError::InitializationFailed(e.to_string());

        let platform_ids = core::get_platform_ids().map_err(|e| {
            ComputeError::InitializationFailed(format!(
                "Failed to get OpenCL platforms: {}. Is OpenCL installed?",
                e
            ))
        })?;
        let platform = platform_ids.first().cloned().ok_or_else(|| {
            ComputeError::InitializationFailed("No OpenCL platform found".to_string())
        })?;

        let device = core::get_device_ids(&platform, Some(ocl::flags::DeviceType::GPU), None)
            .ok()
            .and_then(|ids| ids.into_iter().next())
            .or_else(|| {
                core::get_device_ids(&platform, None, None)
                    .ok()?
                    .into_iter()
                    .next()
            })
            .ok_or_else(|| ComputeError::InitializationFailed("No OpenCL device found".into()))?;

        let context = core::create_context(None, &[device], None, None).map_err(init)?;
        let queues = (0..queue_count)
            .map(|_| core::create_command_queue(&context, &device, None))
            .collect::<Result<Vec<_>, _>>()
            .map_err(init)?;

        let profile = Self::query_profile(&device)?;
        tracing::info!(
            "[cl-compute] Opened {} (OpenCL {}) with {} queue(s)",
            profile.name,
            profile.version,
            queue_count
        );
        Ok(Self {
            profile,
            context,
            device,
            queues,
            registry: Mutex::new(Registry::default()),
        })
    }

    fn query_profile(device: &core::DeviceId) -> Result<DeviceProfile, ComputeError> {
        let name = core::get_device_info(device, core::DeviceInfo::Name)
            .map(|info| info.to_string())
            .unwrap_or_else(|_| "Unknown".to_string());
        let version: ClVersion = core::get_device_info(device, core::DeviceInfo::Version)
            .map_err(|e| ComputeError::InitializationFailed(e.to_string()))?
            .to_string()
            .parse()?;
        let max_alloc = match core::get_device_info(device, core::DeviceInfo::MaxMemAllocSize) {
            Ok(core::DeviceInfoResult::MaxMemAllocSize(n)) => n,
            _ => 0,
        };
        Ok(DeviceProfile::new(name, version, SvmCapabilities::NONE, max_alloc))
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    /// Build `source` and create the kernel called `name` from it
    pub fn create_kernel(&self, source: &str, name: &str) -> DriverResult<KernelHandle> {
        let invalid = |e: std::ffi::NulError| DriverError::new(status::INVALID_VALUE, e.to_string());
        let src = CString::new(source).map_err(invalid)?;
        let program = core::create_program_with_source(&self.context, &[src]).map_err(cl_error)?;
        let options = CString::new("").map_err(invalid)?;
        core::build_program(&program, Some(&[self.device]), &options, None, None)
            .map_err(cl_error)?;
        let kernel = core::create_kernel(&program, name).map_err(cl_error)?;

        let mut registry = self.registry.lock();
        let handle = KernelHandle(registry.next_handle());
        registry.kernels.insert(handle, kernel);
        tracing::debug!("[cl-compute] Built kernel '{}' as {}", name, handle.0);
        Ok(handle)
    }

    fn queue(&self, queue: QueueId) -> DriverResult<&core::CommandQueue> {
        self.queues.get(queue.0 as usize).ok_or_else(|| {
            DriverError::new(
                status::INVALID_COMMAND_QUEUE,
                format!("{} outside {} queue(s)", queue, self.queues.len()),
            )
        })
    }
}

/// Wrap an opened driver as a backend
pub fn into_backend(driver: OpenClDriver) -> ComputeBackend {
    let capabilities = Arc::new(driver.profile.clone());
    ComputeBackend::new(Backend::OpenCL, Arc::new(driver), capabilities)
}

fn set_scalar<T: ocl::OclPrm>(kernel: &core::Kernel, slot: u32, value: T) -> DriverResult<()> {
    core::set_kernel_arg(kernel, slot, core::ArgVal::scalar(&value)).map_err(cl_error)
}

/// Pad a work size to three dimensions
fn work_dims(sizes: &[usize], pad: usize) -> DriverResult<[usize; 3]> {
    if sizes.is_empty() || sizes.len() > 3 {
        return Err(DriverError::new(
            status::INVALID_WORK_DIMENSION,
            format!("{} work dimensions", sizes.len()),
        ));
    }
    let mut dims = [pad; 3];
    dims[..sizes.len()].copy_from_slice(sizes);
    Ok(dims)
}

impl ClDriver for OpenClDriver {
    fn svm_alloc(&self, _access: Direction, _fine_grain: bool, _size: usize) -> DriverResult<HostPtr> {
        Err(no_svm())
    }

    fn svm_free(&self, _ptr: HostPtr) -> DriverResult<()> {
        Err(no_svm())
    }

    fn enqueue_svm_map(
        &self,
        _queue: QueueId,
        _ptr: HostPtr,
        _size: usize,
        _access: MapAccess,
    ) -> DriverResult<()> {
        Err(no_svm())
    }

    fn enqueue_svm_unmap(&self, _queue: QueueId, _ptr: HostPtr) -> DriverResult<()> {
        Err(no_svm())
    }

    fn create_buffer(
        &self,
        access: Direction,
        backing: BufferBacking,
        size: usize,
    ) -> DriverResult<MemHandle> {
        let mem = match backing {
            BufferBacking::AllocHostPtr => unsafe {
                core::create_buffer::<_, u8>(
                    &self.context,
                    mem_flags(access) | MemFlags::new().alloc_host_ptr(),
                    size,
                    None,
                )
            },
            BufferBacking::UseHostPtr(ptr) => unsafe {
                // SAFETY: the caller keeps `size` bytes at `ptr` alive until
                // the buffer is released
                let host = std::slice::from_raw_parts(ptr.as_ptr(), size);
                core::create_buffer(
                    &self.context,
                    mem_flags(access) | MemFlags::new().use_host_ptr(),
                    size,
                    Some(host),
                )
            },
        }
        .map_err(cl_error)?;

        let mut registry = self.registry.lock();
        let handle = MemHandle(registry.next_handle());
        registry.buffers.insert(handle, mem);
        Ok(handle)
    }

    fn enqueue_map_buffer(
        &self,
        queue: QueueId,
        mem: MemHandle,
        access: MapAccess,
        size: usize,
    ) -> DriverResult<HostPtr> {
        let queue = self.queue(queue)?;
        let mut registry = self.registry.lock();
        if registry.maps.contains_key(&mem) {
            return Err(DriverError::new(
                status::INVALID_OPERATION,
                format!("buffer {} is already mapped", mem.0),
            ));
        }
        let buffer = registry.buffer(mem)?;
        let map = unsafe {
            core::enqueue_map_buffer::<u8, _, _, _>(
                queue,
                buffer,
                true,
                map_flags(access),
                0,
                size,
                None::<&core::Event>,
                None::<&mut core::Event>,
            )
        }
        .map_err(cl_error)?;
        let ptr = HostPtr::new(map.as_ptr() as *mut u8)
            .ok_or_else(|| DriverError::new(status::MAP_FAILURE, "driver returned a null mapping"))?;
        registry.maps.insert(mem, map);
        Ok(ptr)
    }

    fn enqueue_unmap_buffer(&self, queue: QueueId, mem: MemHandle, ptr: HostPtr) -> DriverResult<()> {
        let queue = self.queue(queue)?;
        let mut registry = self.registry.lock();
        let map = registry.maps.remove(&mem).ok_or_else(|| {
            DriverError::new(status::INVALID_VALUE, format!("buffer {} is not mapped", mem.0))
        })?;
        if map.as_ptr() as usize != ptr.addr() {
            registry.maps.insert(mem, map);
            return Err(DriverError::new(
                status::INVALID_VALUE,
                format!("{} is not the mapping of buffer {}", ptr, mem.0),
            ));
        }
        let buffer = registry.buffer(mem)?;
        core::enqueue_unmap_mem_object(
            queue,
            buffer,
            &map,
            None::<&core::Event>,
            None::<&mut core::Event>,
        )
        .map_err(cl_error)
    }

    fn release_buffer(&self, mem: MemHandle) -> DriverResult<()> {
        let mut registry = self.registry.lock();
        registry.maps.remove(&mem);
        registry
            .buffers
            .remove(&mem)
            .map(drop)
            .ok_or_else(|| DriverError::new(status::INVALID_MEM_OBJECT, format!("unknown buffer {}", mem.0)))
    }

    fn create_image(&self, descriptor: &ImageDescriptor) -> DriverResult<ImageHandle> {
        let order = match descriptor.format.order {
            ChannelOrder::R => core::ImageChannelOrder::R,
            ChannelOrder::Rg => core::ImageChannelOrder::Rg,
            ChannelOrder::Rgba => core::ImageChannelOrder::Rgba,
        };
        let data_type = match descriptor.format.channel_type {
            ChannelType::UnsignedInt8 => core::ImageChannelDataType::UnsignedInt8,
            ChannelType::HalfFloat => core::ImageChannelDataType::HalfFloat,
            ChannelType::Float => core::ImageChannelDataType::Float,
        };
        let format = core::ImageFormat::new(order, data_type);

        let [width, height, depth] = descriptor.dims.region();
        let image_type = match descriptor.dims.rank() {
            1 => core::MemObjectType::Image1d,
            2 => core::MemObjectType::Image2d,
            _ => core::MemObjectType::Image3d,
        };

        let mut registry = self.registry.lock();
        let alias = match descriptor.alias {
            Some(mem) => Some(registry.buffer(mem)?.clone()),
            None => None,
        };
        let desc = core::ImageDescriptor::new(image_type, width, height, depth, 0, 0, 0, alias);
        let image = unsafe {
            core::create_image::<u8, _>(
                &self.context,
                mem_flags(descriptor.access),
                &format,
                &desc,
                None,
                None,
            )
        }
        .map_err(cl_error)?;

        let handle = ImageHandle(registry.next_handle());
        registry.images.insert(handle, image);
        Ok(handle)
    }

    fn release_image(&self, image: ImageHandle) -> DriverResult<()> {
        self.registry
            .lock()
            .images
            .remove(&image)
            .map(drop)
            .ok_or_else(|| DriverError::new(status::INVALID_MEM_OBJECT, format!("unknown image {}", image.0)))
    }

    fn enqueue_copy_buffer_to_image(
        &self,
        queue: QueueId,
        src: MemHandle,
        dst: ImageHandle,
        region: [usize; 3],
    ) -> DriverResult<()> {
        let queue = self.queue(queue)?;
        let registry = self.registry.lock();
        core::enqueue_copy_buffer_to_image::<u8, _, _, _>(
            queue,
            registry.buffer(src)?,
            registry.image(dst)?,
            0,
            [0, 0, 0],
            region,
            None::<&core::Event>,
            None::<&mut core::Event>,
        )
        .map_err(cl_error)
    }

    fn enqueue_copy_image_to_buffer(
        &self,
        queue: QueueId,
        src: ImageHandle,
        dst: MemHandle,
        region: [usize; 3],
    ) -> DriverResult<()> {
        let queue = self.queue(queue)?;
        let registry = self.registry.lock();
        core::enqueue_copy_image_to_buffer::<u8, _, _, _>(
            queue,
            registry.image(src)?,
            registry.buffer(dst)?,
            [0, 0, 0],
            region,
            0,
            None::<&core::Event>,
            None::<&mut core::Event>,
        )
        .map_err(cl_error)
    }

    fn set_kernel_arg(&self, kernel: KernelHandle, slot: u32, arg: DriverArg) -> DriverResult<()> {
        let registry = self.registry.lock();
        let k = registry.kernel(kernel)?;
        match arg {
            DriverArg::Buffer(mem) => {
                core::set_kernel_arg(k, slot, core::ArgVal::mem(registry.buffer(mem)?))
                    .map_err(cl_error)
            }
            DriverArg::Image(image) => {
                core::set_kernel_arg(k, slot, core::ArgVal::mem(registry.image(image)?))
                    .map_err(cl_error)
            }
            DriverArg::SvmPointer(_) => Err(no_svm()),
            DriverArg::Scalar(value) => match value {
                ScalarValue::Char(v) => set_scalar(k, slot, v),
                ScalarValue::UChar(v) => set_scalar(k, slot, v),
                ScalarValue::Short(v) => set_scalar(k, slot, v),
                ScalarValue::UShort(v) => set_scalar(k, slot, v),
                ScalarValue::Int(v) => set_scalar(k, slot, v),
                ScalarValue::UInt(v) => set_scalar(k, slot, v),
                ScalarValue::Long(v) => set_scalar(k, slot, v),
                ScalarValue::ULong(v) => set_scalar(k, slot, v),
                ScalarValue::Float(v) => set_scalar(k, slot, v),
                ScalarValue::Double(v) => set_scalar(k, slot, v),
            },
        }
    }

    fn enqueue_kernel(
        &self,
        queue: QueueId,
        kernel: KernelHandle,
        global_work: &[usize],
        local_work: Option<&[usize]>,
    ) -> DriverResult<()> {
        let queue = self.queue(queue)?;
        let global = work_dims(global_work, 1)?;
        let local = local_work.map(|l| work_dims(l, 1)).transpose()?;
        let registry = self.registry.lock();
        let k = registry.kernel(kernel)?;
        unsafe {
            core::enqueue_kernel(
                queue,
                k,
                global_work.len() as u32,
                None,
                &global,
                local,
                None::<&core::Event>,
                None::<&mut core::Event>,
            )
        }
        .map_err(cl_error)
    }

    fn finish(&self, queue: QueueId) -> DriverResult<()> {
        core::finish(self.queue(queue)?).map_err(cl_error)
    }
}
