//! Value types shared by every layer

use crate::error::MemoryError;
use std::fmt;
use std::ptr::NonNull;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Declared data direction of an allocation with respect to kernel execution
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl Direction {
    pub const ALL: [Direction; 3] = [Self::ReadOnly, Self::WriteOnly, Self::ReadWrite];

    pub fn is_readable(self) -> bool {
        matches!(self, Self::ReadOnly | Self::ReadWrite)
    }

    pub fn is_writable(self) -> bool {
        matches!(self, Self::WriteOnly | Self::ReadWrite)
    }

    /// Host side direction of the implicit map made when a host-pinned
    /// buffer is materialized.
    ///
    /// A buffer the kernel only reads is filled by the host, a buffer the
    /// kernel only writes is read back by the host.
    pub fn host_counterpart(self) -> Direction {
        match self {
            Self::ReadOnly => Self::WriteOnly,
            Self::WriteOnly => Self::ReadOnly,
            Self::ReadWrite => Self::ReadWrite,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::ReadOnly => "readonly",
            Self::WriteOnly => "writeonly",
            Self::ReadWrite => "readwrite",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Direction {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['_', '-'], "").as_str() {
            "readonly" | "read" => Ok(Self::ReadOnly),
            "writeonly" | "write" => Ok(Self::WriteOnly),
            "readwrite" => Ok(Self::ReadWrite),
            other => Err(MemoryError::InvalidRequest(format!(
                "unknown direction '{other}'"
            ))),
        }
    }
}

/// How host and device see the same bytes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SharingStrategy {
    /// Host-pinned device buffer, mapped into host address space on demand
    None,
    /// Shared virtual memory that must be mapped before host access
    CoarseGrainSvm,
    /// Shared virtual memory that host and device address concurrently
    FineGrainSvm,
}

impl SharingStrategy {
    pub const ALL: [SharingStrategy; 3] =
        [Self::None, Self::CoarseGrainSvm, Self::FineGrainSvm];

    pub fn is_svm(self) -> bool {
        !matches!(self, Self::None)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::CoarseGrainSvm => "coarse",
            Self::FineGrainSvm => "fine",
        }
    }
}

impl fmt::Display for SharingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SharingStrategy {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "pinned" => Ok(Self::None),
            "coarse" | "coarse_grain" | "coarse-grain" => Ok(Self::CoarseGrainSvm),
            "fine" | "fine_grain" | "fine-grain" => Ok(Self::FineGrainSvm),
            other => Err(MemoryError::InvalidRequest(format!(
                "unknown sharing strategy '{other}'"
            ))),
        }
    }
}

/// Access qualifier declared on a kernel parameter
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AccessQualifier {
    /// No qualifier, or `read_write`
    #[default]
    None,
    ReadOnly,
    WriteOnly,
}

impl FromStr for AccessQualifier {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches("__").to_ascii_lowercase().as_str() {
            "" | "none" | "read_write" | "readwrite" => Ok(Self::None),
            "read_only" | "readonly" => Ok(Self::ReadOnly),
            "write_only" | "writeonly" => Ok(Self::WriteOnly),
            other => Err(MemoryError::InvalidRequest(format!(
                "unknown access qualifier '{other}'"
            ))),
        }
    }
}

/// Access requested when mapping device memory into host address space
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MapAccess {
    Read,
    Write,
    ReadWrite,
    /// Write without preserving the previous contents
    WriteInvalidateRegion,
}

impl MapAccess {
    /// Map access for a host lease in the given direction.
    ///
    /// Write-only leases keep the existing contents so partially written
    /// buffers stay intact.
    pub fn for_host(direction: Direction) -> Self {
        match direction {
            Direction::ReadOnly => Self::Read,
            Direction::WriteOnly => Self::Write,
            Direction::ReadWrite => Self::ReadWrite,
        }
    }

    /// Map access of the implicit map made at materialization
    pub fn initial_for(declared: Direction) -> Self {
        match declared {
            Direction::ReadOnly => Self::WriteInvalidateRegion,
            Direction::WriteOnly => Self::Read,
            Direction::ReadWrite => Self::ReadWrite,
        }
    }

    pub fn reads(self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    pub fn writes(self) -> bool {
        !matches!(self, Self::Read)
    }
}

/// Identifies one of the device command queues
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueueId(pub u32);

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q{}", self.0)
    }
}

/// Driver handle to a device buffer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MemHandle(pub u64);

/// Driver handle to a device image
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ImageHandle(pub u64);

/// Driver handle to a compiled kernel
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct KernelHandle(pub u64);

/// Host address of shared or mapped memory
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HostPtr(NonNull<u8>);

// The pointer is an address handed out by the driver; synchronising access to
// the bytes behind it is the job of the lease state machine.
unsafe impl Send for HostPtr {}
unsafe impl Sync for HostPtr {}

impl HostPtr {
    pub fn new(ptr: *mut u8) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    pub fn from_non_null(ptr: NonNull<u8>) -> Self {
        Self(ptr)
    }

    pub fn as_ptr(self) -> *mut u8 {
        self.0.as_ptr()
    }

    pub fn addr(self) -> usize {
        self.0.as_ptr() as usize
    }
}

impl fmt::Display for HostPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.addr())
    }
}

/// Process-unique allocation identity
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AllocationId(u64);

static NEXT_ALLOCATION_ID: AtomicU64 = AtomicU64::new(1);

impl AllocationId {
    pub fn next() -> Self {
        Self(NEXT_ALLOCATION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for AllocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "alloc#{}", self.0)
    }
}

/// Width, height and depth of an image view, one to three positive extents
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ImageDims {
    extents: [usize; 3],
    rank: usize,
}

impl ImageDims {
    pub fn from_slice(dims: &[usize]) -> Result<Self, MemoryError> {
        if dims.is_empty() || dims.len() > 3 {
            return Err(MemoryError::InvalidImageDimensions(format!(
                "expected 1 to 3 extents, got {}",
                dims.len()
            )));
        }
        if let Some(zero) = dims.iter().position(|&d| d == 0) {
            return Err(MemoryError::InvalidImageDimensions(format!(
                "extent {zero} is zero"
            )));
        }
        if checked_product(dims).is_none() {
            return Err(MemoryError::InvalidImageDimensions(format!(
                "{dims:?} overflows the pixel count"
            )));
        }
        let mut extents = [1; 3];
        extents[..dims.len()].copy_from_slice(dims);
        Ok(Self {
            extents,
            rank: dims.len(),
        })
    }

    pub fn d2(width: usize, height: usize) -> Result<Self, MemoryError> {
        Self::from_slice(&[width, height])
    }

    pub fn d3(width: usize, height: usize, depth: usize) -> Result<Self, MemoryError> {
        Self::from_slice(&[width, height, depth])
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.extents[..self.rank]
    }

    /// Copy region with missing extents padded to 1
    pub fn region(&self) -> [usize; 3] {
        self.extents
    }

    pub fn pixel_count(&self) -> usize {
        checked_product(&self.extents).unwrap_or(usize::MAX)
    }
}

/// Product of `extents`, `None` on overflow
pub fn checked_product(extents: &[usize]) -> Option<usize> {
    extents.iter().try_fold(1usize, |acc, &n| acc.checked_mul(n))
}

impl fmt::Display for ImageDims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.as_slice().iter().map(usize::to_string).collect();
        f.write_str(&parts.join("x"))
    }
}

/// Channel layout of an image pixel
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChannelOrder {
    R,
    Rg,
    Rgba,
}

impl ChannelOrder {
    pub fn channels(self) -> usize {
        match self {
            Self::R => 1,
            Self::Rg => 2,
            Self::Rgba => 4,
        }
    }
}

/// Storage type of a single channel
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChannelType {
    UnsignedInt8,
    HalfFloat,
    Float,
}

impl ChannelType {
    pub fn size(self) -> usize {
        match self {
            Self::UnsignedInt8 => 1,
            Self::HalfFloat => 2,
            Self::Float => 4,
        }
    }
}

/// Pixel format of image projections
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ImageFormat {
    pub order: ChannelOrder,
    pub channel_type: ChannelType,
}

impl Default for ImageFormat {
    fn default() -> Self {
        Self {
            order: ChannelOrder::Rgba,
            channel_type: ChannelType::Float,
        }
    }
}

impl ImageFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        self.order.channels() * self.channel_type.size()
    }

    /// Bytes covered by an image of `dims` in this format
    pub fn image_bytes(&self, dims: &ImageDims) -> usize {
        dims.pixel_count().saturating_mul(self.bytes_per_pixel())
    }
}
