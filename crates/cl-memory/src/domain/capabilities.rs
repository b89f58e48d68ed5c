//! Device capability profile
//!
//! A `DeviceProfile` is the static description of a device that the
//! allocation layer consults when choosing a sharing strategy and when
//! deciding whether image projections may alias their buffer.

use crate::domain::SharingStrategy;
use crate::error::MemoryError;
use crate::ports::DeviceCapabilities;
use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

/// OpenCL platform version
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClVersion {
    pub major: u16,
    pub minor: u16,
}

impl ClVersion {
    pub const V1_2: ClVersion = ClVersion::new(1, 2);
    pub const V2_0: ClVersion = ClVersion::new(2, 0);

    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    /// Images created over an existing buffer share its storage from 2.0 on
    pub fn supports_image_aliasing(&self) -> bool {
        *self >= Self::V2_0
    }
}

impl fmt::Display for ClVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for ClVersion {
    type Err = MemoryError;

    /// Parses `"2.0"` as well as driver strings such as
    /// `"OpenCL 1.2 CUDA 11.4.120"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || MemoryError::InvalidRequest(format!("unrecognised OpenCL version '{s}'"));

        let token = s
            .split_whitespace()
            .find(|t| t.chars().next().is_some_and(|c| c.is_ascii_digit()))
            .ok_or_else(invalid)?;
        let mut parts = token.split('.');
        let major = parts
            .next()
            .and_then(|p| p.parse::<u16>().ok())
            .ok_or_else(invalid)?;
        let minor_digits: String = parts
            .next()
            .unwrap_or("0")
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        let minor = minor_digits.parse::<u16>().map_err(|_| invalid())?;
        Ok(Self::new(major, minor))
    }
}

/// SVM capability bits as reported by `CL_DEVICE_SVM_CAPABILITIES`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SvmCapabilities(u64);

impl SvmCapabilities {
    pub const NONE: SvmCapabilities = SvmCapabilities(0);
    pub const COARSE_GRAIN_BUFFER: SvmCapabilities = SvmCapabilities(1 << 0);
    pub const FINE_GRAIN_BUFFER: SvmCapabilities = SvmCapabilities(1 << 1);
    pub const FINE_GRAIN_SYSTEM: SvmCapabilities = SvmCapabilities(1 << 2);
    pub const ATOMICS: SvmCapabilities = SvmCapabilities(1 << 3);

    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    /// True when every bit of `other` is set
    pub const fn contains(self, other: SvmCapabilities) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for SvmCapabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Static description of a compute device
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceProfile {
    pub name: String,
    pub version: ClVersion,
    pub svm: SvmCapabilities,
    pub max_alloc_bytes: u64,
}

impl DeviceProfile {
    pub fn new(
        name: impl Into<String>,
        version: ClVersion,
        svm: SvmCapabilities,
        max_alloc_bytes: u64,
    ) -> Self {
        Self {
            name: name.into(),
            version,
            svm,
            max_alloc_bytes,
        }
    }
}

impl DeviceCapabilities for DeviceProfile {
    fn device_name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> ClVersion {
        self.version
    }

    fn supports_sharing_strategy(&self, strategy: SharingStrategy) -> bool {
        // SVM needs a 2.0 platform even if the device advertises the bits
        match strategy {
            SharingStrategy::None => true,
            SharingStrategy::CoarseGrainSvm => {
                self.version >= ClVersion::V2_0
                    && self.svm.contains(SvmCapabilities::COARSE_GRAIN_BUFFER)
            }
            SharingStrategy::FineGrainSvm => {
                self.version >= ClVersion::V2_0
                    && self.svm.contains(SvmCapabilities::FINE_GRAIN_BUFFER)
            }
        }
    }

    fn supports_buffer_image_aliasing(&self) -> bool {
        self.version.supports_image_aliasing()
    }

    fn max_alloc_bytes(&self) -> u64 {
        self.max_alloc_bytes
    }
}
