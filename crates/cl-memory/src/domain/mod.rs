//! Domain layer: lease state machine, image projection policy and value types

pub mod capabilities;
pub mod config;
pub mod image;
pub mod kernel_arg;
pub mod lease;
pub mod types;

pub use capabilities::{ClVersion, DeviceProfile, SvmCapabilities};
pub use config::{MemoryConfig, MemoryConfigBuilder, MAX_QUEUES};
pub use image::{Freshness, ImageProjection};
pub use kernel_arg::{KernelParam, ParamKind, ScalarType, ScalarValue};
pub use lease::{AccessLease, HostMapPlan, LeaseKind, LeaseState};
pub use types::{
    AccessQualifier, AllocationId, ChannelOrder, ChannelType, Direction, HostPtr, ImageDims,
    ImageFormat, ImageHandle, KernelHandle, MapAccess, MemHandle, QueueId, SharingStrategy,
    checked_product,
};
