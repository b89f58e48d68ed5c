//! Memory subsystem configuration
//!
//! # Example
//!
//! ```ignore
//! use cl_memory::domain::{MemoryConfigBuilder, SharingStrategy};
//!
//! let config = MemoryConfigBuilder::new()
//!     .queue_count(3)
//!     .default_sharing(SharingStrategy::CoarseGrainSvm)
//!     .build()?;
//! ```

use crate::domain::{ImageFormat, QueueId, SharingStrategy};
use crate::error::MemoryError;
use std::env;

/// Upper bound on command queues per device
pub const MAX_QUEUES: u32 = 16;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryConfig {
    /// Number of device command queues
    pub queue_count: u32,
    /// Queue used by leases that do not name one
    pub default_queue: QueueId,
    /// Strategy used when a request carries no hint; `None` picks the
    /// device's preferred strategy
    pub default_sharing: Option<SharingStrategy>,
    /// Pixel format of image projections
    pub image_format: ImageFormat,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            queue_count: 1,
            default_queue: QueueId(0),
            default_sharing: None,
            image_format: ImageFormat::default(),
        }
    }
}

impl MemoryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `CLMEM_QUEUE_COUNT`: Number of command queues (default: 1)
    /// - `CLMEM_DEFAULT_QUEUE`: Default queue index (default: 0)
    /// - `CLMEM_SHARING`: `none`, `coarse` or `fine` (default: device preference)
    ///
    /// Unparseable values fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            queue_count: env::var("CLMEM_QUEUE_COUNT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.queue_count),

            default_queue: env::var("CLMEM_DEFAULT_QUEUE")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(QueueId)
                .unwrap_or(defaults.default_queue),

            default_sharing: env::var("CLMEM_SHARING")
                .ok()
                .and_then(|v| v.parse().ok())
                .or(defaults.default_sharing),

            image_format: defaults.image_format,
        }
    }

    pub fn validate(&self) -> Result<(), MemoryError> {
        if self.queue_count == 0 || self.queue_count > MAX_QUEUES {
            return Err(MemoryError::InvalidRequest(format!(
                "queue_count must be between 1 and {MAX_QUEUES}, got {}",
                self.queue_count
            )));
        }
        self.check_queue(self.default_queue)
    }

    /// Reject queue ids outside the configured range
    pub fn check_queue(&self, queue: QueueId) -> Result<(), MemoryError> {
        if queue.0 < self.queue_count {
            Ok(())
        } else {
            Err(MemoryError::InvalidQueue {
                queue,
                count: self.queue_count,
            })
        }
    }
}

/// Fluent builder for [`MemoryConfig`]
#[derive(Debug, Default)]
pub struct MemoryConfigBuilder {
    config: MemoryConfig,
}

impl MemoryConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_count(mut self, count: u32) -> Self {
        self.config.queue_count = count;
        self
    }

    pub fn default_queue(mut self, queue: QueueId) -> Self {
        self.config.default_queue = queue;
        self
    }

    pub fn default_sharing(mut self, strategy: SharingStrategy) -> Self {
        self.config.default_sharing = Some(strategy);
        self
    }

    pub fn image_format(mut self, format: ImageFormat) -> Self {
        self.config.image_format = format;
        self
    }

    pub fn build(self) -> Result<MemoryConfig, MemoryError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
