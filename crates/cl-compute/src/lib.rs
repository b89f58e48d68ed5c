//! # cl-compute: Backend Selection for cl-memory
//!
//! Picks the driver that `cl-memory` allocations talk to, at **runtime**:
//!
//! 1. **OpenCL** - Real devices through the `ocl` crate (feature `opencl`)
//! 2. **Simulated** - Host memory driver, always available
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cl_compute::auto_detect;
//! use cl_memory::MemoryConfig;
//!
//! let config = MemoryConfig::from_env();
//! let backend = auto_detect(&config)?;
//! println!("Using: {} on {}", backend.backend(), backend.device_name());
//! let context = backend.allocation_context(config)?;
//! ```

pub mod backends;

use cl_memory::{
    AllocationContext, ClDriver, DeviceCapabilities, MemoryConfig, MemoryError, MemoryService,
    SimulatedDriver,
};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Driver implementations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// In-process host memory driver
    Simulated,
    /// OpenCL runtime
    OpenCL,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Simulated => write!(f, "Simulated"),
            Backend::OpenCL => write!(f, "OpenCL"),
        }
    }
}

impl FromStr for Backend {
    type Err = ComputeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "simulated" | "sim" => Ok(Backend::Simulated),
            "opencl" | "ocl" => Ok(Backend::OpenCL),
            other => Err(ComputeError::InvalidInput(format!("unknown backend '{other}'"))),
        }
    }
}

/// Compute backend errors
#[derive(Error, Debug)]
pub enum ComputeError {
    #[error("No compute backend available")]
    NoBackendAvailable,

    #[error("Backend initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

/// A driver together with the description of the device behind it
#[derive(Clone)]
pub struct ComputeBackend {
    backend: Backend,
    driver: Arc<dyn ClDriver>,
    capabilities: Arc<dyn DeviceCapabilities>,
}

impl ComputeBackend {
    pub fn new(
        backend: Backend,
        driver: Arc<dyn ClDriver>,
        capabilities: Arc<dyn DeviceCapabilities>,
    ) -> Self {
        Self {
            backend,
            driver,
            capabilities,
        }
    }

    /// Wrap a simulated driver the caller keeps a handle to, e.g. to
    /// register kernels
    pub fn simulated(driver: Arc<SimulatedDriver>) -> Self {
        let capabilities = Arc::new(driver.profile().clone());
        Self::new(Backend::Simulated, driver, capabilities)
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn driver(&self) -> &Arc<dyn ClDriver> {
        &self.driver
    }

    pub fn capabilities(&self) -> &Arc<dyn DeviceCapabilities> {
        &self.capabilities
    }

    pub fn device_name(&self) -> &str {
        self.capabilities.device_name()
    }

    /// Allocation context over this backend's driver
    pub fn allocation_context(&self, config: MemoryConfig) -> Result<AllocationContext, ComputeError> {
        let context = AllocationContext::new(self.driver.clone(), self.capabilities.clone())
            .with_config(config)?;
        Ok(context)
    }

    pub fn memory_service(&self, config: MemoryConfig) -> Result<MemoryService, ComputeError> {
        Ok(MemoryService::new(self.allocation_context(config)?))
    }
}

impl std::fmt::Debug for ComputeBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeBackend")
            .field("backend", &self.backend)
            .field("device", &self.capabilities.device_name())
            .finish()
    }
}

/// Auto-detect and create the best available backend
pub fn auto_detect(config: &MemoryConfig) -> Result<ComputeBackend, ComputeError> {
    config.validate()?;

    #[cfg(feature = "opencl")]
    {
        match backends::opencl::OpenClDriver::new(config.queue_count) {
            Ok(driver) => {
                tracing::info!("[cl-compute] OpenCL device detected: {}", driver.profile().name);
                return Ok(backends::opencl::into_backend(driver));
            }
            Err(e) => {
                tracing::debug!("[cl-compute] OpenCL not available: {}", e);
            }
        }
    }

    let backend = ComputeBackend::simulated(Arc::new(backends::simulated::host_driver()));
    tracing::info!("[cl-compute] Using simulated driver: {}", backend.device_name());
    Ok(backend)
}

/// Create a specific backend
pub fn create_backend(backend: Backend, config: &MemoryConfig) -> Result<ComputeBackend, ComputeError> {
    config.validate()?;
    match backend {
        Backend::Simulated => Ok(ComputeBackend::simulated(Arc::new(
            backends::simulated::host_driver(),
        ))),
        Backend::OpenCL => {
            #[cfg(feature = "opencl")]
            {
                backends::opencl::OpenClDriver::new(config.queue_count)
                    .map(backends::opencl::into_backend)
            }
            #[cfg(not(feature = "opencl"))]
            {
                Err(ComputeError::NoBackendAvailable)
            }
        }
    }
}

/// Backend named by `CLMEM_BACKEND`, auto-detected when unset
pub fn from_env(config: &MemoryConfig) -> Result<ComputeBackend, ComputeError> {
    match std::env::var("CLMEM_BACKEND") {
        Ok(name) => create_backend(name.parse()?, config),
        Err(_) => auto_detect(config),
    }
}
