//! Shared fixtures for the integration tests and benchmarks

use std::sync::{Arc, Once};

use cl_memory::{
    AllocationContext, AllocationRequest, Direction, KernelHandle, MemoryAllocation,
    MemoryConfigBuilder, Metrics, SharingStrategy, SimulatedDriver,
};

static LOGGING: Once = Once::new();

/// Install a quiet subscriber once per test binary; `CLMEM_LOG_LEVEL`
/// raises the level when debugging a failure
pub fn init_test_logging() {
    LOGGING.call_once(|| {
        let mut config = cl_telemetry::TelemetryConfig::from_env();
        if std::env::var("CLMEM_LOG_LEVEL").is_err() {
            config.log_level = "warn".to_string();
        }
        let _ = cl_telemetry::init_logging(&config);
    });
}

/// A simulated device with an allocation context and live metrics
pub struct Rig {
    pub driver: Arc<SimulatedDriver>,
    pub context: AllocationContext,
    pub metrics: Arc<Metrics>,
}

impl Rig {
    pub fn new(driver: SimulatedDriver) -> Self {
        Self::with_queues(driver, 1)
    }

    pub fn with_queues(driver: SimulatedDriver, queue_count: u32) -> Self {
        init_test_logging();
        let driver = Arc::new(driver);
        let metrics = Arc::new(Metrics::new());
        let config = MemoryConfigBuilder::new()
            .queue_count(queue_count)
            .build()
            .expect("valid queue count");
        let context = AllocationContext::new(driver.clone(), Arc::new(driver.profile().clone()))
            .with_config(config)
            .expect("valid config")
            .with_metrics(metrics.clone());
        Self {
            driver,
            context,
            metrics,
        }
    }

    pub fn allocate(
        &self,
        size: usize,
        direction: Direction,
        strategy: SharingStrategy,
    ) -> MemoryAllocation {
        MemoryAllocation::create(
            &self.context,
            AllocationRequest::new(size, direction).with_sharing(strategy),
        )
        .expect("allocation")
    }
}

/// `i % 7` for every byte offset
pub fn mod7_pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 7) as u8).collect()
}

/// `output[i] = input[i] - (i % 7)` over slots 0 (input) and 1 (output)
pub fn register_subtract_mod7(driver: &SimulatedDriver) -> KernelHandle {
    driver.register_kernel("subtract_mod7", 2, |inv| {
        let (input, output) = inv.input_output(0, 1)?;
        for (i, (dst, src)) in output.iter_mut().zip(input).enumerate() {
            *dst = src.wrapping_sub((i % 7) as u8);
        }
        Ok(())
    })
}

/// Reads every byte of slot 0 and writes it back unchanged
pub fn register_identity(driver: &SimulatedDriver) -> KernelHandle {
    driver.register_kernel("identity", 1, |inv| {
        let data = inv.memory_mut(0)?;
        for byte in data.iter_mut() {
            *byte = std::hint::black_box(*byte);
        }
        Ok(())
    })
}
