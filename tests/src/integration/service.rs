//! # Async Memory Service
//!
//! `MemoryApi` over a backend picked through `cl-compute`, driven from
//! concurrent tokio tasks.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use cl_compute::{backends::simulated, create_backend, Backend, ComputeBackend};
    use cl_memory::{
        AccessQualifier, AllocationRequest, Direction, KernelArg, KernelArgs, KernelParam,
        MemoryApi, MemoryConfig, MemoryConfigBuilder, MemoryError, MemoryService, RunOptions,
        SharingStrategy,
    };
    use rand::Rng;

    use crate::fixtures::{init_test_logging, mod7_pattern, register_subtract_mod7};

    fn service() -> Arc<MemoryService> {
        init_test_logging();
        let config = MemoryConfig::default();
        let backend = create_backend(Backend::Simulated, &config).unwrap();
        Arc::new(backend.memory_service(config).unwrap())
    }

    #[tokio::test]
    async fn test_independent_allocations_in_parallel() {
        let service = service();
        let mut handles = Vec::new();
        for task in 0..8u8 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                let strategy = SharingStrategy::ALL[task as usize % 3];
                let allocation = service
                    .create_allocation(
                        AllocationRequest::new(4096, Direction::ReadWrite).with_sharing(strategy),
                    )
                    .await?;
                let data: Vec<u8> = {
                    let mut rng = rand::thread_rng();
                    (0..4096).map(|_| rng.gen()).collect()
                };
                service.write_host(allocation.clone(), data.clone()).await?;
                let snapshot = service.host_snapshot(allocation).await?;
                Ok::<bool, MemoryError>(snapshot == data)
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().unwrap());
        }
    }

    #[tokio::test]
    async fn test_dispatch_between_async_host_rounds() {
        init_test_logging();
        let driver = Arc::new(simulated::host_driver());
        let kernel = register_subtract_mod7(&driver);
        let config = MemoryConfigBuilder::new()
            .default_sharing(SharingStrategy::None)
            .build()
            .unwrap();
        let service = ComputeBackend::simulated(driver)
            .memory_service(config)
            .unwrap();

        let input = service
            .create_allocation(AllocationRequest::new(1024, Direction::ReadWrite))
            .await
            .unwrap();
        let output = service
            .create_allocation(AllocationRequest::new(1024, Direction::ReadWrite))
            .await
            .unwrap();
        service
            .write_host(input.clone(), mod7_pattern(1024))
            .await
            .unwrap();

        let dispatcher = service.dispatcher();
        let (run_input, run_output) = (input.clone(), output.clone());
        tokio::task::spawn_blocking(move || {
            let params = [
                KernelParam::new("input", "uchar*", AccessQualifier::ReadOnly),
                KernelParam::new("output", "uchar*", AccessQualifier::WriteOnly),
            ];
            let args = KernelArgs::new()
                .with("input", KernelArg::Buffer(&run_input))
                .with("output", KernelArg::Buffer(&run_output));
            dispatcher.run(kernel, &params, &args, &RunOptions::new(vec![1024]).no_wait())
        })
        .await
        .unwrap()
        .unwrap();

        let result = service.host_snapshot(output).await.unwrap();
        assert_eq!(result, vec![0u8; 1024]);
    }

    #[tokio::test]
    async fn test_last_handle_destroys_allocation() {
        init_test_logging();
        let driver = Arc::new(simulated::legacy_host_driver());
        let service = ComputeBackend::simulated(driver.clone())
            .memory_service(MemoryConfig::default())
            .unwrap();

        let allocation = service
            .create_allocation(AllocationRequest::new(512, Direction::WriteOnly))
            .await
            .unwrap();
        assert_eq!(allocation.sharing_strategy(), SharingStrategy::None);
        assert_eq!(driver.live_resources().buffers, 1);

        let snapshot = service.host_snapshot(allocation.clone()).await.unwrap();
        assert_eq!(snapshot.len(), 512);
        drop(allocation);
        assert!(driver.live_resources().is_empty());
    }

    #[tokio::test]
    async fn test_rejections_propagate_through_tasks() {
        let service = service();
        let err = service
            .create_allocation(AllocationRequest::new(0, Direction::ReadOnly))
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::AllocationFailure { .. }));

        let allocation = service
            .create_allocation(AllocationRequest::new(16, Direction::ReadOnly))
            .await
            .unwrap();
        let err = service
            .write_host(allocation, vec![1; 17])
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::InvalidRequest(_)));
    }
}
