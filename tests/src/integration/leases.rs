//! # Lease Protocol
//!
//! Host/device exclusion, pointer stability across map cycles, queue
//! tracking and copy avoidance, checked against the simulated driver's call
//! counters.

#[cfg(test)]
mod tests {
    use cl_memory::error::status;
    use cl_memory::{
        AccessQualifier, AllocationRequest, Direction, DriverOp, ImageDims, KernelArgumentBinder,
        LeaseState, MemoryAllocation, MemoryError, QueueId, SharingStrategy, SimulatedDriver,
        SlotBinding,
    };

    use crate::fixtures::Rig;

    // =============================================================================
    // MUTUAL EXCLUSION
    // =============================================================================

    #[test]
    fn test_device_lease_refused_while_host_holds() {
        for strategy in SharingStrategy::ALL {
            let rig = Rig::new(SimulatedDriver::opencl_2());
            let target = rig.allocate(64, Direction::ReadWrite, strategy);
            let host = target.acquire_host_lease(Direction::ReadOnly).unwrap();
            let before = rig.driver.calls();

            let err = target.acquire_device_lease().unwrap_err();
            assert!(matches!(
                err,
                MemoryError::LockViolation {
                    state: LeaseState::HostLeased,
                    ..
                }
            ));
            assert_eq!(target.lease_state(), LeaseState::HostLeased);
            assert_eq!(rig.driver.calls().since(&before).total(), 0);
            drop(host);
        }
    }

    #[test]
    fn test_host_lease_refused_while_device_holds() {
        let rig = Rig::new(SimulatedDriver::opencl_2());
        let target = rig.allocate(64, Direction::ReadWrite, SharingStrategy::None);
        let device = target.acquire_device_lease().unwrap();

        for direction in Direction::ALL {
            let err = target.acquire_host_lease(direction).unwrap_err();
            assert!(matches!(err, MemoryError::LockViolation { .. }));
        }
        assert_eq!(target.lease_state(), LeaseState::DeviceLeased);
        assert_eq!(rig.metrics.snapshot().lock_violations, 3);

        device.release().unwrap();
        assert!(target.acquire_host_lease(Direction::ReadWrite).is_ok());
    }

    #[test]
    fn test_second_host_lease_is_a_violation() {
        let rig = Rig::new(SimulatedDriver::opencl_2());
        let target = rig.allocate(64, Direction::ReadWrite, SharingStrategy::CoarseGrainSvm);
        let _first = target.acquire_host_lease(Direction::ReadWrite).unwrap();
        assert!(matches!(
            target.acquire_host_lease(Direction::ReadWrite),
            Err(MemoryError::LockViolation { .. })
        ));
    }

    // =============================================================================
    // ADDRESS STABILITY
    // =============================================================================

    #[test]
    fn test_host_pointer_stable_across_cycles() {
        let rig = Rig::new(SimulatedDriver::opencl_2());
        let target = rig.allocate(4096, Direction::ReadWrite, SharingStrategy::None);
        let expected = target.host_ptr();
        let directions = [
            Direction::ReadOnly,
            Direction::WriteOnly,
            Direction::WriteOnly,
            Direction::ReadWrite,
            Direction::ReadOnly,
        ];

        for cycle in 0..20 {
            let direction = directions[cycle % directions.len()];
            let lease = target.acquire_host_lease(direction).unwrap();
            assert_eq!(lease.host_ptr(), expected, "cycle {cycle} moved the mapping");
            lease.release().unwrap();
            if cycle % 3 == 0 {
                target.acquire_device_lease().unwrap().complete().unwrap();
            }
        }
        assert!(!target.is_corrupt());
    }

    #[test]
    fn test_repeated_direction_skips_driver() {
        let rig = Rig::new(SimulatedDriver::opencl_2());
        let target = rig.allocate(256, Direction::ReadOnly, SharingStrategy::None);
        let before = rig.driver.calls();
        for _ in 0..10 {
            target.acquire_host_lease(Direction::WriteOnly).unwrap();
        }
        assert_eq!(rig.driver.calls().since(&before).map_traffic(), 0);
        assert_eq!(rig.metrics.snapshot().host_fast_paths, 10);
    }

    #[test]
    fn test_relocated_mapping_is_an_integrity_violation() {
        let rig = Rig::new(SimulatedDriver::opencl_2());
        let target = rig.allocate(256, Direction::ReadWrite, SharingStrategy::None);
        target.acquire_device_lease().unwrap().complete().unwrap();

        rig.driver.relocate_next_map();
        let err = target.acquire_host_lease(Direction::ReadOnly).unwrap_err();
        match err {
            MemoryError::AddressIntegrityViolation { expected, actual } => {
                assert_eq!(expected, target.host_ptr().addr());
                assert_ne!(expected, actual);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(target.is_corrupt());
        assert!(matches!(
            target.acquire_device_lease(),
            Err(MemoryError::Corrupted)
        ));
        assert_eq!(rig.metrics.snapshot().integrity_violations, 1);

        drop(target);
        assert!(rig.driver.live_resources().is_empty());
    }

    // =============================================================================
    // QUEUES
    // =============================================================================

    #[test]
    fn test_host_lease_waits_for_the_device_queue() {
        let rig = Rig::with_queues(SimulatedDriver::opencl_2(), 3);
        let target = rig.allocate(64, Direction::ReadWrite, SharingStrategy::None);

        target
            .acquire_device_lease_on(QueueId(2))
            .unwrap()
            .release()
            .unwrap();
        assert_eq!(rig.driver.calls().get(DriverOp::Finish), 0);

        target.acquire_host_lease(Direction::ReadOnly).unwrap();
        assert_eq!(rig.driver.calls().get(DriverOp::Finish), 1);

        // Nothing outstanding any more
        target.acquire_host_lease(Direction::ReadOnly).unwrap();
        assert_eq!(rig.driver.calls().get(DriverOp::Finish), 1);
    }

    #[test]
    fn test_unknown_queue_rejected() {
        let rig = Rig::with_queues(SimulatedDriver::opencl_2(), 2);
        let target = rig.allocate(64, Direction::ReadWrite, SharingStrategy::None);
        assert!(matches!(
            target.acquire_device_lease_on(QueueId(2)),
            Err(MemoryError::InvalidQueue { count: 2, .. })
        ));
        assert_eq!(target.lease_state(), LeaseState::Idle);
    }

    // =============================================================================
    // IMAGE BINDING
    // =============================================================================

    #[test]
    fn test_missing_dimensions_issue_no_driver_calls() {
        for strategy in SharingStrategy::ALL {
            let rig = Rig::new(SimulatedDriver::opencl_2());
            let kernel = rig.driver.register_kernel("k", 1, |_| Ok(()));
            let target = rig.allocate(1024, Direction::ReadWrite, strategy);
            let before = rig.driver.calls();

            let err = KernelArgumentBinder::new(kernel)
                .bind(&target, &SlotBinding::image(0, AccessQualifier::ReadOnly, None))
                .unwrap_err();
            assert!(matches!(err, MemoryError::MissingImageDimensions { slot: 0 }));
            assert_eq!(rig.driver.calls().since(&before).total(), 0);
        }
    }

    #[test]
    fn test_write_only_never_uploads_read_only_always_does() {
        let rig = Rig::new(SimulatedDriver::opencl_1_2());
        let kernel = rig.driver.register_kernel("k", 1, |_| Ok(()));
        let target = rig.allocate(1024, Direction::ReadWrite, SharingStrategy::None);
        let binder = KernelArgumentBinder::new(kernel);
        let dims = Some(ImageDims::d2(8, 8).unwrap());

        for round in 1..=3 {
            // Make the buffer the fresher copy
            target
                .acquire_host_lease(Direction::WriteOnly)
                .unwrap()
                .copy_from(&[round as u8; 16])
                .unwrap();
            binder
                .bind(&target, &SlotBinding::image(0, AccessQualifier::WriteOnly, dims))
                .unwrap()
                .release()
                .unwrap();
            assert_eq!(rig.driver.calls().get(DriverOp::CopyBufferToImage), round - 1);

            target
                .acquire_host_lease(Direction::WriteOnly)
                .unwrap()
                .copy_from(&[round as u8; 16])
                .unwrap();
            binder
                .bind(&target, &SlotBinding::image(0, AccessQualifier::ReadOnly, dims))
                .unwrap()
                .release()
                .unwrap();
            assert_eq!(rig.driver.calls().get(DriverOp::CopyBufferToImage), round);
        }
    }

    #[test]
    fn test_aliasing_device_shares_storage() {
        let rig = Rig::new(SimulatedDriver::opencl_2());
        let fill = rig.driver.register_kernel("fill", 1, |inv| {
            inv.memory_mut(0)?.fill(5);
            Ok(())
        });
        let target = rig.allocate(1024, Direction::ReadWrite, SharingStrategy::None);
        let lease = KernelArgumentBinder::new(fill)
            .bind(
                &target,
                &SlotBinding::image(0, AccessQualifier::WriteOnly, Some(ImageDims::d2(8, 8).unwrap())),
            )
            .unwrap();
        cl_memory::ClDriver::enqueue_kernel(&*rig.driver, lease.queue(), fill, &[8, 8], None)
            .unwrap();
        lease.release().unwrap();

        let host = target.acquire_host_lease(Direction::ReadOnly).unwrap();
        assert!(host.as_slice().unwrap().iter().all(|b| *b == 5));
        let calls = rig.driver.calls();
        assert_eq!(calls.get(DriverOp::CopyBufferToImage), 0);
        assert_eq!(calls.get(DriverOp::CopyImageToBuffer), 0);
    }

    // =============================================================================
    // MATERIALIZATION FAILURES
    // =============================================================================

    #[test]
    fn test_failed_creation_leaves_nothing_behind() {
        let rig = Rig::new(SimulatedDriver::opencl_2());
        let request =
            AllocationRequest::new(64, Direction::ReadWrite).with_sharing(SharingStrategy::None);

        rig.driver
            .fail_next(DriverOp::CreateBuffer, status::MEM_OBJECT_ALLOCATION_FAILURE);
        let err = MemoryAllocation::create(&rig.context, request).unwrap_err();
        assert!(matches!(err, MemoryError::AllocationFailure { .. }));
        assert_eq!(err.status_code(), Some(status::MEM_OBJECT_ALLOCATION_FAILURE));

        rig.driver.fail_next(DriverOp::MapBuffer, status::MAP_FAILURE);
        let err = MemoryAllocation::create(&rig.context, request).unwrap_err();
        assert!(matches!(err, MemoryError::AllocationFailure { .. }));

        assert!(rig.driver.live_resources().is_empty());
        assert_eq!(rig.metrics.snapshot().allocations_created, 0);
    }

    #[test]
    fn test_zero_sized_allocation_fails() {
        let rig = Rig::new(SimulatedDriver::opencl_2());
        for strategy in SharingStrategy::ALL {
            let err = MemoryAllocation::create(
                &rig.context,
                AllocationRequest::new(0, Direction::ReadWrite).with_sharing(strategy),
            )
            .unwrap_err();
            assert!(matches!(err, MemoryError::AllocationFailure { .. }));
        }
    }
}
