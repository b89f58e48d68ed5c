//! # Dispatch Scenarios
//!
//! A host fills an input allocation, a kernel transforms it into an output
//! allocation, and the host reads the result back.

#[cfg(test)]
mod tests {
    use cl_memory::{
        AccessQualifier, ClDriver, Direction, DriverOp, KernelArg, KernelArgs,
        KernelArgumentBinder, KernelDispatcher, KernelParam, LeaseState, QueueId, RunOptions,
        SharingStrategy, SimulatedDriver, SlotBinding,
    };

    use crate::fixtures::{mod7_pattern, register_identity, register_subtract_mod7, Rig};

    const LEN: usize = 1024;

    // =============================================================================
    // 1024 BYTE SUBTRACT SCENARIO
    // =============================================================================

    #[test]
    fn test_subtract_mod7_through_binder() {
        let rig = Rig::new(SimulatedDriver::opencl_2());
        let kernel = register_subtract_mod7(&rig.driver);
        let input = rig.allocate(LEN, Direction::ReadWrite, SharingStrategy::None);
        let output = rig.allocate(LEN, Direction::ReadWrite, SharingStrategy::None);

        {
            let mut lease = input.acquire_host_lease(Direction::ReadWrite).unwrap();
            lease.as_mut_slice().unwrap().copy_from_slice(&mod7_pattern(LEN));
        }

        let binder = KernelArgumentBinder::new(kernel);
        let input_lease = binder
            .bind(&input, &SlotBinding::buffer(0, AccessQualifier::ReadOnly))
            .unwrap();
        let output_lease = binder
            .bind(&output, &SlotBinding::buffer(1, AccessQualifier::WriteOnly))
            .unwrap();
        rig.driver
            .enqueue_kernel(QueueId(0), kernel, &[LEN], None)
            .unwrap();
        input_lease.release().unwrap();
        output_lease.release().unwrap();

        let lease = output.acquire_host_lease(Direction::ReadOnly).unwrap();
        assert_eq!(lease.as_slice().unwrap(), &[0u8; LEN][..]);
        // The pending kernel was waited for before the host saw the output
        assert_eq!(rig.driver.calls().get(DriverOp::Finish), 1);
    }

    #[test]
    fn test_subtract_mod7_through_dispatcher_on_every_strategy() {
        for strategy in SharingStrategy::ALL {
            let rig = Rig::new(SimulatedDriver::opencl_2());
            let kernel = register_subtract_mod7(&rig.driver);
            let input = rig.allocate(LEN, Direction::ReadOnly, strategy);
            let output = rig.allocate(LEN, Direction::WriteOnly, strategy);

            input
                .acquire_host_lease(Direction::WriteOnly)
                .unwrap()
                .copy_from(&mod7_pattern(LEN))
                .unwrap();

            let params = [
                KernelParam::new("input", "__global const uchar*", AccessQualifier::ReadOnly),
                KernelParam::new("output", "__global uchar*", AccessQualifier::WriteOnly),
            ];
            let args = KernelArgs::new()
                .with("input", KernelArg::Buffer(&input))
                .with("output", KernelArg::Buffer(&output));
            KernelDispatcher::new(&rig.context)
                .run(kernel, &params, &args, &RunOptions::new(vec![LEN]))
                .unwrap();

            let lease = output.acquire_host_lease(Direction::ReadOnly).unwrap();
            assert!(
                lease.as_slice().unwrap().iter().all(|b| *b == 0),
                "{strategy} produced non-zero output"
            );
        }
    }

    // =============================================================================
    // ROUND TRIP
    // =============================================================================

    #[test]
    fn test_identity_round_trip_preserves_bytes() {
        let data: Vec<u8> = (0..LEN).map(|i| (i * 31 % 251) as u8).collect();
        for strategy in SharingStrategy::ALL {
            let rig = Rig::new(SimulatedDriver::opencl_2());
            let kernel = register_identity(&rig.driver);
            let target = rig.allocate(LEN, Direction::ReadWrite, strategy);

            target
                .acquire_host_lease(Direction::WriteOnly)
                .unwrap()
                .copy_from(&data)
                .unwrap();

            let params = [KernelParam::new("data", "uchar*", AccessQualifier::None)];
            let args = KernelArgs::new().with("data", KernelArg::Buffer(&target));
            KernelDispatcher::new(&rig.context)
                .run(kernel, &params, &args, &RunOptions::new(vec![LEN]))
                .unwrap();

            let lease = target.acquire_host_lease(Direction::ReadOnly).unwrap();
            assert_eq!(lease.as_slice().unwrap(), &data[..], "{strategy} changed the data");
            drop(lease);
            assert_eq!(target.lease_state(), LeaseState::Idle);
        }
    }

    #[test]
    fn test_image_round_trip_without_aliasing() {
        let rig = Rig::new(SimulatedDriver::opencl_1_2());
        let kernel = rig.driver.register_kernel("image_identity", 1, |_| Ok(()));
        let target = rig.allocate(LEN, Direction::ReadWrite, SharingStrategy::None);
        let data: Vec<u8> = (0..LEN).map(|i| (i % 256) as u8).collect();
        target
            .acquire_host_lease(Direction::WriteOnly)
            .unwrap()
            .copy_from(&data)
            .unwrap();

        let params = [KernelParam::new("img", "__read_only image2d_t", AccessQualifier::ReadOnly)];
        let dims = cl_memory::ImageDims::d2(8, 8).unwrap();
        let args = KernelArgs::new().with("img", KernelArg::Image(&target, Some(dims)));
        KernelDispatcher::new(&rig.context)
            .run(kernel, &params, &args, &RunOptions::new(vec![8, 8]))
            .unwrap();

        // Uploaded once; a read-only image never needs copying back
        let lease = target.acquire_host_lease(Direction::ReadOnly).unwrap();
        assert_eq!(lease.as_slice().unwrap(), &data[..]);
        let calls = rig.driver.calls();
        assert_eq!(calls.get(DriverOp::CopyBufferToImage), 1);
        assert_eq!(calls.get(DriverOp::CopyImageToBuffer), 0);
    }

    #[test]
    fn test_image_written_by_kernel_is_copied_back() {
        let rig = Rig::new(SimulatedDriver::opencl_1_2());
        let fill = rig.driver.register_kernel("fill", 1, |inv| {
            inv.memory_mut(0)?.fill(9);
            Ok(())
        });
        let target = rig.allocate(LEN, Direction::ReadWrite, SharingStrategy::None);

        let params = [KernelParam::new("img", "__write_only image2d_t", AccessQualifier::WriteOnly)];
        let dims = cl_memory::ImageDims::d2(8, 8).unwrap();
        let args = KernelArgs::new().with("img", KernelArg::Image(&target, Some(dims)));
        KernelDispatcher::new(&rig.context)
            .run(fill, &params, &args, &RunOptions::new(vec![8, 8]))
            .unwrap();

        let lease = target.acquire_host_lease(Direction::ReadOnly).unwrap();
        assert!(lease.as_slice().unwrap().iter().all(|b| *b == 9));
        let calls = rig.driver.calls();
        assert_eq!(calls.get(DriverOp::CopyBufferToImage), 0);
        assert_eq!(calls.get(DriverOp::CopyImageToBuffer), 1);
    }

    #[test]
    fn test_image_output_survives_a_read_only_consumer() {
        let rig = Rig::new(SimulatedDriver::opencl_1_2());
        let producer = rig.driver.register_kernel("producer", 1, |inv| {
            inv.memory_mut(0)?.fill(5);
            Ok(())
        });
        let consumer = rig.driver.register_kernel("consumer", 2, |inv| {
            let (image, out) = inv.input_output(0, 1)?;
            out.copy_from_slice(image);
            Ok(())
        });
        let target = rig.allocate(LEN, Direction::ReadWrite, SharingStrategy::None);
        let copy = rig.allocate(LEN, Direction::WriteOnly, SharingStrategy::None);
        let dims = cl_memory::ImageDims::d2(8, 8).unwrap();
        let dispatcher = KernelDispatcher::new(&rig.context);

        let params = [KernelParam::new("img", "__write_only image2d_t", AccessQualifier::WriteOnly)];
        let args = KernelArgs::new().with("img", KernelArg::Image(&target, Some(dims)));
        dispatcher
            .run(producer, &params, &args, &RunOptions::new(vec![8, 8]))
            .unwrap();

        let params = [
            KernelParam::new("img", "__read_only image2d_t", AccessQualifier::ReadOnly),
            KernelParam::new("out", "uchar*", AccessQualifier::WriteOnly),
        ];
        let args = KernelArgs::new()
            .with("img", KernelArg::Image(&target, Some(dims)))
            .with("out", KernelArg::Buffer(&copy));
        dispatcher
            .run(consumer, &params, &args, &RunOptions::new(vec![8, 8]))
            .unwrap();

        let lease = copy.acquire_host_lease(Direction::ReadOnly).unwrap();
        assert!(lease.as_slice().unwrap().iter().all(|b| *b == 5));
        assert_eq!(rig.driver.calls().get(DriverOp::CopyBufferToImage), 0);
        drop(lease);

        // The producer's output also reaches the linear buffer
        let lease = target.acquire_host_lease(Direction::ReadOnly).unwrap();
        assert!(lease.as_slice().unwrap().iter().all(|b| *b == 5));
        assert_eq!(rig.driver.calls().get(DriverOp::CopyImageToBuffer), 1);
    }

    #[test]
    fn test_metrics_follow_scenario() {
        let rig = Rig::new(SimulatedDriver::opencl_2());
        let kernel = register_subtract_mod7(&rig.driver);
        {
            let input = rig.allocate(LEN, Direction::ReadWrite, SharingStrategy::None);
            let output = rig.allocate(LEN, Direction::ReadWrite, SharingStrategy::None);
            input
                .acquire_host_lease(Direction::ReadWrite)
                .unwrap()
                .copy_from(&mod7_pattern(LEN))
                .unwrap();
            let params = [
                KernelParam::new("input", "uchar*", AccessQualifier::ReadOnly),
                KernelParam::new("output", "uchar*", AccessQualifier::WriteOnly),
            ];
            let args = KernelArgs::new()
                .with("input", KernelArg::Buffer(&input))
                .with("output", KernelArg::Buffer(&output));
            KernelDispatcher::new(&rig.context)
                .run(kernel, &params, &args, &RunOptions::new(vec![LEN]))
                .unwrap();
            output.acquire_host_lease(Direction::ReadOnly).unwrap();

            let snapshot = rig.metrics.snapshot();
            assert_eq!(snapshot.allocations_created, 2);
            assert_eq!(snapshot.bytes_live, 2 * LEN as u64);
            assert_eq!(snapshot.device_leases, 2);
            assert_eq!(snapshot.host_leases, 2);
            assert_eq!(snapshot.host_fast_paths, 1);
        }
        let snapshot = rig.metrics.snapshot();
        assert_eq!(snapshot.allocations_destroyed, 2);
        assert_eq!(snapshot.bytes_live, 0);
        assert!(rig.driver.live_resources().is_empty());
    }
}
