//! # Randomised Lease Sequences
//!
//! Arbitrary interleavings of lease requests and releases must never leave
//! host and device holding an allocation at once, and a refused request
//! must not change the lease state.

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use cl_memory::{
        AccessQualifier, DeviceLease, Direction, HostLease, KernelArg, KernelArgs,
        KernelDispatcher, KernelParam, LeaseState, MemoryError, QueueId, RunOptions,
        SharingStrategy, SimulatedDriver,
    };

    use crate::fixtures::{register_identity, Rig};

    #[derive(Clone, Copy, Debug)]
    enum Op {
        Host(Direction),
        Device(u32),
        ReleaseHost,
        ReleaseDevice,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            prop::sample::select(Direction::ALL.to_vec()).prop_map(Op::Host),
            (0u32..2).prop_map(Op::Device),
            Just(Op::ReleaseHost),
            Just(Op::ReleaseDevice),
        ]
    }

    fn sharing() -> impl Strategy<Value = SharingStrategy> {
        prop::sample::select(SharingStrategy::ALL.to_vec())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_leases_never_overlap(strategy in sharing(), ops in prop::collection::vec(op(), 1..40)) {
            let rig = Rig::with_queues(SimulatedDriver::opencl_2(), 2);
            let target = rig.allocate(256, Direction::ReadWrite, strategy);
            let mut host: Option<HostLease<'_>> = None;
            let mut device: Option<DeviceLease<'_>> = None;

            for op in ops {
                let before = target.lease_state();
                match op {
                    Op::Host(direction) => match target.acquire_host_lease(direction) {
                        Ok(lease) => {
                            prop_assert_eq!(before, LeaseState::Idle);
                            prop_assert_eq!(lease.host_ptr(), target.host_ptr());
                            host = Some(lease);
                        }
                        Err(MemoryError::LockViolation { .. }) => {
                            prop_assert_ne!(before, LeaseState::Idle);
                            prop_assert_eq!(target.lease_state(), before);
                        }
                        Err(e) => return Err(TestCaseError::fail(e.to_string())),
                    },
                    Op::Device(queue) => match target.acquire_device_lease_on(QueueId(queue)) {
                        Ok(lease) => {
                            prop_assert_eq!(before, LeaseState::Idle);
                            prop_assert_eq!(target.host_map(), None);
                            device = Some(lease);
                        }
                        Err(MemoryError::LockViolation { .. }) => {
                            prop_assert_ne!(before, LeaseState::Idle);
                            prop_assert_eq!(target.lease_state(), before);
                        }
                        Err(e) => return Err(TestCaseError::fail(e.to_string())),
                    },
                    Op::ReleaseHost => {
                        if let Some(lease) = host.take() {
                            lease.release().map_err(|e| TestCaseError::fail(e.to_string()))?;
                        }
                    }
                    Op::ReleaseDevice => {
                        if let Some(lease) = device.take() {
                            lease.release().map_err(|e| TestCaseError::fail(e.to_string()))?;
                        }
                    }
                }

                let state = target.lease_state();
                prop_assert_eq!(state == LeaseState::HostLeased, host.is_some());
                prop_assert_eq!(state == LeaseState::DeviceLeased, device.is_some());
                prop_assert!(host.is_none() || device.is_none());
            }
        }

        #[test]
        fn prop_identity_dispatch_preserves_data(
            strategy in sharing(),
            data in prop::collection::vec(any::<u8>(), 1..2048),
        ) {
            let rig = Rig::new(SimulatedDriver::opencl_2());
            let kernel = register_identity(&rig.driver);
            let target = rig.allocate(data.len(), Direction::ReadWrite, strategy);

            target
                .acquire_host_lease(Direction::WriteOnly)
                .and_then(|mut lease| lease.copy_from(&data))
                .map_err(|e| TestCaseError::fail(e.to_string()))?;

            let params = [KernelParam::new("data", "uchar*", AccessQualifier::None)];
            let args = KernelArgs::new().with("data", KernelArg::Buffer(&target));
            KernelDispatcher::new(&rig.context)
                .run(kernel, &params, &args, &RunOptions::new(vec![data.len()]))
                .map_err(|e| TestCaseError::fail(e.to_string()))?;

            let lease = target
                .acquire_host_lease(Direction::ReadOnly)
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert_eq!(lease.as_slice().map_err(|e| TestCaseError::fail(e.to_string()))?, &data[..]);
        }

        #[test]
        fn prop_pinned_pointer_survives_any_direction_sequence(
            directions in prop::collection::vec(prop::sample::select(Direction::ALL.to_vec()), 1..30),
        ) {
            let rig = Rig::new(SimulatedDriver::opencl_2());
            let target = rig.allocate(512, Direction::ReadOnly, SharingStrategy::None);
            let expected = target.host_ptr();
            for direction in directions {
                let lease = target
                    .acquire_host_lease(direction)
                    .map_err(|e| TestCaseError::fail(e.to_string()))?;
                prop_assert_eq!(lease.host_ptr(), expected);
            }
            prop_assert!(!target.is_corrupt());
        }
    }
}
