//! # cl-memory Benchmarks
//!
//! | Path | Expectation |
//! |------|-------------|
//! | Host lease, same direction | No driver calls |
//! | Host lease, direction change | One unmap + one map |
//! | Device round (bind, launch, release) | Dominated by the simulated kernel |

use cl_memory::{
    AccessQualifier, Direction, KernelArg, KernelArgs, KernelDispatcher, KernelParam, RunOptions,
    SharingStrategy, SimulatedDriver,
};
use cl_tests::fixtures::{mod7_pattern, register_subtract_mod7, Rig};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn bench_host_leases(c: &mut Criterion) {
    let mut group = c.benchmark_group("host-lease");
    let rig = Rig::new(SimulatedDriver::opencl_2());

    for strategy in SharingStrategy::ALL {
        let target = rig.allocate(64 * 1024, Direction::ReadWrite, strategy);

        group.bench_with_input(
            BenchmarkId::new("same_direction", strategy),
            &target,
            |b, target| {
                b.iter(|| {
                    let lease = target.acquire_host_lease(Direction::ReadWrite).unwrap();
                    black_box(lease.host_ptr());
                })
            },
        );

        group.bench_with_input(
            BenchmarkId::new("alternating_direction", strategy),
            &target,
            |b, target| {
                let mut flip = false;
                b.iter(|| {
                    flip = !flip;
                    let direction = if flip {
                        Direction::ReadOnly
                    } else {
                        Direction::WriteOnly
                    };
                    let lease = target.acquire_host_lease(direction).unwrap();
                    black_box(lease.host_ptr());
                })
            },
        );
    }
    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");

    for size in [1024usize, 64 * 1024, 1024 * 1024] {
        let rig = Rig::new(SimulatedDriver::opencl_2());
        let kernel = register_subtract_mod7(&rig.driver);
        let input = rig.allocate(size, Direction::ReadOnly, SharingStrategy::None);
        let output = rig.allocate(size, Direction::WriteOnly, SharingStrategy::None);
        input
            .acquire_host_lease(Direction::WriteOnly)
            .unwrap()
            .copy_from(&mod7_pattern(size))
            .unwrap();

        let params = [
            KernelParam::new("input", "uchar*", AccessQualifier::ReadOnly),
            KernelParam::new("output", "uchar*", AccessQualifier::WriteOnly),
        ];
        let args = KernelArgs::new()
            .with("input", KernelArg::Buffer(&input))
            .with("output", KernelArg::Buffer(&output));
        let dispatcher = KernelDispatcher::new(&rig.context);
        let options = RunOptions::new(vec![size]);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("subtract_mod7", size), &size, |b, _| {
            b.iter(|| {
                dispatcher.run(kernel, &params, &args, &options).unwrap();
                let lease = output.acquire_host_lease(Direction::ReadOnly).unwrap();
                black_box(lease.as_slice().unwrap()[0]);
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_host_leases, bench_dispatch);
criterion_main!(benches);
