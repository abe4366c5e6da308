use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use pim_polyoffload::engine::kernels;
use pim_polyoffload::{generate_operands, OffloadConfig, OffloadController, OpMode, PolyParams, RunContext};

fn bench_kernel(c: &mut Criterion) {
    let mut group = c.benchmark_group("kernel");
    let params = PolyParams::new(1 << 16, 65537).unwrap();
    let (a, b) = generate_operands(params, 1);
    let mut out = vec![0u32; params.n];
    for mode in [OpMode::Add, OpMode::Mul] {
        group.bench_with_input(BenchmarkId::from_parameter(mode), &mode, |bencher, &mode| {
            bencher.iter(|| kernels::apply(mode, params.q, a.coeffs(), b.coeffs(), &mut out).unwrap());
        });
    }
    group.finish();
}

fn bench_offload(c: &mut Criterion) {
    let mut group = c.benchmark_group("offload_mul");
    let params = PolyParams::new(1 << 16, 65537).unwrap();
    let (a, b) = generate_operands(params, 1);
    for units in [1usize, 4, 16, 64] {
        let config = OffloadConfig::default().with_size(params.n).with_units(units);
        let mut controller = OffloadController::local(config).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(units), &units, |bencher, _| {
            bencher.iter(|| {
                let mut ctx = RunContext::acquire(None);
                controller.offload(&a, &b, OpMode::Mul, &mut ctx).unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_kernel, bench_offload);
criterion_main!(benches);
