use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use fixtensor::{assign, AssignOp, Vector};

mod native;

const DIMENSIONS: usize = 1536;

pub fn assign_benchmark(c: &mut Criterion) {
    let a = native::generate_random_vector::<f32, DIMENSIONS>();
    let b = native::generate_random_vector::<f32, DIMENSIONS>();
    let mut out = Vector::<f32, DIMENSIONS>::zeros();

    let mut group = c.benchmark_group("Expression Assignment");

    for i in 0..=5 {
        group.bench_with_input(BenchmarkId::new("fixtensor", i), &i, |bencher, _| {
            bencher.iter(|| assign(&mut out, &(&a * &b + &a), AssignOp::Assign))
        });
        group.bench_with_input(BenchmarkId::new("Rust Native", i), &i, |bencher, _| {
            bencher.iter(|| native::fused_update_cpu(a.as_slice(), b.as_slice(), out.as_mut_slice()))
        });
    }

    let mut cells_source = a;
    group.bench_function("aliased shift", |bencher| {
        bencher.iter(|| {
            let cells = cells_source.cells();
            let source = cells.view::<1, DIMENSIONS, 1>();
            fixtensor::Destination::try_assign(cells.view::<0, { DIMENSIONS - 1 }, 1>().aliased(), &source)
        })
    });

    group.finish();
}

criterion_group!(benches, assign_benchmark);
criterion_main!(benches);
