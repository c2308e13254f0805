use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use fixtensor::{kernel_for, matmul_into, Matrix};

mod native;

macro_rules! bench_shape {
    ($group:expr, $m:literal, $k:literal, $n:literal) => {{
        let a = native::generate_random_matrix::<f32, $m, $k>();
        let b = native::generate_random_matrix::<f32, $k, $n>();
        let mut c = Matrix::<f32, $m, $n>::zeros();
        let label = format!("{}x{}x{} {}", $m, $k, $n, kernel_for::<f32, $m, $k, $n>().name());

        $group.bench_with_input(BenchmarkId::new("fixtensor", &label), &label, |bencher, _| {
            bencher.iter(|| matmul_into(&a, &b, &mut c))
        });
        $group.bench_with_input(BenchmarkId::new("Rust Native", &label), &label, |bencher, _| {
            bencher.iter(|| native::matmul_cpu::<$m, $k, $n>(a.as_slice(), b.as_slice(), c.as_mut_slice()))
        });
    }};
}

pub fn matmul_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("Matmul f32");

    bench_shape!(group, 2, 2, 2);
    bench_shape!(group, 3, 3, 3);
    bench_shape!(group, 4, 4, 4);
    bench_shape!(group, 8, 8, 8);
    bench_shape!(group, 4, 64, 4);
    bench_shape!(group, 32, 48, 1);
    bench_shape!(group, 24, 24, 24);

    group.finish();
}

criterion_group!(benches, matmul_benchmark);
criterion_main!(benches);
