//! Benchmarks for the block estimators

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use blockstat_algorithms::block::{
    block_mean, block_median, block_mode, HistogramParams, MeanParams, MedianParams, ModeParams,
};
use blockstat_core::{GridSpec, PointRecord};

fn create_points(n: usize) -> Vec<PointRecord> {
    // Deterministic scatter over a 100 x 100 region
    (0..n)
        .map(|i| {
            let x = ((i * 7919) % 10_000) as f64 / 100.0;
            let y = ((i * 104_729) % 10_000) as f64 / 100.0;
            let z = (x * 0.3 + y * 0.7) + ((i * 13) % 50) as f64 / 10.0;
            PointRecord::new(x, y, z.round())
        })
        .collect()
}

fn bench_estimators(c: &mut Criterion) {
    let grid = GridSpec::new(0.0, 100.0, 0.0, 100.0, 1.0, 1.0).unwrap();
    let mut group = c.benchmark_group("block");

    for size in [10_000, 100_000, 1_000_000].iter() {
        let points = create_points(*size);

        group.bench_with_input(BenchmarkId::new("mean", size), size, |b, _| {
            b.iter(|| block_mean(black_box(&points), &grid, MeanParams::default()).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("median", size), size, |b, _| {
            b.iter(|| block_median(black_box(&points), &grid, MedianParams::default()).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("mode", size), size, |b, _| {
            b.iter(|| block_mode(black_box(&points), &grid, ModeParams::default()).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("mode_histogram", size), size, |b, _| {
            let params = ModeParams {
                histogram: Some(HistogramParams::default()),
                ..Default::default()
            };
            b.iter(|| block_mode(black_box(&points), &grid, params).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_estimators);
criterion_main!(benches);
