use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use parfor::parallel::{ParFor, ThreadPool};
use rayon::prelude::*;
use std::hint::black_box;
use std::time::Duration;
use system_profile::SystemProfile;

/// Per-index cost roughly like a small convolution kernel
fn pixel_cost(index: i64) -> u64 {
    let mut acc = index as u64;
    for round in 0..200u64 {
        acc = acc.wrapping_mul(6364136223846793005).wrapping_add(round);
    }
    acc >> 32
}

fn bench_range_sizes(c: &mut Criterion) {
    let pool = ThreadPool::new(SystemProfile::cpu_count()).expect("Failed to build benchmark pool");

    let mut group = c.benchmark_group("parfor_vs_sequential");
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(20);

    for len in [1_000i64, 100_000] {
        group.bench_with_input(BenchmarkId::new("sequential", len), &len, |b, &len| {
            b.iter(|| black_box((0..len).map(pixel_cost).collect::<Vec<_>>()))
        });

        group.bench_with_input(BenchmarkId::new("parfor", len), &len, |b, &len| {
            b.iter(|| {
                let results = ParFor::new(0, len - 1)
                    .with_pool(&pool)
                    .run(|index, _| Ok(Some(pixel_cost(index))))
                    .into_result()
                    .expect("benchmark loop failed");
                black_box(results)
            })
        });

        group.bench_with_input(BenchmarkId::new("rayon", len), &len, |b, &len| {
            b.iter(|| black_box((0..len).into_par_iter().map(pixel_cost).collect::<Vec<_>>()))
        });
    }

    group.finish();
}

fn bench_worker_scaling(c: &mut Criterion) {
    let cpus = SystemProfile::cpu_count();
    let pool = ThreadPool::new(cpus).expect("Failed to build benchmark pool");

    let mut group = c.benchmark_group("parfor_worker_scaling");
    group.sample_size(20);

    let mut counts = vec![1, 2, 4, cpus];
    counts.dedup();
    for workers in counts.into_iter().filter(|&w| w <= cpus) {
        group.bench_with_input(BenchmarkId::new("workers", workers), &workers, |b, &workers| {
            b.iter(|| {
                let outcome = ParFor::new(0, 49_999)
                    .with_pool(&pool)
                    .workers(workers)
                    .run(|index, _| Ok((index % 3 == 0).then(|| pixel_cost(index))));
                black_box(outcome.is_success())
            })
        });
    }

    group.finish();
}

fn bench_check_interval(c: &mut Criterion) {
    let pool = ThreadPool::new(SystemProfile::cpu_count()).expect("Failed to build benchmark pool");

    let mut group = c.benchmark_group("parfor_check_interval");
    group.sample_size(20);

    for check_interval in [1usize, 8, 64] {
        group.bench_with_input(
            BenchmarkId::new("k", check_interval),
            &check_interval,
            |b, &check_interval| {
                b.iter(|| {
                    let outcome = ParFor::new(0, 49_999)
                        .with_pool(&pool)
                        .check_interval(check_interval)
                        .run(|index, _| Ok(Some(pixel_cost(index))));
                    black_box(outcome.is_success())
                })
            },
        );
    }

    group.finish();
}

fn setup_criterion() -> Criterion {
    println!("🖥️  {}", SystemProfile::get().summary());
    Criterion::default().with_output_color(true).with_plots()
}

criterion_group!(
    name = benches;
    config = setup_criterion();
    targets = bench_range_sizes, bench_worker_scaling, bench_check_interval
);

criterion_main!(benches);
