//! Rate limiting benchmarks for campus-market-ratelimit

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::time::Duration;

use campus_market::prelude::*;

// Short window keeps the attempt log, and so the serialized ledger, small
fn bench_config() -> RateLimitConfig {
    RateLimitConfig::new(1_000_000, Duration::from_millis(100))
}

fn memory_store_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("memory_store");
    group.throughput(Throughput::Elements(1));

    let limiter = rt.block_on(async { RateLimiter::builder().build().await.unwrap() });
    let config = bench_config();

    group.bench_function("check_allowed", |b| {
        b.to_async(&rt).iter(|| async {
            let result = limiter
                .check_limit(black_box("benchmark_key"), &config)
                .await
                .unwrap();
            black_box(result)
        });
    });

    group.bench_function("status", |b| {
        b.to_async(&rt).iter(|| async {
            let status = limiter
                .status(black_box("benchmark_key"), &config)
                .await
                .unwrap();
            black_box(status)
        });
    });

    group.finish();
}

fn file_store_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let dir = tempfile::tempdir().unwrap();

    let mut group = c.benchmark_group("file_store");
    group.throughput(Throughput::Elements(1));

    let limiter = rt.block_on(async {
        RateLimiter::builder()
            .file_store(dir.path())
            .build()
            .await
            .unwrap()
    });
    let config = bench_config();

    group.bench_function("check_allowed", |b| {
        b.to_async(&rt).iter(|| async {
            let result = limiter
                .check_limit(black_box("benchmark_key"), &config)
                .await
                .unwrap();
            black_box(result)
        });
    });

    group.finish();
}

fn multi_key_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("multi_key");

    let limiter = rt.block_on(async { RateLimiter::builder().build().await.unwrap() });
    let config = bench_config();

    for num_keys in [10, 100, 1000].iter() {
        let keys: Vec<String> = (0..*num_keys)
            .map(|i| OperationKind::LoginFailed.key(&format!("user_{}@campus.edu", i)))
            .collect();
        let idx = std::sync::atomic::AtomicUsize::new(0);

        group.bench_with_input(
            BenchmarkId::new("unique_keys", num_keys),
            num_keys,
            |b, _| {
                b.to_async(&rt).iter(|| async {
                    let current = idx.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    let key = &keys[current % keys.len()];
                    let result = limiter.check_limit(black_box(key), &config).await.unwrap();
                    black_box(result)
                });
            },
        );
    }

    group.finish();
}

fn reset_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("reset_operations");

    let limiter = rt.block_on(async { RateLimiter::builder().build().await.unwrap() });

    group.bench_function("reset_key", |b| {
        b.to_async(&rt).iter(|| async {
            limiter.reset(black_box("reset_key")).await.unwrap();
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    memory_store_benchmark,
    file_store_benchmark,
    multi_key_benchmark,
    reset_benchmark,
);

criterion_main!(benches);
