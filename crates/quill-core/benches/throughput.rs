/// Throughput benchmarks for the rotating writer
///
/// Measures submission cost, end-to-end write cost with rotation, and the
/// pure rotation decision.
use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use quill_core::rotation::RotationPolicy;
use quill_core::{LogConfig, LogLevel, Logger, RollingConfig, TimeInterval};
use tempfile::TempDir;
use tokio::runtime::Runtime;

fn config(dir: &TempDir, max_bytes: u64) -> LogConfig {
    LogConfig::builder()
        .log_dir(dir.path())
        .file_prefix("bench-")
        .max_bytes(max_bytes)
        .time_interval(TimeInterval::Yearly)
        .handle_signals(false)
        .build()
        .unwrap()
}

/// Benchmark write throughput for different rotation thresholds
fn bench_write_throughput(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("write_throughput");
    for max_bytes in [4 * 1024u64, 1024 * 1024].iter() {
        let temp_dir = TempDir::new().unwrap();
        let logger = rt
            .block_on(Logger::new(config(&temp_dir, *max_bytes)))
            .unwrap();

        group.bench_with_input(
            BenchmarkId::new("submit_and_flush_100", max_bytes),
            max_bytes,
            |b, _| {
                b.to_async(&rt).iter(|| async {
                    for i in 0..100 {
                        logger.info(format!("benchmark record {}", i));
                    }
                    logger.flush().await.unwrap();
                })
            },
        );

        rt.block_on(logger.shutdown()).unwrap();
    }
    group.finish();
}

/// Benchmark the cost of a record that is filtered out
fn bench_filtered_submit(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let temp_dir = TempDir::new().unwrap();
    let logger = rt.block_on(Logger::new(config(&temp_dir, 1024 * 1024))).unwrap();

    c.bench_function("filtered_debug_submit", |b| {
        b.iter(|| logger.log(LogLevel::Debug, black_box("dropped")))
    });

    rt.block_on(logger.shutdown()).unwrap();
}

/// Benchmark the rotation decision alone
fn bench_rotation_policy(c: &mut Criterion) {
    let policy = RotationPolicy::new(RollingConfig {
        time_interval: TimeInterval::Weekly,
        max_bytes: 1024 * 1024,
    });
    let opened = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();
    let now = Utc.with_ymd_and_hms(2024, 3, 8, 12, 0, 0).unwrap();

    c.bench_function("rotation_policy_evaluate", |b| {
        b.iter(|| policy.evaluate(black_box(opened), black_box(4096), black_box(128), black_box(now)))
    });
}

criterion_group!(
    benches,
    bench_write_throughput,
    bench_filtered_submit,
    bench_rotation_policy
);
criterion_main!(benches);
