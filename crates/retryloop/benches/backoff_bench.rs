//! Backoff and retry run benchmarks
//!
//! Benchmarks for delay calculation across the backoff strategies, policy
//! validation, and complete handler runs with zero-length waits.
//!
//! Run with: `cargo bench --bench backoff_bench -p retryloop`

use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use retryloop::{Backoff, RetryHandler, RetryPolicy};
use tokio::runtime::Builder as RuntimeBuilder;

// ============================================================================
// Delay Calculation Benchmarks
// ============================================================================

fn bench_delay_for(c: &mut Criterion) {
    let mut group = c.benchmark_group("backoff_delay_for");

    let schedule: Vec<Duration> = (1..=64).map(Duration::from_millis).collect();
    let strategies = [
        ("fixed", Backoff::Fixed(Duration::from_millis(500))),
        ("linear", Backoff::Linear(Duration::from_millis(500))),
        ("exponential", Backoff::Exponential(Duration::from_millis(10))),
        ("custom", Backoff::Custom(schedule)),
    ];

    for (name, backoff) in &strategies {
        for attempt in [1_u32, 8, 64] {
            group.bench_with_input(BenchmarkId::new(*name, attempt), &attempt, |b, &attempt| {
                b.iter(|| black_box(backoff.delay_for(black_box(attempt))));
            });
        }
    }

    group.finish();
}

fn bench_policy_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("policy_build");

    group.bench_function("exponential", |b| {
        b.iter(|| {
            let policy = RetryPolicy::builder()
                .max_attempts(black_box(10))
                .exponential_backoff(Duration::from_millis(10))
                .build();
            black_box(policy)
        });
    });

    group.bench_function("custom_schedule", |b| {
        let schedule = vec![Duration::from_millis(100); 32];
        b.iter(|| {
            let policy =
                RetryPolicy::builder().max_attempts(32).custom_backoff(schedule.clone()).build();
            black_box(policy)
        });
    });

    group.finish();
}

// ============================================================================
// Handler Run Benchmarks
// ============================================================================

fn build_runtime() -> tokio::runtime::Runtime {
    RuntimeBuilder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime should build for benchmarks")
}

fn zero_wait_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::builder()
        .max_attempts(max_attempts)
        .custom_backoff(vec![Duration::ZERO; max_attempts as usize])
        .build()
        .expect("zero-wait policy should build for benchmarks")
}

fn bench_handler_runs(c: &mut Criterion) {
    let mut group = c.benchmark_group("handler_runs");
    let runtime = build_runtime();

    group.bench_function("immediate_success", |b| {
        b.to_async(&runtime).iter(|| async {
            let handler = RetryHandler::builder(|| async { Ok::<_, io::Error>(1_u32) })
                .policy(zero_wait_policy(3))
                .build();
            handler.start();
            handler.stopped().await;
        });
    });

    for failures in [1_u32, 4] {
        group.bench_with_input(
            BenchmarkId::new("failures_then_success", failures),
            &failures,
            |b, &failures| {
                b.to_async(&runtime).iter(|| async move {
                    let calls = Arc::new(AtomicU32::new(0));
                    let handler = RetryHandler::builder(move || {
                        let call = calls.fetch_add(1, Ordering::SeqCst);
                        async move {
                            if call < failures {
                                Err(io::Error::other("transient failure"))
                            } else {
                                Ok(call)
                            }
                        }
                    })
                    .policy(zero_wait_policy(failures + 1))
                    .build();
                    handler.start();
                    handler.stopped().await;
                });
            },
        );
    }

    group.bench_function("always_fail", |b| {
        b.to_async(&runtime).iter(|| async {
            let handler = RetryHandler::builder(|| async {
                Err::<(), _>(io::Error::other("permanent failure"))
            })
            .policy(zero_wait_policy(5))
            .build();
            handler.start();
            handler.stopped().await;
        });
    });

    group.finish();
}

criterion_group!(benches, bench_delay_for, bench_policy_build, bench_handler_runs);
criterion_main!(benches);
