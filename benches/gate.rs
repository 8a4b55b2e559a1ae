// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Benchmarks for the concurrency gate.
//!
//! These benchmark:
//! - Uncontended acquire/release
//! - Contended handoff through the FIFO queue
//! - Status snapshots
//!
//! Run with: `cargo bench --bench gate`

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;

use conductor::gate::{ConcurrencyGate, GateConfig};

/// Benchmark acquire + drop with free capacity.
fn bench_uncontended(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let gate = ConcurrencyGate::new(GateConfig::new(8));

    let mut group = c.benchmark_group("gate_uncontended");
    group.throughput(Throughput::Elements(1));

    group.bench_function("acquire_release", |b| {
        b.iter(|| {
            rt.block_on(async {
                let permit = gate.acquire(black_box("anthropic")).await.unwrap();
                drop(permit);
            })
        });
    });

    group.bench_function("acquire_many_keys", |b| {
        let keys: Vec<String> = (0..32).map(|i| format!("provider-{}", i)).collect();
        b.iter(|| {
            rt.block_on(async {
                let mut permits = Vec::with_capacity(keys.len());
                for key in &keys {
                    permits.push(gate.acquire(key).await.unwrap());
                }
                black_box(permits.len())
            })
        });
    });

    group.finish();
}

/// Benchmark tasks competing for a small limit.
fn bench_contended(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("gate_contended");
    for tasks in [8usize, 64, 256] {
        group.throughput(Throughput::Elements(tasks as u64));
        group.bench_with_input(BenchmarkId::new("limit_2", tasks), &tasks, |b, &tasks| {
            b.iter(|| {
                rt.block_on(async {
                    let gate = ConcurrencyGate::new(GateConfig::new(2));
                    let handles: Vec<_> = (0..tasks)
                        .map(|_| {
                            let gate = gate.clone();
                            tokio::spawn(async move {
                                let _permit = gate.acquire("shared").await.unwrap();
                                tokio::task::yield_now().await;
                            })
                        })
                        .collect();
                    for handle in handles {
                        handle.await.unwrap();
                    }
                })
            });
        });
    }
    group.finish();
}

/// Benchmark status snapshots on a busy gate.
fn bench_status(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let gate = ConcurrencyGate::new(GateConfig::new(1));
    let permits: Vec<_> = rt.block_on(async {
        let mut permits = Vec::new();
        for i in 0..64 {
            permits.push(gate.acquire(&format!("key-{}", i)).await.unwrap());
        }
        permits
    });

    c.bench_function("gate_status_64_keys", |b| {
        b.iter(|| black_box(gate.status()));
    });

    drop(permits);
}

criterion_group!(benches, bench_uncontended, bench_contended, bench_status);
criterion_main!(benches);
