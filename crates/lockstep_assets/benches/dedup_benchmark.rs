//! # Dedup Benchmark
//!
//! Cost of the bookkeeping around a load: queueing with the per-batch dedup
//! set, and the registry's get-or-insert-pending on hot paths.
//!
//! Run with: `cargo bench --package lockstep_assets`

// Benchmarks don't need strict docs
#![allow(missing_docs)]

use std::path::PathBuf;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use lockstep_assets::{InFlightRegistry, LoadQueue, Slot};

fn paths(count: usize) -> Vec<PathBuf> {
    (0..count)
        .map(|i| PathBuf::from(format!("assets/models/prop_{i:04}.obj")))
        .collect()
}

/// Benchmark: queue 1000 requests over N unique paths, then drain.
fn bench_queue_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_1000_requests");

    for unique in [1usize, 20, 1000] {
        let paths = paths(unique);
        group.bench_with_input(BenchmarkId::from_parameter(unique), &paths, |b, paths| {
            b.iter(|| {
                let mut queue = LoadQueue::new();
                for i in 0..1000usize {
                    let path = &paths[i % paths.len()];
                    black_box(queue.push(path.clone(), i));
                }
                black_box(queue.drain().unique.len())
            });
        });
    }
    group.finish();
}

/// Benchmark: registry lookups once every path is already loaded.
fn bench_registry_hits(c: &mut Criterion) {
    let paths = paths(20);
    let registry = InFlightRegistry::<u32>::new();
    for (i, path) in paths.iter().enumerate() {
        if let Slot::Vacant(promise, _) = registry.get_or_insert_pending(path) {
            promise.fulfill(i as u32);
        }
    }

    c.bench_function("registry_get_or_insert_hit", |b| {
        let mut i = 0usize;
        b.iter(|| {
            i = (i + 1) % paths.len();
            match registry.get_or_insert_pending(&paths[i]) {
                Slot::Existing(future) => black_box(future.try_get().copied()),
                Slot::Vacant(..) => None,
            }
        });
    });
}

criterion_group!(benches, bench_queue_drain, bench_registry_hits);
criterion_main!(benches);
