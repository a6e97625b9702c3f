//! # Handshake Benchmark
//!
//! Measures the cost of one update/render round trip through the frame ring,
//! and the dispatch overhead of the worker pool.
//!
//! Run with: `cargo bench --package lockstep_core`

// Benchmarks don't need strict docs
#![allow(missing_docs)]

use std::sync::Arc;
use std::thread;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use lockstep_core::{promise, CancellationToken, FrameRing, SharedFuture, WorkerPool};

/// Benchmark: write + read of one slot on a single thread (uncontended locks).
fn bench_uncontended_round_trip(c: &mut Criterion) {
    let token = CancellationToken::new();
    let ring: FrameRing<[f32; 64]> = FrameRing::new(3).unwrap();

    c.bench_function("ring_round_trip_single_thread", |b| {
        b.iter(|| {
            {
                let mut slot = ring.begin_write(&token).unwrap();
                slot[0] = black_box(1.0);
            }
            let slot = ring.begin_read(&token).unwrap();
            black_box(slot[0]);
        });
    });
}

/// Benchmark: 1000 frames through the ring between two threads, per depth.
fn bench_cross_thread_frames(c: &mut Criterion) {
    const FRAMES: u64 = 1000;
    let mut group = c.benchmark_group("ring_cross_thread_1000_frames");

    for depth in [1usize, 2, 3] {
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            b.iter(|| {
                let token = CancellationToken::new();
                let ring = Arc::new(FrameRing::<u64>::new(depth).unwrap());

                let producer = {
                    let ring = Arc::clone(&ring);
                    let token = token.clone();
                    thread::spawn(move || {
                        for frame in 0..FRAMES {
                            *ring.begin_write(&token).unwrap() = frame;
                        }
                    })
                };

                let mut sum = 0u64;
                for _ in 0..FRAMES {
                    sum += *ring.begin_read(&token).unwrap();
                }
                producer.join().unwrap();
                black_box(sum)
            });
        });
    }
    group.finish();
}

/// Benchmark: lock-free read of a resolved shared future.
fn bench_shared_future_read(c: &mut Criterion) {
    let future = SharedFuture::ready(42u64);
    c.bench_function("shared_future_try_get", |b| {
        b.iter(|| black_box(future.try_get()));
    });
}

/// Benchmark: dispatch a unit and wait for its result.
fn bench_pool_dispatch(c: &mut Criterion) {
    let pool = WorkerPool::new("bench", 2).unwrap();
    c.bench_function("worker_pool_dispatch_wait", |b| {
        b.iter(|| {
            let (promise, future) = promise::<u64>();
            pool.dispatch(move || promise.fulfill(black_box(7)))
                .unwrap();
            black_box(future.wait().copied())
        });
    });
}

criterion_group!(
    benches,
    bench_uncontended_round_trip,
    bench_cross_thread_frames,
    bench_shared_future_read,
    bench_pool_dispatch,
);
criterion_main!(benches);
