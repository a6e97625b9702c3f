//! Integration test for the update/render handshake and worker pool.

use lockstep_core::{promise, CancellationToken, CoreError, FrameRing, WorkerPool};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Default)]
struct Snapshot {
    frame: u64,
    commands: Vec<u32>,
}

#[test]
fn test_update_render_lockstep() {
    const FRAMES: u64 = 300;
    let token = CancellationToken::new();
    let ring = Arc::new(FrameRing::<Snapshot>::new(1).unwrap());

    // Update side: write, publish, wait for render to catch up.
    let update = {
        let ring = Arc::clone(&ring);
        let token = token.clone();
        thread::spawn(move || {
            for frame in 0..FRAMES {
                {
                    let mut view = ring.begin_write(&token).unwrap();
                    view.frame = frame;
                    view.commands.clear();
                    view.commands.extend(0..(frame % 7) as u32);
                }
                ring.wait_writable(&token).unwrap();
            }
        })
    };

    for frame in 0..FRAMES {
        let view = ring.begin_read(&token).unwrap();
        assert_eq!(view.frame, frame);
        assert_eq!(view.commands.len() as u64, frame % 7);
    }

    update.join().unwrap();
    assert_eq!(ring.consumed(), FRAMES);
}

#[test]
fn test_shutdown_releases_both_sides() {
    let token = CancellationToken::with_poll_interval(Duration::from_millis(2));
    let ring = Arc::new(FrameRing::<Snapshot>::new(2).unwrap());

    // Fill the ring so the writer blocks; the reader blocks on a second ring.
    drop(ring.begin_write(&token).unwrap());
    drop(ring.begin_write(&token).unwrap());
    let empty = Arc::new(FrameRing::<Snapshot>::new(2).unwrap());

    let writer = {
        let ring = Arc::clone(&ring);
        let token = token.clone();
        thread::spawn(move || ring.begin_write(&token).map(|_| ()))
    };
    let reader = {
        let empty = Arc::clone(&empty);
        let token = token.clone();
        thread::spawn(move || empty.begin_read(&token).map(|_| ()))
    };

    thread::sleep(Duration::from_millis(20));
    let start = Instant::now();
    token.cancel();
    ring.release_waiters();
    empty.release_waiters();

    assert!(matches!(writer.join().unwrap(), Err(CoreError::Cancelled)));
    assert!(matches!(reader.join().unwrap(), Err(CoreError::Cancelled)));
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_pool_count_reaches_zero_with_failures() {
    let pool = Arc::new(WorkerPool::new("loader", 4).unwrap());
    let succeeded = Arc::new(AtomicUsize::new(0));

    for i in 0..64 {
        let succeeded = Arc::clone(&succeeded);
        pool.dispatch(move || {
            if i % 8 == 0 {
                panic!("simulated load failure {i}");
            }
            succeeded.fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    while pool.num_active_tasks() != 0 {
        assert!(Instant::now() < deadline, "active count stuck");
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(succeeded.load(Ordering::Relaxed), 56);
}

#[test]
fn test_idle_count_stays_zero_until_next_dispatch() {
    let pool = WorkerPool::new("level", 2).unwrap();
    for _ in 0..16 {
        pool.dispatch(|| thread::sleep(Duration::from_millis(1))).unwrap();
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    while pool.num_active_tasks() != 0 {
        assert!(Instant::now() < deadline, "active count stuck");
        thread::sleep(Duration::from_millis(1));
    }
    // Workers going back to waiting must not disturb the count.
    for _ in 0..20 {
        assert_eq!(pool.num_active_tasks(), 0);
        thread::sleep(Duration::from_millis(1));
    }

    let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
    pool.dispatch(move || {
        let _ = release_rx.recv();
    })
    .unwrap();
    assert_eq!(pool.num_active_tasks(), 1);
    thread::sleep(Duration::from_millis(10));
    assert_eq!(pool.num_active_tasks(), 1);

    release_tx.send(()).unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while pool.num_active_tasks() != 0 {
        assert!(Instant::now() < deadline, "active count stuck");
        thread::sleep(Duration::from_millis(1));
    }
    pool.shutdown();
}

#[test]
fn test_dispatch_from_many_threads() {
    let pool = Arc::new(WorkerPool::new("mixed", 3).unwrap());
    let futures: Vec<_> = (0..8)
        .map(|t| {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                (0..50)
                    .map(|i| {
                        let (promise, future) = promise::<usize>();
                        pool.dispatch(move || promise.fulfill(t * 100 + i)).unwrap();
                        future
                    })
                    .collect::<Vec<_>>()
            })
        })
        .flat_map(|h| h.join().unwrap())
        .collect();

    let total: usize = futures.iter().map(|f| *f.wait().unwrap()).sum();
    let expected: usize = (0..8).flat_map(|t| (0..50).map(move |i| t * 100 + i)).sum();
    assert_eq!(total, expected);

    pool.shutdown();
    assert_eq!(pool.num_active_tasks(), 0);
}
