//! Concurrency properties of the pool + handoff queue.
//!
//! Run with: `cargo test -p frame-pool --test handoff_properties -- --nocapture`

use frame_pool::{FramePool, HandoffQueue};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Spawn a consumer that records sequence numbers and optionally sleeps per frame.
fn spawn_consumer(
    pool: FramePool,
    queue: HandoffQueue,
    per_frame: Duration,
) -> thread::JoinHandle<Vec<u64>> {
    thread::spawn(move || {
        let mut seen = Vec::new();
        while let Some(frame) = queue.pop_blocking() {
            seen.push(frame.sequence);
            if !per_frame.is_zero() {
                thread::sleep(per_frame);
            }
            pool.release(frame);
        }
        seen
    })
}

#[test]
fn test_conservation_under_concurrent_handoff() {
    for size in [1usize, 2, 4, 16] {
        let pool = FramePool::new(size, 256).unwrap();
        let queue = pool.handoff_queue();
        let done = Arc::new(AtomicBool::new(false));

        // Observer checks the invariant while both sides churn.
        let observer = {
            let pool = pool.clone();
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut samples = 0u64;
                while !done.load(Ordering::Acquire) {
                    let snap = pool.snapshot();
                    assert_eq!(snap.total(), size, "conservation violated: {snap:?}");
                    samples += 1;
                }
                samples
            })
        };

        let consumer = spawn_consumer(pool.clone(), queue.clone(), Duration::ZERO);

        let mut sequence = 0u64;
        for _ in 0..20_000 {
            if let Some(mut frame) = pool.try_acquire() {
                frame.fill_from(&[0x5A; 128]).unwrap();
                frame.sequence = sequence;
                sequence += 1;
                queue.push(frame).unwrap();
            }
        }
        queue.close();

        let seen = consumer.join().unwrap();
        done.store(true, Ordering::Release);
        let samples = observer.join().unwrap();

        assert_eq!(seen.len() as u64, sequence);
        assert_eq!(pool.available(), size);
        assert_eq!(pool.snapshot().free, size);
        println!("size {size}: {sequence} frames, {samples} snapshots");
    }
}

#[test]
fn test_fifo_order_across_threads() {
    let pool = FramePool::new(8, 64).unwrap();
    let queue = pool.handoff_queue();
    let consumer = spawn_consumer(pool.clone(), queue.clone(), Duration::from_micros(20));

    let mut pushed = Vec::new();
    for sequence in 0..2_000u64 {
        if let Some(mut frame) = pool.try_acquire() {
            frame.sequence = sequence;
            queue.push(frame).unwrap();
            pushed.push(sequence);
        }
    }
    queue.close();

    let seen = consumer.join().unwrap();
    assert_eq!(seen, pushed, "consumer must observe push order exactly");
}

#[test]
fn test_no_double_ownership() {
    let pool = FramePool::new(4, 16).unwrap();
    let mut held = Vec::new();
    let mut slots = HashSet::new();

    while let Some(frame) = pool.try_acquire() {
        assert!(slots.insert(frame.slot()), "slot {} lent twice", frame.slot());
        held.push(frame);
    }
    assert_eq!(held.len(), 4);

    // Only the released slot comes back.
    let released = held.remove(1);
    let released_slot = released.slot();
    pool.release(released);

    let again = pool.try_acquire().unwrap();
    assert_eq!(again.slot(), released_slot);
    assert!(pool.try_acquire().is_none());
}

#[cfg_attr(miri, ignore)] // Miri is too slow for timing assertions
#[test]
fn test_producer_never_waits_on_slow_consumer() {
    let pool = FramePool::new(2, 1024).unwrap();
    let queue = pool.handoff_queue();
    // Consumer takes far longer per frame than the producer's whole run.
    let consumer = spawn_consumer(pool.clone(), queue.clone(), Duration::from_millis(200));

    let payload = [1u8; 1024];
    let mut worst = Duration::ZERO;
    let mut submitted = 0u64;
    let mut dropped = 0u64;

    for sequence in 0..1_000u64 {
        let start = Instant::now();
        match pool.try_acquire() {
            Some(mut frame) => {
                frame.fill_from(&payload).unwrap();
                frame.sequence = sequence;
                queue.push(frame).unwrap();
                submitted += 1;
            }
            None => dropped += 1,
        }
        worst = worst.max(start.elapsed());
    }
    queue.close();

    println!("worst producer step: {worst:?}, submitted {submitted}, dropped {dropped}");

    // Generous bound for CI scheduling noise; a blocking producer would take
    // at least one consumer period (200 ms).
    assert!(
        worst < Duration::from_millis(50),
        "producer step took {worst:?}"
    );
    assert_eq!(submitted + dropped, 1_000);

    let seen = consumer.join().unwrap();
    assert_eq!(seen.len() as u64, submitted);
    assert_eq!(pool.available(), 2);
}
