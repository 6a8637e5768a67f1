use std::thread;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use frame_pool::FramePool;

const FRAME_SIZES: [usize; 3] = [4 * 1024, 64 * 1024, 1280 * 720 * 3];

/// acquire → fill → push → pop → release on one thread.
fn benchmark_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("handoff_cycle");
    for &size in &FRAME_SIZES {
        let pool = FramePool::new(4, size).unwrap();
        let queue = pool.handoff_queue();
        let payload = vec![0x5A; size];

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &payload, |b, payload| {
            b.iter(|| {
                let mut frame = pool.try_acquire().unwrap();
                frame.fill_from(black_box(payload)).unwrap();
                queue.push(frame).unwrap();
                let frame = queue.pop_blocking().unwrap();
                black_box(frame.payload());
                pool.release(frame);
            });
        });
    }
    group.finish();
}

/// Producer on the bench thread, consumer on a second thread, like a session.
fn benchmark_threaded(c: &mut Criterion) {
    const FRAMES: usize = 1_000;
    let size = 64 * 1024;
    let payload = vec![0xA5; size];

    let mut group = c.benchmark_group("handoff_threaded");
    group.throughput(Throughput::Bytes((FRAMES * size) as u64));
    group.bench_function("1000_frames_64k", |b| {
        b.iter(|| {
            let pool = FramePool::new(16, size).unwrap();
            let queue = pool.handoff_queue();
            let consumer = {
                let (pool, queue) = (pool.clone(), queue.clone());
                thread::spawn(move || {
                    let mut written = 0usize;
                    while let Some(frame) = queue.pop_blocking() {
                        written += frame.len();
                        pool.release(frame);
                    }
                    written
                })
            };

            let mut dropped = 0usize;
            for _ in 0..FRAMES {
                match pool.try_acquire() {
                    Some(mut frame) => {
                        frame.fill_from(&payload).unwrap();
                        queue.push(frame).unwrap();
                    }
                    None => dropped += 1,
                }
            }
            queue.close();
            black_box((consumer.join().unwrap(), dropped))
        });
    });
    group.finish();
}

criterion_group!(benches, benchmark_cycle, benchmark_threaded);
criterion_main!(benches);
