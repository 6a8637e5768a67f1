//! Fixed-size frame buffer pool with a single-producer/single-consumer handoff.
//!
//! Built for capture pipelines where the producer runs against a real-time
//! source and must never wait on storage:
//!
//! - [`FramePool`]: `N` buffers of `C` bytes, allocated and zero-filled once
//! - [`FrameHandle`]: move-only ownership of one buffer
//! - [`HandoffQueue`]: FIFO from producer to consumer, bounded by `N`
//!
//! # Ownership Model
//!
//! Buffers move by value. The free list, the queue and whichever side holds a
//! handle are the only places a buffer can be, and a `FrameHandle` cannot be
//! cloned, so releasing twice or reading after release does not compile.
//!
//! # Locking
//!
//! One `parking_lot::Mutex` guards the free list, the queue, the per-slot state
//! table and the closed flag; one `Condvar` wakes the consumer. Critical
//! sections only move a buffer between collections, never copy frame bytes.
//!
//! ```text
//! try_acquire ──► Filling ──push──► Queued ──pop_blocking──► Writing
//!      ▲                                                        │
//!      └──────────────────────── Free ◄──────── release ────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use frame_pool::FramePool;
//! use std::thread;
//!
//! let pool = FramePool::new(4, 64).unwrap();
//! let queue = pool.handoff_queue();
//!
//! let writer = {
//!     let (pool, queue) = (pool.clone(), queue.clone());
//!     thread::spawn(move || {
//!         let mut written = 0;
//!         while let Some(frame) = queue.pop_blocking() {
//!             written += frame.len();
//!             pool.release(frame);
//!         }
//!         written
//!     })
//! };
//!
//! for _ in 0..3 {
//!     if let Some(mut frame) = pool.try_acquire() {
//!         frame.fill_from(&[0xAB; 10]).unwrap();
//!         queue.push(frame).unwrap();
//!     }
//! }
//! queue.close();
//!
//! assert_eq!(writer.join().unwrap(), 30);
//! assert_eq!(pool.available(), 4);
//! ```

mod buffer;
mod handoff;
mod pool;

pub use buffer::{CapacityExceeded, FrameBuffer};
pub use handoff::{HandoffQueue, PushError};
pub use pool::{FrameHandle, FramePool, PoolError, PoolSnapshot, SlotState};
