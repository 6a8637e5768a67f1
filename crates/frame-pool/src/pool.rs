//! Pre-allocated pool of frame buffers and the move-only handles that lend them out.

use crate::buffer::FrameBuffer;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, trace, warn};

/// Pool construction errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// A pool must hold at least one buffer.
    #[error("pool size must be greater than 0")]
    EmptyPool,

    /// Buffers must be able to hold at least one byte.
    #[error("frame buffer capacity must be greater than 0")]
    ZeroCapacity,
}

/// Where a pool slot currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotState {
    /// On the free list, content undefined.
    Free,
    /// Held by the producer between `try_acquire` and `push`.
    Filling,
    /// Sitting in the handoff queue.
    Queued,
    /// Held by the consumer between `pop_blocking` and `release`.
    Writing,
}

/// Slot-state counts taken atomically under the pool lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolSnapshot {
    /// Buffers on the free list.
    pub free: usize,
    /// Buffers held by the producer.
    pub filling: usize,
    /// Buffers waiting in the handoff queue.
    pub queued: usize,
    /// Buffers held by the consumer.
    pub writing: usize,
}

impl PoolSnapshot {
    /// Buffers lent out and not yet being written (`filling + queued`).
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.filling + self.queued
    }

    /// Sum over every state. Always equals the pool size.
    #[must_use]
    pub fn total(&self) -> usize {
        self.free + self.filling + self.queued + self.writing
    }
}

/// Everything guarded by the single pool mutex.
///
/// The free list and the handoff queue are one resource: a buffer moves between
/// them (through a handle) and the total is conserved, so they share one lock.
pub(crate) struct PoolState {
    pub(crate) free: Vec<FrameBuffer>,
    pub(crate) queue: VecDeque<FrameBuffer>,
    pub(crate) slots: Vec<SlotState>,
    pub(crate) closed: bool,
}

impl PoolState {
    fn snapshot(&self) -> PoolSnapshot {
        let mut snap = PoolSnapshot::default();
        for state in &self.slots {
            match state {
                SlotState::Free => snap.free += 1,
                SlotState::Filling => snap.filling += 1,
                SlotState::Queued => snap.queued += 1,
                SlotState::Writing => snap.writing += 1,
            }
        }
        snap
    }

    /// Put a buffer back on the free list.
    pub(crate) fn recycle(&mut self, mut buffer: FrameBuffer) {
        buffer.reset();
        self.slots[buffer.slot()] = SlotState::Free;
        self.free.push(buffer);
    }
}

pub(crate) struct Shared {
    pub(crate) state: Mutex<PoolState>,
    /// Signalled on every push and on close.
    pub(crate) ready: Condvar,
    size: usize,
    frame_capacity: usize,
}

/// Fixed set of pre-allocated, zero-filled frame buffers.
///
/// Cloning a `FramePool` clones a reference to the same pool. The pool never
/// grows: when every buffer is lent out, [`try_acquire`](Self::try_acquire)
/// returns `None` and the caller decides what to shed.
///
/// # Example
///
/// ```
/// use frame_pool::FramePool;
///
/// let pool = FramePool::new(4, 1024).unwrap();
/// let queue = pool.handoff_queue();
///
/// let mut frame = pool.try_acquire().unwrap();
/// frame.fill_from(b"pixels").unwrap();
/// queue.push(frame).unwrap();
///
/// let frame = queue.pop_blocking().unwrap();
/// assert_eq!(frame.payload(), b"pixels");
/// pool.release(frame);
/// assert_eq!(pool.available(), 4);
/// ```
#[derive(Clone)]
pub struct FramePool {
    pub(crate) shared: Arc<Shared>,
}

impl FramePool {
    /// Create a pool of `size` buffers of `frame_capacity` bytes each.
    ///
    /// All memory is allocated and zero-filled here; nothing is allocated on
    /// the acquire/release path afterwards.
    pub fn new(size: usize, frame_capacity: usize) -> Result<Self, PoolError> {
        if size == 0 {
            return Err(PoolError::EmptyPool);
        }
        if frame_capacity == 0 {
            return Err(PoolError::ZeroCapacity);
        }

        info!(
            pool_size = size,
            frame_capacity_mb = frame_capacity as f64 / (1024.0 * 1024.0),
            total_mb = (size * frame_capacity) as f64 / (1024.0 * 1024.0),
            "Creating frame pool"
        );

        let free = (0..size)
            .map(|slot| FrameBuffer::with_capacity(slot, frame_capacity))
            .collect();

        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(PoolState {
                    free,
                    queue: VecDeque::with_capacity(size),
                    slots: vec![SlotState::Free; size],
                    closed: false,
                }),
                ready: Condvar::new(),
                size,
                frame_capacity,
            }),
        })
    }

    /// Take a free buffer without blocking.
    ///
    /// Returns `None` when the pool is exhausted.
    #[must_use]
    pub fn try_acquire(&self) -> Option<FrameHandle> {
        let buffer = {
            let mut state = self.shared.state.lock();
            let buffer = state.free.pop()?;
            state.slots[buffer.slot()] = SlotState::Filling;
            buffer
        };
        trace!(slot = buffer.slot(), "Acquired frame buffer");
        Some(FrameHandle::new(buffer, Arc::clone(&self.shared)))
    }

    /// Return a buffer to the free list.
    ///
    /// Consumes the handle, so a buffer cannot be released twice or touched
    /// after release.
    pub fn release(&self, handle: FrameHandle) {
        if !Arc::ptr_eq(&self.shared, &handle.shared) {
            warn!(
                slot = handle.slot(),
                "Frame handle released to a different pool; returning it to its own pool"
            );
        }
        handle.recycle();
    }

    /// Create the handoff queue bound to this pool.
    #[must_use]
    pub fn handoff_queue(&self) -> crate::HandoffQueue {
        crate::HandoffQueue {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Number of buffers in the pool.
    #[must_use]
    pub fn size(&self) -> usize {
        self.shared.size
    }

    /// Byte capacity of every buffer.
    #[must_use]
    pub fn frame_capacity(&self) -> usize {
        self.shared.frame_capacity
    }

    /// Number of buffers currently free.
    #[must_use]
    pub fn available(&self) -> usize {
        self.shared.state.lock().free.len()
    }

    /// Count buffers per slot state.
    #[must_use]
    pub fn snapshot(&self) -> PoolSnapshot {
        self.shared.state.lock().snapshot()
    }
}

impl fmt::Debug for FramePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramePool")
            .field("size", &self.size())
            .field("frame_capacity", &self.frame_capacity())
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

/// Exclusive ownership of one pool buffer.
///
/// Not `Clone`: moving the handle moves the buffer. Give it back with
/// [`FramePool::release`] or hand it on with [`HandoffQueue::push`](crate::HandoffQueue::push).
/// A handle dropped any other way returns its buffer to the free list and logs
/// a warning.
pub struct FrameHandle {
    buffer: FrameBuffer,
    shared: Arc<Shared>,
    settled: bool,
}

impl FrameHandle {
    pub(crate) fn new(buffer: FrameBuffer, shared: Arc<Shared>) -> Self {
        Self {
            buffer,
            shared,
            settled: false,
        }
    }

    /// Move the buffer out, leaving an empty placeholder for `Drop`.
    pub(crate) fn take_buffer(&mut self) -> FrameBuffer {
        self.settled = true;
        std::mem::replace(&mut self.buffer, FrameBuffer::placeholder())
    }

    pub(crate) fn belongs_to(&self, shared: &Arc<Shared>) -> bool {
        Arc::ptr_eq(&self.shared, shared)
    }

    fn recycle(mut self) {
        let buffer = self.take_buffer();
        let slot = buffer.slot();
        self.shared.state.lock().recycle(buffer);
        trace!(slot, "Released frame buffer");
    }
}

impl Deref for FrameHandle {
    type Target = FrameBuffer;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.buffer
    }
}

impl DerefMut for FrameHandle {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buffer
    }
}

impl fmt::Debug for FrameHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameHandle")
            .field("slot", &self.buffer.slot())
            .field("len", &self.buffer.len())
            .field("sequence", &self.buffer.sequence)
            .finish()
    }
}

impl Drop for FrameHandle {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let buffer = self.take_buffer();
        warn!(
            slot = buffer.slot(),
            "Frame handle dropped without release; returning buffer to pool"
        );
        self.shared.state.lock().recycle(buffer);
    }
}
