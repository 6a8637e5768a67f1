//! FIFO handoff of filled buffers from the producer to the consumer.

use crate::pool::{FrameHandle, Shared, SlotState};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Why a push was refused. The buffer has already been returned to its pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PushError {
    /// `close()` was called before this push.
    #[error("handoff queue is closed")]
    Closed,

    /// The handle was acquired from a different pool.
    #[error("frame handle belongs to a different pool")]
    ForeignHandle,
}

/// Ordered channel of filled buffers, bounded by the pool size.
///
/// Shares the pool's mutex, so a buffer is always counted exactly once across
/// the free list and the queue. Only [`pop_blocking`](Self::pop_blocking) ever
/// waits.
#[derive(Clone)]
pub struct HandoffQueue {
    pub(crate) shared: Arc<Shared>,
}

impl HandoffQueue {
    /// Enqueue a filled buffer and wake one waiting consumer.
    ///
    /// Never blocks. On error the buffer goes back to the free list.
    pub fn push(&self, mut handle: FrameHandle) -> Result<(), PushError> {
        if !handle.belongs_to(&self.shared) {
            warn!(
                slot = handle.slot(),
                "Refusing to enqueue a frame from a different pool"
            );
            // Drop returns it to its own pool.
            drop(handle);
            return Err(PushError::ForeignHandle);
        }

        let buffer = handle.take_buffer();
        {
            let mut state = self.shared.state.lock();
            if state.closed {
                state.recycle(buffer);
                return Err(PushError::Closed);
            }
            state.slots[buffer.slot()] = SlotState::Queued;
            state.queue.push_back(buffer);
        }
        self.shared.ready.notify_one();
        Ok(())
    }

    /// Take the oldest buffer, waiting until one arrives.
    ///
    /// Returns `None` once the queue is closed and fully drained.
    #[must_use]
    pub fn pop_blocking(&self) -> Option<FrameHandle> {
        let mut state = self.shared.state.lock();
        loop {
            if let Some(buffer) = state.queue.pop_front() {
                state.slots[buffer.slot()] = SlotState::Writing;
                drop(state);
                return Some(FrameHandle::new(buffer, Arc::clone(&self.shared)));
            }
            if state.closed {
                return None;
            }
            self.shared.ready.wait(&mut state);
        }
    }

    /// Mark the queue closed and wake every waiting consumer.
    ///
    /// Entries already queued are still handed out by `pop_blocking`.
    /// Returns `true` only for the call that performed the close.
    pub fn close(&self) -> bool {
        let newly_closed = {
            let mut state = self.shared.state.lock();
            !std::mem::replace(&mut state.closed, true)
        };
        if newly_closed {
            debug!(pending = self.len(), "Handoff queue closed");
            self.shared.ready.notify_all();
        }
        newly_closed
    }

    /// Entries waiting to be popped.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// True when nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once `close()` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }
}

impl fmt::Debug for HandoffQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("HandoffQueue")
            .field("len", &state.queue.len())
            .field("closed", &state.closed)
            .finish()
    }
}
