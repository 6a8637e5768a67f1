//! Fixed-capacity frame buffer stored in pool slots.
//!
//! `FrameBuffer` is designed for reuse across many capture/write cycles:
//! - **Fixed capacity**: zero-filled once at pool creation, never grown or shrunk
//! - **Logical length**: `len()` bytes are valid this cycle, the rest is stale
//! - **O(1) reset**: clears metadata, leaves the byte storage alone

use std::time::Duration;
use thiserror::Error;

/// Returned when a frame does not fit in the buffer it was copied into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("frame data ({len} bytes) exceeds buffer capacity ({capacity} bytes)")]
pub struct CapacityExceeded {
    /// Length of the rejected frame.
    pub len: usize,
    /// Capacity of the buffer it was offered to.
    pub capacity: usize,
}

/// One reusable frame slot.
///
/// # Memory Layout
///
/// - `data`: boxed slice of exactly `capacity` bytes, allocated at pool creation
/// - metadata: a few words inline, no heap allocation
#[derive(Debug)]
pub struct FrameBuffer {
    data: Box<[u8]>,
    len: usize,
    slot: usize,

    /// Capture order of the frame currently held (assigned by the producer).
    pub sequence: u64,

    /// Source timestamp of the frame currently held.
    pub timestamp: Duration,
}

impl FrameBuffer {
    /// Allocate a zero-filled buffer for pool slot `slot`.
    pub(crate) fn with_capacity(slot: usize, capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
            slot,
            sequence: 0,
            timestamp: Duration::ZERO,
        }
    }

    /// Empty stand-in left behind when a buffer is moved out of a handle.
    ///
    /// An empty boxed slice does not allocate.
    pub(crate) fn placeholder() -> Self {
        Self {
            data: Box::default(),
            len: 0,
            slot: usize::MAX,
            sequence: 0,
            timestamp: Duration::ZERO,
        }
    }

    /// Reset metadata for pool reuse.
    ///
    /// Byte storage is not zeroed: the next `fill_from` overwrites the prefix
    /// that matters, and `payload()` never exposes bytes past `len`.
    pub(crate) fn reset(&mut self) {
        self.len = 0;
        self.sequence = 0;
        self.timestamp = Duration::ZERO;
    }

    /// Copy `src` into the buffer and set the logical length.
    ///
    /// On error the buffer is left unchanged.
    pub fn fill_from(&mut self, src: &[u8]) -> Result<(), CapacityExceeded> {
        if src.len() > self.data.len() {
            return Err(CapacityExceeded {
                len: src.len(),
                capacity: self.data.len(),
            });
        }
        self.data[..src.len()].copy_from_slice(src);
        self.len = src.len();
        Ok(())
    }

    /// The bytes written this cycle.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Logical length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when nothing has been written this cycle.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Fixed byte capacity.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Index of the pool slot this buffer belongs to.
    #[inline]
    #[must_use]
    pub fn slot(&self) -> usize {
        self.slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_creation_is_zeroed() {
        let buf = FrameBuffer::with_capacity(3, 1024);
        assert_eq!(buf.capacity(), 1024);
        assert_eq!(buf.slot(), 3);
        assert!(buf.is_empty());
        assert!(buf.data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_fill_sets_logical_length() {
        let mut buf = FrameBuffer::with_capacity(0, 1024);
        let src: Vec<u8> = (0..512).map(|i| i as u8).collect();

        buf.fill_from(&src).unwrap();

        assert_eq!(buf.len(), 512);
        assert_eq!(buf.payload(), &src[..]);
        assert_eq!(buf.capacity(), 1024);
    }

    #[test]
    fn test_shorter_frame_hides_stale_bytes() {
        let mut buf = FrameBuffer::with_capacity(0, 16);
        buf.fill_from(&[7u8; 16]).unwrap();
        buf.fill_from(&[1, 2, 3]).unwrap();

        assert_eq!(buf.payload(), &[1, 2, 3]);
    }

    #[test]
    fn test_fill_overflow_is_rejected() {
        let mut buf = FrameBuffer::with_capacity(0, 100);
        buf.fill_from(&[9u8; 10]).unwrap();

        let err = buf.fill_from(&[0u8; 200]).unwrap_err();

        assert_eq!(
            err,
            CapacityExceeded {
                len: 200,
                capacity: 100
            }
        );
        // Previous contents untouched
        assert_eq!(buf.payload(), &[9u8; 10]);
    }

    #[test]
    fn test_reset_preserves_capacity() {
        let mut buf = FrameBuffer::with_capacity(1, 64);
        buf.fill_from(&[1u8; 32]).unwrap();
        buf.sequence = 42;
        buf.timestamp = Duration::from_millis(5);

        buf.reset();

        assert_eq!(buf.len(), 0);
        assert_eq!(buf.sequence, 0);
        assert_eq!(buf.timestamp, Duration::ZERO);
        assert_eq!(buf.capacity(), 64);
        assert_eq!(buf.slot(), 1);
    }

    #[test]
    fn test_placeholder_is_empty() {
        let buf = FrameBuffer::placeholder();
        assert_eq!(buf.capacity(), 0);
        assert_eq!(buf.slot(), usize::MAX);
    }
}
