//! Shared sources and sinks for session integration tests.

#![allow(dead_code)]

use bytes::Bytes;
use frame_recorder::source::FramePacer;
use frame_recorder::{
    AppResult, Frame, FrameSink, FrameSource, RecorderError, SessionHandle, SessionState,
};
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Frames carry their source index in the first four bytes (little endian).
pub fn frame_index(payload: &[u8]) -> u32 {
    let mut idx = [0u8; 4];
    idx.copy_from_slice(&payload[..4]);
    u32::from_le_bytes(idx)
}

/// Numbered frames, optionally paced, limited, or failing at a given index.
pub struct TestSource {
    next: u32,
    limit: Option<u32>,
    len: usize,
    pacer: Option<FramePacer>,
    fail_at: Option<u32>,
    started: Instant,
    /// Number of `next_frame` calls so far.
    pub polled: usize,
}

impl TestSource {
    /// Exactly `count` frames of `len` bytes, as fast as possible.
    pub fn limited(count: u32, len: usize) -> Self {
        Self {
            limit: Some(count),
            ..Self::unbounded(len)
        }
    }

    /// Frames forever.
    pub fn unbounded(len: usize) -> Self {
        assert!(len >= 4, "frames must hold their index");
        Self {
            next: 0,
            limit: None,
            len,
            pacer: None,
            fail_at: None,
            started: Instant::now(),
            polled: 0,
        }
    }

    /// One frame every `interval`.
    pub fn every(mut self, interval: Duration) -> Self {
        self.pacer = Some(FramePacer::new(1.0 / interval.as_secs_f64()));
        self
    }

    /// Fail with a source error instead of producing frame `index`.
    pub fn failing_at(mut self, index: u32) -> Self {
        self.fail_at = Some(index);
        self
    }
}

impl FrameSource for TestSource {
    fn next_frame(&mut self) -> AppResult<Option<Frame>> {
        self.polled += 1;
        if self.fail_at == Some(self.next) {
            return Err(RecorderError::Source("sensor disconnected".to_string()));
        }
        if self.limit.is_some_and(|limit| self.next >= limit) {
            return Ok(None);
        }
        if let Some(pacer) = self.pacer.as_mut() {
            pacer.wait();
        }

        let mut data = vec![0xA5; self.len];
        data[..4].copy_from_slice(&self.next.to_le_bytes());
        self.next += 1;
        Ok(Some(Frame {
            data: Bytes::from(data),
            timestamp: self.started.elapsed(),
        }))
    }
}

/// In-memory sink with optional per-frame delay, failures, and a start gate.
#[derive(Clone, Default)]
pub struct RecordingSink {
    frames: Arc<Mutex<Vec<Vec<u8>>>>,
    calls: Arc<AtomicUsize>,
    finished: Arc<AtomicBool>,
    delay: Duration,
    fail_every: Option<usize>,
    gate: Option<SessionHandle>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long in every write.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Reject every `n`th write.
    pub fn failing_every(mut self, n: usize) -> Self {
        self.fail_every = Some(n);
        self
    }

    /// Hold the first write until the session is draining.
    pub fn gated_on(mut self, handle: SessionHandle) -> Self {
        self.gate = Some(handle);
        self
    }

    /// Payloads persisted so far, in write order.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.frames.lock().clone()
    }

    /// Indices of persisted frames, in write order.
    pub fn indices(&self) -> Vec<u32> {
        self.frames.lock().iter().map(|f| frame_index(f)).collect()
    }

    /// Whether `finish` was called.
    pub fn finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    fn wait_for_gate(&mut self) {
        let Some(handle) = self.gate.take() else {
            return;
        };
        let deadline = Instant::now() + Duration::from_secs(10);
        while !matches!(
            handle.state(),
            SessionState::Draining | SessionState::Stopped
        ) && Instant::now() < deadline
        {
            thread::sleep(Duration::from_millis(1));
        }
    }
}

impl FrameSink for RecordingSink {
    fn write_frame(&mut self, payload: &[u8]) -> io::Result<()> {
        self.wait_for_gate();
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_every.is_some_and(|n| call % n == 0) {
            return Err(io::Error::new(io::ErrorKind::Other, "device full"));
        }
        self.frames.lock().push(payload.to_vec());
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        self.finished.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Sink whose final flush fails.
pub struct UnflushableSink;

impl FrameSink for UnflushableSink {
    fn write_frame(&mut self, _payload: &[u8]) -> io::Result<()> {
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Other, "fsync failed"))
    }
}
