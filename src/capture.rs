//! Producer side: pull frames from the source into pool buffers.
//!
//! The capture loop never waits on the writer. When no buffer is free the
//! newest frame is dropped and counted, so capture stays in step with the
//! real-time source under sustained backpressure.

use crate::error::RecorderError;
use crate::session::SessionControl;
use crate::source::{Frame, FrameSource};
use frame_pool::{FramePool, HandoffQueue};
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// When the capture loop should end on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StopCondition {
    /// Stop once this much time has passed since capture started.
    pub duration: Option<Duration>,
    /// Stop once this many frames have been taken from the source.
    pub max_frames: Option<u64>,
}

impl StopCondition {
    /// Stop after `duration` of wall time.
    #[must_use]
    pub fn after(duration: Duration) -> Self {
        Self {
            duration: Some(duration),
            max_frames: None,
        }
    }

    /// Stop after `count` frames.
    #[must_use]
    pub fn frames(count: u64) -> Self {
        Self {
            duration: None,
            max_frames: Some(count),
        }
    }

    fn reached(&self, elapsed: Duration, captured: u64) -> Option<StopReason> {
        if self.max_frames.is_some_and(|max| captured >= max) {
            return Some(StopReason::FrameLimitReached);
        }
        if self.duration.is_some_and(|d| elapsed >= d) {
            return Some(StopReason::DurationElapsed);
        }
        None
    }
}

/// Why the capture loop ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The configured duration elapsed.
    DurationElapsed,
    /// The configured frame count was reached.
    FrameLimitReached,
    /// `stop()` was requested from outside.
    ExternalStop,
    /// The source ran out of frames.
    SourceExhausted,
    /// The source failed or disconnected.
    SourceFailed(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DurationElapsed => write!(f, "duration elapsed"),
            Self::FrameLimitReached => write!(f, "frame limit reached"),
            Self::ExternalStop => write!(f, "stop requested"),
            Self::SourceExhausted => write!(f, "source exhausted"),
            Self::SourceFailed(err) => write!(f, "source failed: {err}"),
        }
    }
}

/// Single-threaded producer bound to one session.
pub(crate) struct CaptureLoop<'a, S: FrameSource + ?Sized> {
    source: &'a mut S,
    pool: &'a FramePool,
    queue: &'a HandoffQueue,
    control: &'a SessionControl,
    stop: StopCondition,
    sequence: u64,
    captured: u64,
    /// Frames dropped since the pool last had a free buffer.
    backpressure_run: u64,
}

impl<'a, S: FrameSource + ?Sized> CaptureLoop<'a, S> {
    pub(crate) fn new(
        source: &'a mut S,
        pool: &'a FramePool,
        queue: &'a HandoffQueue,
        control: &'a SessionControl,
        stop: StopCondition,
    ) -> Self {
        Self {
            source,
            pool,
            queue,
            control,
            stop,
            sequence: 0,
            captured: 0,
            backpressure_run: 0,
        }
    }

    /// Read and discard `count` frames so the source can settle.
    ///
    /// Returns a stop reason if the source ended or a stop was requested
    /// before warm-up finished.
    pub(crate) fn warm_up(&mut self, count: u32) -> Option<StopReason> {
        if count == 0 {
            return None;
        }
        debug!(frames = count, "Warming up source");
        for _ in 0..count {
            if self.control.is_stop_requested() {
                return Some(StopReason::ExternalStop);
            }
            match self.next_frame() {
                Ok(_) => self.control.stats.record_warmup_discarded(),
                Err(reason) => return Some(reason),
            }
        }
        None
    }

    /// Capture until the stop condition fires. `started` anchors the duration.
    pub(crate) fn run(&mut self, started: Instant) -> StopReason {
        loop {
            if self.control.is_stop_requested() {
                return StopReason::ExternalStop;
            }
            if let Some(reason) = self.stop.reached(started.elapsed(), self.captured) {
                return reason;
            }

            let frame = match self.next_frame() {
                Ok(frame) => frame,
                Err(reason) => return reason,
            };
            self.captured += 1;
            self.control.stats.record_captured();
            self.submit(&frame);
        }
    }

    fn next_frame(&mut self) -> Result<Frame, StopReason> {
        match self.source.next_frame() {
            Ok(Some(frame)) => Ok(frame),
            Ok(None) | Err(RecorderError::SourceExhausted) => {
                info!("Frame source exhausted");
                Err(StopReason::SourceExhausted)
            }
            Err(e) => {
                error!(error = %e, "Frame source failed");
                Err(StopReason::SourceFailed(e.to_string()))
            }
        }
    }

    /// Copy one frame into a pool buffer and hand it to the writer, or drop it.
    fn submit(&mut self, frame: &Frame) {
        let sequence = self.sequence;
        self.sequence += 1;

        let Some(mut handle) = self.pool.try_acquire() else {
            self.record_backpressure_drop(sequence);
            return;
        };
        self.end_backpressure();

        if let Err(e) = handle.fill_from(&frame.data) {
            let err = RecorderError::from(e);
            warn!(sequence, error = %err, "Dropping oversized frame");
            self.pool.release(handle);
            self.control.stats.record_dropped();
            return;
        }
        handle.sequence = sequence;
        handle.timestamp = frame.timestamp;

        match self.queue.push(handle) {
            Ok(()) => {
                trace!(sequence, len = frame.data.len(), "Frame submitted");
                self.control.stats.record_submitted();
            }
            Err(e) => {
                warn!(sequence, error = %e, "Frame could not be handed to writer");
                self.control.stats.record_dropped();
            }
        }
    }

    fn record_backpressure_drop(&mut self, sequence: u64) {
        self.control.stats.record_dropped();
        if self.backpressure_run == 0 {
            warn!(
                sequence,
                pool_size = self.pool.size(),
                queued = self.queue.len(),
                "Frame pool exhausted, dropping frames. Writer is slower than capture."
            );
        }
        self.backpressure_run += 1;
    }

    fn end_backpressure(&mut self) {
        if self.backpressure_run > 0 {
            info!(
                dropped = self.backpressure_run,
                "Frame pool recovered from backpressure"
            );
            self.backpressure_run = 0;
        }
    }
}
