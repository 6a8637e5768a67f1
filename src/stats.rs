//! Session counters and the final report.

use crate::capture::StopReason;
use frame_pool::PoolSnapshot;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Monotonic counters shared by the capture and writer threads.
///
/// Updated with relaxed atomics: snapshots taken during a run are
/// informational only. Values are final once the writer has been joined.
#[derive(Debug, Default)]
pub struct SessionStats {
    captured: AtomicU64,
    submitted: AtomicU64,
    dropped: AtomicU64,
    written: AtomicU64,
    write_failures: AtomicU64,
    bytes_written: AtomicU64,
    warmup_discarded: AtomicU64,
}

impl SessionStats {
    pub(crate) fn record_captured(&self) {
        self.captured.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_written(&self, bytes: usize) {
        self.written.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_warmup_discarded(&self) {
        self.warmup_discarded.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current counter values.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            captured: self.captured.load(Ordering::Relaxed),
            submitted: self.submitted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            warmup_discarded: self.warmup_discarded.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`SessionStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    /// Frames taken from the source after warm-up.
    pub captured: u64,
    /// Frames handed to the writer.
    pub submitted: u64,
    /// Frames discarded on the capture side (pool exhausted or oversized).
    pub dropped: u64,
    /// Frames persisted.
    pub written: u64,
    /// Frames the sink rejected.
    pub write_failures: u64,
    /// Payload bytes persisted.
    pub bytes_written: u64,
    /// Frames discarded while the source warmed up.
    pub warmup_discarded: u64,
}

impl StatsSnapshot {
    /// Frames not persisted for any reason.
    #[must_use]
    pub fn lost(&self) -> u64 {
        self.dropped + self.write_failures
    }

    /// True when every captured frame is accounted for as written or lost.
    #[must_use]
    pub fn is_balanced(&self) -> bool {
        self.captured == self.submitted + self.dropped
            && self.submitted == self.written + self.write_failures
    }
}

/// Final outcome of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    /// Final counters.
    pub stats: StatsSnapshot,
    /// Capture time: from the end of warm-up until the capture loop returned.
    /// Excludes draining the writer's backlog.
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
    /// Time spent waiting for the writer to drain and exit after capture.
    #[serde(with = "humantime_serde")]
    pub drain: Duration,
    /// Buffer states after the writer joined. Everything is free on a clean run.
    #[serde(skip)]
    pub pool: PoolSnapshot,
    /// Why capture ended.
    pub stop_reason: StopReason,
    /// Error from the sink's final flush, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sink_error: Option<String>,
}

impl SessionReport {
    /// Captured frames per second of capture time.
    #[must_use]
    pub fn average_fps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.stats.captured as f64 / secs
        } else {
            0.0
        }
    }
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.stats;
        writeln!(f, "Stopped: {}", self.stop_reason)?;
        writeln!(f, "Frames captured: {}", s.captured)?;
        writeln!(f, "Frames written: {}", s.written)?;
        writeln!(f, "Frames dropped: {}", s.dropped)?;
        if s.write_failures > 0 {
            writeln!(f, "Write failures: {}", s.write_failures)?;
        }
        writeln!(
            f,
            "Bytes written: {:.1} MB",
            s.bytes_written as f64 / (1024.0 * 1024.0)
        )?;
        writeln!(f, "Real Duration: {:.3}s", self.elapsed.as_secs_f64())?;
        writeln!(f, "Drain time: {:.3}s", self.drain.as_secs_f64())?;
        write!(f, "Average FPS: {:.2}", self.average_fps())?;
        if let Some(err) = &self.sink_error {
            write!(f, "\nSink error: {err}")?;
        }
        Ok(())
    }
}
