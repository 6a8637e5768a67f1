//! Recording session: wires source, pool, writer and sink together.
//!
//! ```text
//!   Idle ──run()──► Running ──stop condition──► Draining ──writer joined──► Stopped
//!     │                                                                       ▲
//!     └──────────────────────── sink failed to open ─────────────────────────┘
//! ```
//!
//! Capture runs on the thread that calls [`Session::run`]; the writer runs on
//! a dedicated `frame-writer` thread. [`SessionHandle`] can be cloned to other
//! threads to request a stop or observe progress.

use crate::capture::{CaptureLoop, StopCondition};
use crate::error::{AppResult, RecorderError};
use crate::sink::FrameSink;
use crate::source::FrameSource;
use crate::stats::{SessionReport, SessionStats, StatsSnapshot};
use crate::writer::WriterLoop;
use frame_pool::FramePool;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Created, not yet run.
    Idle,
    /// Capturing frames.
    Running,
    /// Capture ended; the writer is draining the queue.
    Draining,
    /// Writer joined; the report is final.
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Parameters of one recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Number of pre-allocated frame buffers.
    pub pool_size: usize,
    /// Bytes per frame buffer.
    pub frame_capacity: usize,
    /// Frames discarded before the session clock starts.
    pub warmup_frames: u32,
    /// When capture ends on its own.
    pub stop: StopCondition,
}

/// State shared between the session, its handles, and both loops.
#[derive(Debug)]
pub(crate) struct SessionControl {
    state: Mutex<SessionState>,
    stop: AtomicBool,
    pub(crate) stats: SessionStats,
}

impl Default for SessionControl {
    fn default() -> Self {
        Self {
            state: Mutex::new(SessionState::Idle),
            stop: AtomicBool::new(false),
            stats: SessionStats::default(),
        }
    }
}

impl SessionControl {
    /// Returns `true` only for the first request.
    pub(crate) fn request_stop(&self) -> bool {
        !self.stop.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub(crate) fn state(&self) -> SessionState {
        *self.state.lock()
    }

    fn set_state(&self, next: SessionState) {
        let mut state = self.state.lock();
        debug!(from = %*state, to = %next, "Session state change");
        *state = next;
    }
}

/// Thread-safe remote control for a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    control: Arc<SessionControl>,
}

impl SessionHandle {
    /// Ask capture to stop after the current frame. Queued frames are still
    /// written.
    ///
    /// Idempotent: returns `true` only for the first request.
    pub fn stop(&self) -> bool {
        let first = self.control.request_stop();
        if first {
            info!(state = %self.control.state(), "Stop requested");
        }
        first
    }

    /// Whether a stop has been requested.
    #[must_use]
    pub fn is_stop_requested(&self) -> bool {
        self.control.is_stop_requested()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.control.state()
    }

    /// Counters so far. Final once the state is [`SessionState::Stopped`].
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.control.stats.snapshot()
    }
}

/// One recording from a frame source into a sink.
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    control: Arc<SessionControl>,
}

impl Session {
    /// Create an idle session.
    ///
    /// # Errors
    ///
    /// `Configuration` if the pool would have no buffers or zero-byte buffers.
    pub fn new(config: SessionConfig) -> AppResult<Self> {
        if config.pool_size == 0 {
            return Err(RecorderError::Configuration(
                "pool size must be at least 1".to_string(),
            ));
        }
        if config.frame_capacity == 0 {
            return Err(RecorderError::Configuration(
                "frame capacity must be at least 1 byte".to_string(),
            ));
        }
        Ok(Self {
            config,
            control: Arc::new(SessionControl::default()),
        })
    }

    /// Cloneable handle for stopping or observing the session from elsewhere.
    #[must_use]
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            control: Arc::clone(&self.control),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.control.state()
    }

    /// Same as [`SessionHandle::stop`].
    pub fn stop(&self) -> bool {
        self.handle().stop()
    }

    /// Session parameters.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Record until the stop condition fires, then drain and report.
    ///
    /// `open_sink` runs first, on the calling thread. If it fails nothing is
    /// captured, the source is never polled and the session goes straight to
    /// `Stopped`.
    ///
    /// # Errors
    ///
    /// - `InvalidState` if the session is not `Idle`
    /// - whatever `open_sink` returns (typically `SinkOpenFailed`)
    /// - `WriterPanicked` if the writer thread panicked
    pub fn run<Src, Snk, F>(&mut self, source: &mut Src, open_sink: F) -> AppResult<SessionReport>
    where
        Src: FrameSource + ?Sized,
        Snk: FrameSink + 'static,
        F: FnOnce() -> AppResult<Snk>,
    {
        let state = self.state();
        if state != SessionState::Idle {
            return Err(RecorderError::InvalidState {
                action: "run",
                state,
            });
        }

        let sink = match open_sink() {
            Ok(sink) => sink,
            Err(e) => {
                error!(error = %e, "Failed to open sink, nothing recorded");
                self.control.set_state(SessionState::Stopped);
                return Err(e);
            }
        };

        let pool = match FramePool::new(self.config.pool_size, self.config.frame_capacity) {
            Ok(pool) => pool,
            Err(e) => {
                self.control.set_state(SessionState::Stopped);
                return Err(e.into());
            }
        };
        let queue = pool.handoff_queue();

        let mut capture = CaptureLoop::new(
            source,
            &pool,
            &queue,
            &self.control,
            self.config.stop,
        );
        let warmup_stop = capture.warm_up(self.config.warmup_frames);

        let writer = WriterLoop::new(sink, pool.clone(), queue.clone(), Arc::clone(&self.control));
        let writer = match writer.spawn() {
            Ok(handle) => handle,
            Err(e) => {
                error!(error = %e, "Failed to start writer thread");
                self.control.set_state(SessionState::Stopped);
                return Err(e.into());
            }
        };

        info!(
            pool_size = self.config.pool_size,
            frame_capacity = self.config.frame_capacity,
            "Recording started"
        );
        let started = Instant::now();
        self.control.set_state(SessionState::Running);
        let stop_reason = match warmup_stop {
            Some(reason) => reason,
            None => capture.run(started),
        };
        let elapsed = started.elapsed();

        self.control.set_state(SessionState::Draining);
        queue.close();
        info!(reason = %stop_reason, queued = queue.len(), "Capture stopped, draining writer");

        let draining = Instant::now();
        let joined = writer.join();
        let drain = draining.elapsed();
        self.control.set_state(SessionState::Stopped);

        let outcome = joined.map_err(|_| {
            error!("Writer thread panicked");
            RecorderError::WriterPanicked
        })?;

        let stats = self.control.stats.snapshot();
        let residual = pool.snapshot();
        info!(
            captured = stats.captured,
            written = stats.written,
            dropped = stats.dropped,
            write_failures = stats.write_failures,
            free = residual.free,
            queued = residual.queued,
            drain_ms = drain.as_millis() as u64,
            "Recording finished"
        );

        Ok(SessionReport {
            stats,
            elapsed,
            drain,
            pool: residual,
            stop_reason,
            sink_error: outcome.finish_error.map(|e| e.to_string()),
        })
    }
}
