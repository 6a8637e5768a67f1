//! Custom error types for the recorder.
//!
//! `RecorderError` is the single error type of the library. It follows the
//! propagation policy of the pipeline:
//!
//! - **Producer side** conditions never surface here. Pool exhaustion and
//!   oversized frames are counted as drops by the capture loop.
//! - **`SinkOpenFailed`** is fatal and returned by `Session::run` before any
//!   frame is captured.
//! - **`SinkWriteFailed`** describes a per-frame failure. The writer logs and
//!   counts it and keeps draining, so it is never returned from a session.
//! - **`SourceExhausted`** is a normal (if early) stop, not a failure.
//!
//! Using `#[from]`, configuration, pool and I/O errors convert with `?`.

use crate::session::SessionState;
use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias for results using the recorder error type.
pub type AppResult<T> = std::result::Result<T, RecorderError>;

/// Errors raised by the recorder.
#[derive(Error, Debug)]
pub enum RecorderError {
    /// Layered configuration could not be loaded or parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Configuration parsed but is not usable.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// The frame pool could not be built.
    #[error("Frame pool error: {0}")]
    Pool(#[from] frame_pool::PoolError),

    /// The frame source has no more frames.
    #[error("Frame source exhausted")]
    SourceExhausted,

    /// The frame source failed or disconnected.
    #[error("Frame source error: {0}")]
    Source(String),

    /// The sink could not be opened; nothing was recorded.
    #[error("Failed to open sink at {}: {source}", path.display())]
    SinkOpenFailed {
        /// Destination that was being opened.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A single frame could not be persisted.
    #[error("Sink write failed: {0}")]
    SinkWriteFailed(#[source] std::io::Error),

    /// A frame did not fit in a pool buffer.
    #[error("Frame of {len} bytes exceeds buffer capacity of {capacity} bytes")]
    FrameTooLarge {
        /// Frame length.
        len: usize,
        /// Buffer capacity.
        capacity: usize,
    },

    /// A session operation was called in the wrong lifecycle state.
    #[error("Cannot {action} a session that is {state}")]
    InvalidState {
        /// The attempted operation.
        action: &'static str,
        /// The state the session was in.
        state: SessionState,
    },

    /// The writer thread panicked; the recording is incomplete.
    #[error("Writer thread panicked")]
    WriterPanicked,

    /// Generic I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<frame_pool::CapacityExceeded> for RecorderError {
    fn from(err: frame_pool::CapacityExceeded) -> Self {
        Self::FrameTooLarge {
            len: err.len,
            capacity: err.capacity,
        }
    }
}
