//! Core library for the frame_recorder application.
//!
//! Records a real-time frame stream to storage without ever stalling the
//! capture side. Frames are copied into a fixed pool of pre-allocated
//! buffers (see the `frame-pool` crate), handed to a writer thread through a
//! bounded FIFO, and dropped-and-counted when the writer falls behind.
//!
//! # Architecture
//!
//! - [`session`]: lifecycle, threads, and the final report
//! - [`capture`]: producer loop on the caller's thread
//! - [`writer`]: consumer loop on the `frame-writer` thread
//! - [`source`] / [`sink`]: the collaborators at either end
//! - [`config`]: layered configuration (defaults, TOML, environment)
//! - [`stats`]: counters and the [`SessionReport`]
//!
//! # Example
//!
//! ```no_run
//! use frame_recorder::{FileSink, RecorderConfig, Session, source};
//!
//! # fn main() -> frame_recorder::AppResult<()> {
//! let config = RecorderConfig::load_from(None)?;
//! config.validate()?;
//!
//! let mut source = source::from_config(&config.capture.source)?;
//! let mut session = Session::new(config.session_config())?;
//! let report = session.run(&mut source, || {
//!     FileSink::for_storage(&config.storage, chrono::Local::now())
//! })?;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod config;
pub mod error;
pub mod session;
pub mod sink;
pub mod source;
pub mod stats;
pub mod writer;

pub use capture::{StopCondition, StopReason};
pub use config::RecorderConfig;
pub use error::{AppResult, RecorderError};
pub use frame_pool::PoolSnapshot;
pub use session::{Session, SessionConfig, SessionHandle, SessionState};
pub use sink::{FileSink, FrameSink};
pub use source::{Frame, FrameSource};
pub use stats::{SessionReport, StatsSnapshot};
