//! Storage sinks for the writer loop.
//!
//! Frames are persisted verbatim and in order: one `write_frame` call per
//! frame, no framing, no re-encoding. Any container/codec work is an offline
//! step after recording.

use crate::config::StorageConfig;
use crate::error::{AppResult, RecorderError};
use chrono::{DateTime, Local};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Consumer-side collaborator. Owned by the writer thread once recording starts.
pub trait FrameSink: Send {
    /// Persist one frame's payload.
    fn write_frame(&mut self, payload: &[u8]) -> io::Result<()>;

    /// Flush everything to durable storage. Called once after the last frame.
    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: FrameSink + ?Sized> FrameSink for Box<S> {
    fn write_frame(&mut self, payload: &[u8]) -> io::Result<()> {
        (**self).write_frame(payload)
    }

    fn finish(&mut self) -> io::Result<()> {
        (**self).finish()
    }
}

/// Path of a new recording started at `started`.
///
/// `<output_dir>/<prefix>_%Y-%m-%d_%H-%M-%S.<extension>`
#[must_use]
pub fn recording_path(storage: &StorageConfig, started: DateTime<Local>) -> PathBuf {
    let file_name = format!(
        "{}_{}.{}",
        storage.file_prefix,
        started.format("%Y-%m-%d_%H-%M-%S"),
        storage.extension
    );
    storage.output_dir.join(file_name)
}

/// Appends frames to a single file.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    writer: BufWriter<File>,
    sync_on_finish: bool,
    bytes_written: u64,
}

impl FileSink {
    /// Create (or truncate) `path`, creating its parent directory if needed.
    pub fn create(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref().to_path_buf();
        let open_failed = |source| RecorderError::SinkOpenFailed {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(open_failed)?;
                debug!(dir = %parent.display(), "Created output directory");
            }
        }

        let file = File::create(&path).map_err(open_failed)?;
        info!(path = %path.display(), "Recording to file");

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            sync_on_finish: true,
            bytes_written: 0,
        })
    }

    /// Open the timestamped recording file described by `storage`.
    pub fn for_storage(storage: &StorageConfig, started: DateTime<Local>) -> AppResult<Self> {
        let mut sink = Self::create(recording_path(storage, started))?;
        sink.sync_on_finish = storage.sync_on_finish;
        Ok(sink)
    }

    /// Skip `fsync` in `finish`.
    #[must_use]
    pub fn without_sync(mut self) -> Self {
        self.sync_on_finish = false;
        self
    }

    /// Destination path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Payload bytes accepted so far.
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

impl FrameSink for FileSink {
    fn write_frame(&mut self, payload: &[u8]) -> io::Result<()> {
        self.writer.write_all(payload)?;
        self.bytes_written += payload.len() as u64;
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        if self.sync_on_finish {
            self.writer.get_ref().sync_all()?;
        }
        info!(
            path = %self.path.display(),
            bytes = self.bytes_written,
            "Recording file closed"
        );
        Ok(())
    }
}
