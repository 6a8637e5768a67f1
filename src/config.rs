//! Layered recorder configuration using Figment.
//!
//! Configuration is loaded in this order of precedence (highest last):
//! 1. Built-in defaults (1280x720 raw frames at 60 FPS for 60 seconds)
//! 2. An optional TOML file
//! 3. Environment variables prefixed with `FRAMEREC_` (`__` separates sections)
//!
//! Command-line flags are applied on top by the binary, followed by
//! [`RecorderConfig::validate`].
//!
//! # Environment Variable Overrides
//!
//! ```text
//! FRAMEREC_APPLICATION__LOG_LEVEL=debug
//! FRAMEREC_POOL__SIZE=128
//! FRAMEREC_CAPTURE__DURATION=10s
//! FRAMEREC_STORAGE__OUTPUT_DIR=/data/recordings
//! ```
//!
//! # Example file
//!
//! ```toml
//! [pool]
//! size = 96
//! frame_capacity = 2764800
//!
//! [capture]
//! duration = "2m"
//! warmup_frames = 30
//!
//! [capture.source]
//! kind = "reader"
//! path = "/tmp/camera.fifo"
//! frame_len = 2764800
//!
//! [storage]
//! output_dir = "recordings"
//! ```

use crate::capture::StopCondition;
use crate::error::{AppResult, RecorderError};
use crate::session::SessionConfig;
use crate::source::{MAX_FPS, MIN_FPS};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "FRAMEREC_";

const DEFAULT_WIDTH: u32 = 1280;
const DEFAULT_HEIGHT: u32 = 720;
const DEFAULT_BYTES_PER_PIXEL: u32 = 3;
const DEFAULT_FPS: f64 = 60.0;

/// Above this the pool is probably sized by mistake.
const POOL_MEMORY_WARN_BYTES: usize = 4 * 1024 * 1024 * 1024;

/// Top-level recorder configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RecorderConfig {
    /// Application settings.
    pub application: ApplicationConfig,
    /// Frame pool sizing.
    pub pool: PoolConfig,
    /// Capture loop settings.
    pub capture: CaptureConfig,
    /// Output settings.
    pub storage: StorageConfig,
}

/// Application-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Logging level (trace, debug, info, warn, error). `RUST_LOG` wins if set.
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Frame pool sizing: `size × frame_capacity` bytes are allocated up front.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of frame buffers.
    pub size: usize,
    /// Bytes per buffer; the largest frame the source may produce.
    pub frame_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            // ~1 s of headroom at 60 FPS
            size: 64,
            frame_capacity: (DEFAULT_WIDTH * DEFAULT_HEIGHT * DEFAULT_BYTES_PER_PIXEL) as usize,
        }
    }
}

/// Capture loop configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Wall-clock recording length. `"0s"` means no time limit.
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub duration: Option<Duration>,
    /// Stop after this many frames have been taken from the source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_frames: Option<u64>,
    /// Frames read and discarded before the clock starts.
    pub warmup_frames: u32,
    /// Where frames come from.
    ///
    /// Never part of the serialized defaults: a `reader` override must not
    /// inherit the synthetic variant's keys. Overriding it requires `kind`.
    #[serde(skip_serializing)]
    pub source: SourceConfig,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            duration: Some(Duration::from_secs(60)),
            max_frames: None,
            warmup_frames: 30,
            source: SourceConfig::default(),
        }
    }
}

impl CaptureConfig {
    /// Stop condition for the capture loop.
    #[must_use]
    pub fn stop_condition(&self) -> StopCondition {
        StopCondition {
            duration: self.duration.filter(|d| !d.is_zero()),
            max_frames: self.max_frames,
        }
    }
}

/// Frame source selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Generated test-pattern frames.
    Synthetic {
        /// Frame width in pixels.
        #[serde(default = "default_width")]
        width: u32,
        /// Frame height in pixels.
        #[serde(default = "default_height")]
        height: u32,
        /// Bytes per pixel.
        #[serde(default = "default_bytes_per_pixel")]
        bytes_per_pixel: u32,
        /// Target frame rate.
        #[serde(default = "default_fps")]
        fps: f64,
        /// End of stream after this many frames.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        frame_limit: Option<u64>,
        /// Vary the frame length like a compressed stream would.
        #[serde(default)]
        variable_length: bool,
    },
    /// Fixed-length frames read from a file or FIFO.
    Reader {
        /// Input path.
        path: PathBuf,
        /// Bytes per frame.
        frame_len: usize,
        /// Pace reads to this rate; unpaced when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fps: Option<f64>,
    },
}

fn default_width() -> u32 {
    DEFAULT_WIDTH
}

fn default_height() -> u32 {
    DEFAULT_HEIGHT
}

fn default_bytes_per_pixel() -> u32 {
    DEFAULT_BYTES_PER_PIXEL
}

fn default_fps() -> f64 {
    DEFAULT_FPS
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self::Synthetic {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            bytes_per_pixel: DEFAULT_BYTES_PER_PIXEL,
            fps: DEFAULT_FPS,
            frame_limit: None,
            variable_length: false,
        }
    }
}

impl SourceConfig {
    /// Largest frame this source can produce, in bytes.
    #[must_use]
    pub fn max_frame_len(&self) -> usize {
        match self {
            Self::Synthetic {
                width,
                height,
                bytes_per_pixel,
                ..
            } => *width as usize * *height as usize * *bytes_per_pixel as usize,
            Self::Reader { frame_len, .. } => *frame_len,
        }
    }

    fn fps(&self) -> Option<f64> {
        match self {
            Self::Synthetic { fps, .. } => Some(*fps),
            Self::Reader { fps, .. } => *fps,
        }
    }

    fn is_unbounded(&self) -> bool {
        matches!(
            self,
            Self::Synthetic {
                frame_limit: None,
                ..
            }
        )
    }
}

/// Output configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for recordings, created if missing.
    pub output_dir: PathBuf,
    /// File name prefix, followed by a local timestamp.
    pub file_prefix: String,
    /// File extension (without the dot).
    pub extension: String,
    /// `fsync` the recording when the writer finishes.
    pub sync_on_finish: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            file_prefix: "record".to_string(),
            extension: "raw".to_string(),
            sync_on_finish: true,
        }
    }
}

impl RecorderConfig {
    /// Load defaults, an optional TOML file, then environment overrides.
    ///
    /// An explicitly named file must exist. The result is not validated; call
    /// [`validate`](Self::validate) after applying command-line overrides.
    pub fn load_from(path: Option<&Path>) -> AppResult<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(path) = path {
            if !path.is_file() {
                return Err(RecorderError::Configuration(format!(
                    "config file '{}' not found",
                    path.display()
                )));
            }
            figment = figment.merge(Toml::file(path));
        }

        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        Ok(config)
    }

    /// Check the configuration is internally consistent.
    ///
    /// Checks:
    /// - Log level is one of trace, debug, info, warn, error
    /// - Pool size and frame capacity are non-zero
    /// - The source cannot produce frames larger than a pool buffer
    /// - Frame rates lie within `MIN_FPS..=MAX_FPS`
    /// - Output file naming is non-empty
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(RecorderError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.pool.size == 0 {
            return Err(RecorderError::Configuration(
                "pool.size must be at least 1".to_string(),
            ));
        }
        if self.pool.frame_capacity == 0 {
            return Err(RecorderError::Configuration(
                "pool.frame_capacity must be at least 1 byte".to_string(),
            ));
        }

        let max_frame = self.capture.source.max_frame_len();
        if max_frame == 0 {
            return Err(RecorderError::Configuration(
                "source frame size must be non-zero".to_string(),
            ));
        }
        if max_frame > self.pool.frame_capacity {
            return Err(RecorderError::Configuration(format!(
                "source frames of {} bytes do not fit pool.frame_capacity of {} bytes",
                max_frame, self.pool.frame_capacity
            )));
        }

        if let Some(fps) = self.capture.source.fps() {
            if !(MIN_FPS..=MAX_FPS).contains(&fps) {
                return Err(RecorderError::Configuration(format!(
                    "Invalid source fps {fps}. Must be between {MIN_FPS} and {MAX_FPS}"
                )));
            }
        }

        if self.storage.file_prefix.is_empty() || self.storage.extension.is_empty() {
            return Err(RecorderError::Configuration(
                "storage.file_prefix and storage.extension must not be empty".to_string(),
            ));
        }

        let pool_bytes = self.pool.size.saturating_mul(self.pool.frame_capacity);
        if pool_bytes > POOL_MEMORY_WARN_BYTES {
            warn!(
                pool_mb = pool_bytes / (1024 * 1024),
                "Frame pool will pre-allocate more than 4 GiB"
            );
        }

        let stop = self.capture.stop_condition();
        if stop.duration.is_none() && stop.max_frames.is_none() && self.capture.source.is_unbounded()
        {
            warn!("No duration or frame limit set; recording runs until interrupted");
        }

        Ok(())
    }

    /// Session parameters derived from this configuration.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            pool_size: self.pool.size,
            frame_capacity: self.pool.frame_capacity,
            warmup_frames: self.capture.warmup_frames,
            stop: self.capture.stop_condition(),
        }
    }
}
