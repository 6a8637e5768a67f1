//! frame_recorder - record a real-time frame stream to disk
//!
//! # Usage
//!
//! ```bash
//! # 60 s of synthetic 1280x720 frames into the current directory
//! frame_recorder
//!
//! # 10 s from a FIFO fed by a capture tool, 640x480 RGB at 30 FPS
//! frame_recorder --input /tmp/camera.fifo --frame-len 921600 --fps 30 --duration 10s
//!
//! # Config file plus overrides, JSON report
//! frame_recorder --config recorder.toml --pool-size 128 --json
//! ```
//!
//! Ctrl-C stops capture; frames already queued are still written.

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use frame_recorder::config::SourceConfig;
use frame_recorder::{source, FileSink, RecorderConfig, Session};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "frame_recorder")]
#[command(about = "Record a real-time frame stream without stalling capture", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Recording length, e.g. "30s" or "2m" ("0s" for no limit)
    #[arg(short, long, value_parser = parse_duration)]
    duration: Option<Duration>,

    /// Stop after this many frames
    #[arg(short, long)]
    frames: Option<u64>,

    /// Number of pre-allocated frame buffers
    #[arg(long)]
    pool_size: Option<usize>,

    /// Bytes per frame buffer
    #[arg(long)]
    frame_capacity: Option<usize>,

    /// Frames discarded before recording starts
    #[arg(long)]
    warmup_frames: Option<u32>,

    /// Directory for the recording
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Read fixed-length frames from this file or FIFO instead of the synthetic source
    #[arg(short, long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Bytes per frame for --input (defaults to the buffer capacity)
    #[arg(long, requires = "input")]
    frame_len: Option<usize>,

    /// Source frame rate
    #[arg(long)]
    fps: Option<f64>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

fn parse_duration(s: &str) -> Result<Duration, humantime_serde::re::humantime::DurationError> {
    humantime_serde::re::humantime::parse_duration(s)
}

impl Args {
    /// Apply command-line overrides on top of the loaded configuration.
    fn apply(&self, config: &mut RecorderConfig) {
        if let Some(duration) = self.duration {
            config.capture.duration = Some(duration);
        }
        if let Some(frames) = self.frames {
            config.capture.max_frames = Some(frames);
        }
        if let Some(size) = self.pool_size {
            config.pool.size = size;
        }
        if let Some(capacity) = self.frame_capacity {
            config.pool.frame_capacity = capacity;
        }
        if let Some(warmup) = self.warmup_frames {
            config.capture.warmup_frames = warmup;
        }
        if let Some(dir) = &self.output_dir {
            config.storage.output_dir = dir.clone();
        }

        if let Some(path) = &self.input {
            config.capture.source = SourceConfig::Reader {
                path: path.clone(),
                frame_len: self.frame_len.unwrap_or(config.pool.frame_capacity),
                fps: self.fps,
            };
        } else if let Some(new_fps) = self.fps {
            match &mut config.capture.source {
                SourceConfig::Synthetic { fps, .. } => *fps = new_fps,
                SourceConfig::Reader { fps, .. } => *fps = Some(new_fps),
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = RecorderConfig::load_from(args.config.as_deref())
        .context("Failed to load configuration")?;
    args.apply(&mut config);

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.application.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    config.validate().context("Invalid configuration")?;

    let mut source =
        source::from_config(&config.capture.source).context("Failed to open frame source")?;
    let mut session = Session::new(config.session_config())?;
    let handle = session.handle();

    tokio::spawn({
        let handle = handle.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C received, finishing recording");
                handle.stop();
            }
        }
    });

    let storage = config.storage.clone();
    let report = tokio::task::spawn_blocking(move || {
        session.run(&mut source, || FileSink::for_storage(&storage, Local::now()))
    })
    .await
    .context("Recording task failed")?
    .context("Recording failed")?;

    if let Some(err) = &report.sink_error {
        warn!(error = %err, "Recording may be incomplete");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
    }

    Ok(())
}
