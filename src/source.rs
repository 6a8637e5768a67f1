//! Frame sources feeding the capture loop.
//!
//! Physical sensor access lives outside this crate; a source only has to hand
//! over one frame's bytes per call. Two stand-ins are provided:
//!
//! - [`SyntheticSource`]: paced test-pattern frames, optionally variable length
//! - [`ReaderSource`]: fixed-length frames read from any `io::Read` (file, FIFO)

use crate::config::SourceConfig;
use crate::error::{AppResult, RecorderError};
use bytes::{Bytes, BytesMut};
use rand::Rng;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Number of distinct pattern frames the synthetic source cycles through.
const PATTERN_FRAMES: usize = 8;

/// Slowest pacing rate: one frame every ~17 minutes.
pub const MIN_FPS: f64 = 1e-3;

/// Fastest pacing rate: one frame per microsecond.
pub const MAX_FPS: f64 = 1e6;

/// One frame as delivered by a source.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw or already-compressed payload, stored verbatim.
    pub data: Bytes,
    /// Capture time relative to the start of the stream.
    pub timestamp: Duration,
}

/// Producer-side collaborator.
///
/// `next_frame` may block until the next frame is due. `Ok(None)` (or
/// `Err(RecorderError::SourceExhausted)`) ends the stream normally; any other
/// error ends it as a failure.
pub trait FrameSource {
    /// Wait for and return the next frame.
    fn next_frame(&mut self) -> AppResult<Option<Frame>>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> AppResult<Option<Frame>> {
        (**self).next_frame()
    }
}

/// Build the source described by `config`.
pub fn from_config(config: &SourceConfig) -> AppResult<Box<dyn FrameSource + Send>> {
    match config {
        SourceConfig::Synthetic {
            width,
            height,
            bytes_per_pixel,
            fps,
            frame_limit,
            variable_length,
        } => {
            let mut source =
                SyntheticSource::new(*width, *height, *bytes_per_pixel, *fps, *frame_limit);
            if *variable_length {
                source = source.with_variable_length();
            }
            Ok(Box::new(source))
        }
        SourceConfig::Reader {
            path,
            frame_len,
            fps,
        } => {
            let file = File::open(path).map_err(|e| {
                RecorderError::Source(format!("cannot open {}: {e}", path.display()))
            })?;
            info!(path = %path.display(), frame_len, "Reading frames from file");
            let mut source = ReaderSource::new(BufReader::new(file), *frame_len);
            if let Some(fps) = fps {
                source = source.paced(*fps);
            }
            Ok(Box::new(source))
        }
    }
}

/// Sleeps the caller until the next frame tick.
///
/// Ticks are scheduled from the start time, so a late frame does not shift
/// every later frame.
#[derive(Debug)]
pub struct FramePacer {
    interval: Duration,
    next: Option<Instant>,
}

impl FramePacer {
    /// Pacer for `fps` frames per second, clamped to `MIN_FPS..=MAX_FPS`.
    #[must_use]
    pub fn new(fps: f64) -> Self {
        let clamped = if fps.is_nan() {
            MAX_FPS
        } else {
            fps.clamp(MIN_FPS, MAX_FPS)
        };
        if clamped != fps {
            warn!(requested = fps, fps = clamped, "Frame rate out of range, clamped");
        }
        Self {
            interval: Duration::from_secs_f64(1.0 / clamped),
            next: None,
        }
    }

    /// Time between ticks.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Block until the next tick. The first call returns immediately.
    pub fn wait(&mut self) {
        let now = Instant::now();
        let due = *self.next.get_or_insert(now);
        if due > now {
            thread::sleep(due - now);
        }
        // Skip ticks we are already behind on instead of bursting to catch up.
        let mut next = due + self.interval;
        let now = Instant::now();
        if next <= now {
            let interval = self.interval.as_nanos();
            let skip = ((now - next).as_nanos() / interval + 1) * interval;
            next += Duration::from_nanos(u64::try_from(skip).unwrap_or(u64::MAX));
        }
        self.next = Some(next);
    }
}

/// Test-pattern generator standing in for a camera.
///
/// Frames are moving gradients, pre-rendered once and handed out as cheap
/// `Bytes` clones.
#[derive(Debug)]
pub struct SyntheticSource {
    patterns: Vec<Bytes>,
    pacer: FramePacer,
    frame_limit: Option<u64>,
    variable_length: bool,
    produced: u64,
    started: Instant,
}

impl SyntheticSource {
    /// Source of `width × height × bytes_per_pixel` frames at `fps`.
    #[must_use]
    pub fn new(
        width: u32,
        height: u32,
        bytes_per_pixel: u32,
        fps: f64,
        frame_limit: Option<u64>,
    ) -> Self {
        let row = width as usize * bytes_per_pixel as usize;
        let frame_len = row * height as usize;
        let patterns = (0..PATTERN_FRAMES)
            .map(|phase| {
                let mut frame = BytesMut::zeroed(frame_len);
                for (y, line) in frame.chunks_mut(row.max(1)).enumerate() {
                    for (x, byte) in line.iter_mut().enumerate() {
                        *byte = (x + y + phase * 16) as u8;
                    }
                }
                frame.freeze()
            })
            .collect();

        debug!(width, height, bytes_per_pixel, fps, "Synthetic source ready");

        Self {
            patterns,
            pacer: FramePacer::new(fps),
            frame_limit,
            variable_length: false,
            produced: 0,
            started: Instant::now(),
        }
    }

    /// Emit frames of random length, like a compressed stream.
    #[must_use]
    pub fn with_variable_length(mut self) -> Self {
        self.variable_length = true;
        self
    }

    /// Frames handed out so far.
    #[must_use]
    pub fn produced(&self) -> u64 {
        self.produced
    }
}

impl FrameSource for SyntheticSource {
    fn next_frame(&mut self) -> AppResult<Option<Frame>> {
        if self.frame_limit.is_some_and(|limit| self.produced >= limit) {
            return Ok(None);
        }
        self.pacer.wait();

        let pattern = &self.patterns[self.produced as usize % self.patterns.len()];
        let data = if self.variable_length && pattern.len() > 1 {
            let len = rand::thread_rng().gen_range(pattern.len() / 4..=pattern.len());
            pattern.slice(..len.max(1))
        } else {
            pattern.clone()
        };

        self.produced += 1;
        Ok(Some(Frame {
            data,
            timestamp: self.started.elapsed(),
        }))
    }
}

/// Fixed-length frames read sequentially from a byte stream.
///
/// Frames are read into one scratch allocation that is reclaimed once the
/// previous frame's `Bytes` has been dropped.
#[derive(Debug)]
pub struct ReaderSource<R> {
    reader: R,
    frame_len: usize,
    scratch: BytesMut,
    pacer: Option<FramePacer>,
    started: Instant,
}

impl<R: Read> ReaderSource<R> {
    /// Read frames of `frame_len` bytes from `reader`.
    pub fn new(reader: R, frame_len: usize) -> Self {
        Self {
            reader,
            frame_len,
            scratch: BytesMut::with_capacity(frame_len),
            pacer: None,
            started: Instant::now(),
        }
    }

    /// Deliver at most `fps` frames per second.
    #[must_use]
    pub fn paced(mut self, fps: f64) -> Self {
        self.pacer = Some(FramePacer::new(fps));
        self
    }
}

/// Fill `buf` completely; `Ok(false)` means clean end of stream.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    if filled == 0 {
        return Ok(false);
    }
    if filled < buf.len() {
        warn!(
            expected = buf.len(),
            got = filled,
            "Discarding truncated trailing frame"
        );
        return Ok(false);
    }
    Ok(true)
}

impl<R: Read> FrameSource for ReaderSource<R> {
    fn next_frame(&mut self) -> AppResult<Option<Frame>> {
        if let Some(pacer) = self.pacer.as_mut() {
            pacer.wait();
        }
        // Reclaims the previous frame's allocation when it is no longer shared.
        self.scratch.clear();
        self.scratch.resize(self.frame_len, 0);
        let complete = read_full(&mut self.reader, &mut self.scratch)
            .map_err(|e| RecorderError::Source(e.to_string()))?;
        if !complete {
            return Ok(None);
        }
        Ok(Some(Frame {
            data: self.scratch.split().freeze(),
            timestamp: self.started.elapsed(),
        }))
    }
}
