//! Consumer side: drain the handoff queue into the sink.

use crate::error::RecorderError;
use crate::session::SessionControl;
use crate::sink::FrameSink;
use frame_pool::{FramePool, HandoffQueue};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, trace, warn};

/// Name of the writer thread.
pub const WRITER_THREAD_NAME: &str = "frame-writer";

/// What the writer reports back when it exits.
#[derive(Debug)]
pub(crate) struct WriterOutcome {
    /// Error from the sink's final flush, if any.
    pub(crate) finish_error: Option<io::Error>,
}

/// Owns the sink for the lifetime of a session.
pub(crate) struct WriterLoop<S> {
    sink: S,
    pool: FramePool,
    queue: HandoffQueue,
    control: Arc<SessionControl>,
}

impl<S: FrameSink + 'static> WriterLoop<S> {
    pub(crate) fn new(
        sink: S,
        pool: FramePool,
        queue: HandoffQueue,
        control: Arc<SessionControl>,
    ) -> Self {
        Self {
            sink,
            pool,
            queue,
            control,
        }
    }

    /// Start the writer on its own thread.
    pub(crate) fn spawn(self) -> io::Result<JoinHandle<WriterOutcome>> {
        thread::Builder::new()
            .name(WRITER_THREAD_NAME.to_string())
            .spawn(move || self.run())
    }

    /// Drain until the queue is closed and empty, then finish the sink.
    ///
    /// A failed write is logged and counted; the buffer is still released and
    /// draining continues with the next frame.
    pub(crate) fn run(mut self) -> WriterOutcome {
        debug!("Writer started");
        while let Some(handle) = self.queue.pop_blocking() {
            match self.sink.write_frame(handle.payload()) {
                Ok(()) => {
                    trace!(sequence = handle.sequence, len = handle.len(), "Frame written");
                    self.control.stats.record_written(handle.len());
                }
                Err(e) => {
                    let err = RecorderError::SinkWriteFailed(e);
                    warn!(sequence = handle.sequence, error = %err, "Frame write failed");
                    self.control.stats.record_write_failure();
                }
            }
            self.pool.release(handle);
        }

        let finish_error = match self.sink.finish() {
            Ok(()) => None,
            Err(e) => {
                error!(error = %e, "Failed to finish sink");
                Some(e)
            }
        };
        debug!(
            written = self.control.stats.snapshot().written,
            "Writer drained and exiting"
        );
        WriterOutcome { finish_error }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tracing_test::traced_test;

    #[derive(Clone, Default)]
    struct SharedSink {
        frames: Arc<Mutex<Vec<Vec<u8>>>>,
        fail_every: Option<usize>,
        calls: Arc<Mutex<usize>>,
    }

    impl FrameSink for SharedSink {
        fn write_frame(&mut self, payload: &[u8]) -> io::Result<()> {
            let mut calls = self.calls.lock();
            *calls += 1;
            if self.fail_every.is_some_and(|n| *calls % n == 0) {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            self.frames.lock().push(payload.to_vec());
            Ok(())
        }

        fn finish(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "flush failed"))
        }
    }

    fn queue_frames(pool: &FramePool, queue: &HandoffQueue, count: u8) {
        for i in 0..count {
            let mut frame = pool.try_acquire().unwrap();
            frame.fill_from(&[i; 3]).unwrap();
            queue.push(frame).unwrap();
        }
    }

    #[test]
    fn test_writer_drains_in_order_and_releases() {
        let pool = FramePool::new(4, 8).unwrap();
        let queue = pool.handoff_queue();
        let control = Arc::new(SessionControl::default());
        let sink = SharedSink::default();

        queue_frames(&pool, &queue, 4);
        queue.close();

        let outcome = WriterLoop::new(sink.clone(), pool.clone(), queue.clone(), Arc::clone(&control))
            .spawn()
            .unwrap()
            .join()
            .unwrap();

        assert_eq!(
            *sink.frames.lock(),
            vec![vec![0; 3], vec![1; 3], vec![2; 3], vec![3; 3]]
        );
        assert_eq!(control.stats.snapshot().written, 4);
        assert_eq!(control.stats.snapshot().bytes_written, 12);
        assert_eq!(pool.available(), 4);
        // finish() error is reported, not raised
        assert!(outcome.finish_error.is_some());
    }

    #[traced_test]
    #[test]
    fn test_write_failure_keeps_draining() {
        let pool = FramePool::new(4, 8).unwrap();
        let queue = pool.handoff_queue();
        let control = Arc::new(SessionControl::default());
        let sink = SharedSink {
            fail_every: Some(2),
            ..SharedSink::default()
        };

        queue_frames(&pool, &queue, 4);
        queue.close();
        WriterLoop::new(sink.clone(), pool.clone(), queue.clone(), Arc::clone(&control)).run();

        let stats = control.stats.snapshot();
        assert_eq!(stats.written, 2);
        assert_eq!(stats.write_failures, 2);
        assert_eq!(*sink.frames.lock(), vec![vec![0; 3], vec![2; 3]]);
        assert_eq!(pool.available(), 4);
        assert!(queue.is_empty());
        assert!(logs_contain("Frame write failed"));
        assert!(logs_contain("disk full"));
    }

    #[test]
    fn test_writer_thread_is_named() {
        let pool = FramePool::new(1, 8).unwrap();
        let queue = pool.handoff_queue();

        #[derive(Default)]
        struct NameSink(Arc<Mutex<Option<String>>>);
        impl FrameSink for NameSink {
            fn write_frame(&mut self, _payload: &[u8]) -> io::Result<()> {
                Ok(())
            }
            fn finish(&mut self) -> io::Result<()> {
                *self.0.lock() = thread::current().name().map(str::to_string);
                Ok(())
            }
        }

        let name = Arc::new(Mutex::new(None));
        queue.close();
        WriterLoop::new(
            NameSink(Arc::clone(&name)),
            pool,
            queue,
            Arc::new(SessionControl::default()),
        )
        .spawn()
        .unwrap()
        .join()
        .unwrap();

        assert_eq!(name.lock().as_deref(), Some(WRITER_THREAD_NAME));
    }
}
