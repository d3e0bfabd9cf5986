//! Background capture thread with a single most-recent-frame slot
//!
//! The capture thread keeps overwriting the slot; the consumer always gets
//! the newest frame it has not seen yet. Frames the consumer did not get to
//! are dropped silently.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::{CameraError, FrameSource, VideoFrame};

#[derive(Default)]
struct SlotState {
    latest: Option<VideoFrame>,
    /// Bumped on every publish
    generation: u64,
    finished: bool,
}

#[derive(Default)]
struct FrameSlot {
    state: Mutex<SlotState>,
    ready: Condvar,
}

impl FrameSlot {
    fn publish(&self, frame: VideoFrame) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.latest = Some(frame);
        state.generation += 1;
        self.ready.notify_all();
    }

    fn finish(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.finished = true;
        self.ready.notify_all();
    }
}

/// Handle to a running capture thread.
///
/// Dropping the handle stops the thread and releases the source.
pub struct CaptureHandle {
    slot: Arc<FrameSlot>,
    stop: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
    last_generation: u64,
    frames_read: u64,
}

impl CaptureHandle {
    /// Start the source and spawn the capture thread
    pub fn start(
        mut source: Box<dyn FrameSource>,
        frame_interval: Option<Duration>,
    ) -> Result<Self, CameraError> {
        source.start()?;

        let slot = Arc::new(FrameSlot::default());
        let stop = Arc::new(AtomicBool::new(false));

        let thread = {
            let slot = Arc::clone(&slot);
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("frame-capture".into())
                .spawn(move || capture_loop(source, &slot, &stop, frame_interval))
                .map_err(|e| CameraError::Stream(format!("failed to spawn capture thread: {}", e)))?
        };

        info!("Capture thread started");
        Ok(Self {
            slot,
            stop,
            thread: Some(thread),
            last_generation: 0,
            frames_read: 0,
        })
    }

    /// Wait up to `timeout` for a frame newer than the last one returned.
    ///
    /// Returns `None` when nothing new arrived in time or the source is exhausted.
    pub fn read_latest(&mut self, timeout: Duration) -> Option<VideoFrame> {
        let deadline = Instant::now() + timeout;
        let mut state = self.slot.state.lock().unwrap_or_else(PoisonError::into_inner);

        while state.generation == self.last_generation && !state.finished {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            let (guard, _) = self
                .slot
                .ready
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }

        if state.generation == self.last_generation {
            return None;
        }

        let skipped = state.generation - self.last_generation - 1;
        if skipped > 0 {
            debug!("Skipped {} stale frames", skipped);
        }
        self.last_generation = state.generation;
        self.frames_read += 1;
        state.latest.clone()
    }

    /// True once the source is exhausted and its last frame was consumed
    pub fn is_finished(&self) -> bool {
        let state = self.slot.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.finished && state.generation == self.last_generation
    }

    /// Frames handed to the consumer so far
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Stop the capture thread and release the source
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Capture thread panicked");
            }
            info!("Capture thread stopped after {} frames read", self.frames_read);
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Pause after a failed read when no frame interval applies
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(20);

fn capture_loop(
    mut source: Box<dyn FrameSource>,
    slot: &FrameSlot,
    stop: &AtomicBool,
    frame_interval: Option<Duration>,
) {
    let mut failed_reads = 0u64;
    while !stop.load(Ordering::Acquire) {
        let started = Instant::now();
        let mut pause = frame_interval;
        match source.read() {
            Ok(Some(frame)) => {
                if failed_reads > 0 {
                    info!("Frame source recovered after {} failed reads", failed_reads);
                    failed_reads = 0;
                }
                slot.publish(frame);
            }
            Ok(None) => {
                debug!("Frame source exhausted");
                break;
            }
            Err(e) => {
                failed_reads += 1;
                if failed_reads == 1 {
                    warn!("Frame read failed: {}", e);
                } else {
                    debug!("Frame read failed ({} in a row): {}", failed_reads, e);
                }
                pause = Some(pause.map_or(READ_ERROR_BACKOFF, |interval| interval.max(READ_ERROR_BACKOFF)));
            }
        }

        if let Some(pause) = pause {
            let elapsed = started.elapsed();
            if elapsed < pause {
                thread::sleep(pause - elapsed);
            }
        }
    }

    source.stop();
    slot.finish();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicU64;

    struct ListSource {
        frames: VecDeque<VideoFrame>,
        stopped: Arc<AtomicBool>,
    }

    impl ListSource {
        fn new(count: u64, stopped: Arc<AtomicBool>) -> Self {
            let frames = (1..=count)
                .map(|seq| VideoFrame::new(vec![seq as u8; 3], 1, 1, 0, seq).unwrap())
                .collect();
            Self { frames, stopped }
        }
    }

    impl FrameSource for ListSource {
        fn start(&mut self) -> Result<(), CameraError> {
            Ok(())
        }

        fn read(&mut self) -> Result<Option<VideoFrame>, CameraError> {
            Ok(self.frames.pop_front())
        }

        fn stop(&mut self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_frames_are_delivered_at_most_once() {
        let stopped = Arc::new(AtomicBool::new(false));
        let source = ListSource::new(5, Arc::clone(&stopped));
        let mut handle = CaptureHandle::start(Box::new(source), Some(Duration::from_millis(5))).unwrap();

        let mut sequences = Vec::new();
        while !handle.is_finished() {
            if let Some(frame) = handle.read_latest(Duration::from_millis(200)) {
                sequences.push(frame.sequence);
            }
        }

        assert!(!sequences.is_empty());
        assert!(sequences.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(*sequences.last().unwrap(), 5);
        assert_eq!(handle.frames_read(), sequences.len() as u64);
        assert!(handle.read_latest(Duration::from_millis(10)).is_none());
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_slow_consumer_gets_latest_frame() {
        let stopped = Arc::new(AtomicBool::new(false));
        let source = ListSource::new(10, Arc::clone(&stopped));
        let mut handle = CaptureHandle::start(Box::new(source), None).unwrap();

        while !handle.slot.state.lock().unwrap().finished {
            thread::sleep(Duration::from_millis(1));
        }

        let frame = handle.read_latest(Duration::from_millis(10)).unwrap();
        assert_eq!(frame.sequence, 10);
        assert!(handle.is_finished());
    }

    #[test]
    fn test_drop_releases_source() {
        let stopped = Arc::new(AtomicBool::new(false));
        let source = ListSource::new(u8::MAX as u64, Arc::clone(&stopped));
        let handle = CaptureHandle::start(Box::new(source), Some(Duration::from_millis(1))).unwrap();
        drop(handle);
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_failing_source_is_retried_with_backoff() {
        struct Failing {
            reads: Arc<AtomicU64>,
        }
        impl FrameSource for Failing {
            fn start(&mut self) -> Result<(), CameraError> {
                Ok(())
            }
            fn read(&mut self) -> Result<Option<VideoFrame>, CameraError> {
                self.reads.fetch_add(1, Ordering::SeqCst);
                Err(CameraError::Decode("corrupt".into()))
            }
            fn stop(&mut self) {}
        }

        let reads = Arc::new(AtomicU64::new(0));
        let mut handle = CaptureHandle::start(
            Box::new(Failing {
                reads: Arc::clone(&reads),
            }),
            None,
        )
        .unwrap();

        assert!(handle.read_latest(Duration::from_millis(200)).is_none());
        assert!(!handle.is_finished());
        handle.stop();

        let reads = reads.load(Ordering::SeqCst);
        assert!(reads >= 1);
        // 200 ms at one read per READ_ERROR_BACKOFF, with slack for scheduling
        assert!(reads <= 200 / READ_ERROR_BACKOFF.as_millis() as u64 + 5, "{} reads", reads);
    }

    #[test]
    fn test_start_failure_propagates() {
        struct Broken;
        impl FrameSource for Broken {
            fn start(&mut self) -> Result<(), CameraError> {
                Err(CameraError::Open("no device".into()))
            }
            fn read(&mut self) -> Result<Option<VideoFrame>, CameraError> {
                Ok(None)
            }
            fn stop(&mut self) {}
        }

        assert!(matches!(
            CaptureHandle::start(Box::new(Broken), None),
            Err(CameraError::Open(_))
        ));
    }
}
