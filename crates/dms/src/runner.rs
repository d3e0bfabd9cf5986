//! Processing loop driving the module from a capture thread

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use alerting::AlarmEvent;
use camera_capture::{CaptureHandle, VideoFrame};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::analysis::FrameAnalysis;
use crate::state::DrowsinessState;
use crate::{DmsError, DmsModule};

/// Consumer of per-frame results (display, annotated output, logs)
pub trait FrameRenderer {
    fn render(&mut self, frame: &VideoFrame, analysis: &FrameAnalysis) -> Result<(), DmsError>;
}

/// Totals for one run of the processing loop
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub frames_processed: u64,
    pub frames_failed: u64,
    pub alarms_triggered: u64,
    pub alarms_repeated: u64,
    pub final_state: DrowsinessState,
}

impl DmsModule {
    /// Process frames until `stop` is set or the capture is exhausted.
    ///
    /// Per-frame and render failures are logged and counted; the loop keeps
    /// going. `stop` is checked once per iteration.
    pub fn run(
        &mut self,
        capture: &mut CaptureHandle,
        renderer: &mut dyn FrameRenderer,
        stop: &AtomicBool,
        read_timeout: Duration,
    ) -> RunSummary {
        let mut summary = RunSummary::default();
        info!("Processing loop started");

        while !stop.load(Ordering::Acquire) {
            let Some(frame) = capture.read_latest(read_timeout) else {
                if capture.is_finished() {
                    info!("Capture finished");
                    break;
                }
                continue;
            };

            match self.process_frame(&frame) {
                Ok(analysis) => {
                    summary.frames_processed += 1;
                    for event in &analysis.alarms {
                        match event {
                            AlarmEvent::Trigger => summary.alarms_triggered += 1,
                            AlarmEvent::Repeat => summary.alarms_repeated += 1,
                        }
                    }
                    if let Err(e) = renderer.render(&frame, &analysis) {
                        warn!("Render failed for frame {}: {}", frame.sequence, e);
                    }
                }
                Err(e) => {
                    summary.frames_failed += 1;
                    warn!("Frame {} failed: {}", frame.sequence, e);
                }
            }
        }

        if stop.load(Ordering::Acquire) {
            debug!("Stop requested");
        }
        summary.final_state = *self.state();
        info!(
            "Processing loop ended: {} frames, {} failed, {} alarms",
            summary.frames_processed,
            summary.frames_failed,
            summary.alarms_triggered + summary.alarms_repeated
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use camera_capture::{CameraError, FrameSource};
    use inference_engine::{EyeLabel, ScriptedEyeClassifier};
    use std::collections::VecDeque;

    struct Frames(VecDeque<VideoFrame>);

    impl FrameSource for Frames {
        fn start(&mut self) -> Result<(), CameraError> {
            Ok(())
        }

        fn read(&mut self) -> Result<Option<VideoFrame>, CameraError> {
            Ok(self.0.pop_front())
        }

        fn stop(&mut self) {}
    }

    #[derive(Default)]
    struct Collect {
        sequences: Vec<u64>,
        fail: bool,
    }

    impl FrameRenderer for Collect {
        fn render(&mut self, frame: &VideoFrame, _analysis: &FrameAnalysis) -> Result<(), DmsError> {
            self.sequences.push(frame.sequence);
            if self.fail {
                return Err(DmsError::ImageProcessing("disk full".into()));
            }
            Ok(())
        }
    }

    fn capture(count: u64) -> CaptureHandle {
        let frames = (1..=count)
            .map(|seq| {
                let img = image::RgbImage::from_fn(500, 375, |x, y| image::Rgb([(x % 256) as u8, (y % 256) as u8, 60]));
                VideoFrame::from_rgb_image(img, 0, seq)
            })
            .collect();
        CaptureHandle::start(Box::new(Frames(frames)), Some(Duration::from_millis(60))).unwrap()
    }

    #[test]
    fn test_run_until_capture_finishes() {
        let (mut dms, _) = module(ScriptedFaces::new([]), ScriptedEyeClassifier::always(EyeLabel::Closed));
        let mut capture = capture(12);
        let mut renderer = Collect::default();
        let stop = AtomicBool::new(false);

        let summary = dms.run(&mut capture, &mut renderer, &stop, Duration::from_millis(500));

        // a slow consumer may skip stale frames, never the last one
        assert_eq!(renderer.sequences.last(), Some(&12));
        assert!(renderer.sequences.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(summary.frames_processed, renderer.sequences.len() as u64);
        assert_eq!(summary.frames_failed, 0);
        assert_eq!(summary.final_state.consecutive_closed_frames as u64, summary.frames_processed);
        assert_eq!(summary.alarms_triggered, u64::from(summary.frames_processed >= 10));
    }

    #[test]
    fn test_stop_flag_ends_loop_immediately() {
        let (mut dms, _) = module(ScriptedFaces::new([]), ScriptedEyeClassifier::always(EyeLabel::Open));
        let mut capture = capture(50);
        let mut renderer = Collect::default();
        let stop = AtomicBool::new(true);

        let summary = dms.run(&mut capture, &mut renderer, &stop, Duration::from_millis(100));
        assert_eq!(summary.frames_processed, 0);
        assert!(renderer.sequences.is_empty());
    }

    #[test]
    fn test_failures_are_counted_not_fatal() {
        let (mut dms, _) = module(ScriptedFaces::failing(), ScriptedEyeClassifier::always(EyeLabel::Open));
        let mut capture = capture(3);
        let mut renderer = Collect::default();
        let stop = AtomicBool::new(false);

        let summary = dms.run(&mut capture, &mut renderer, &stop, Duration::from_millis(500));
        assert_eq!(summary.frames_processed, 0);
        assert!(summary.frames_failed >= 1);
        assert!(renderer.sequences.is_empty());
    }

    #[test]
    fn test_render_errors_do_not_stop_the_loop() {
        let (mut dms, _) = module(ScriptedFaces::new([]), ScriptedEyeClassifier::always(EyeLabel::Open));
        let mut capture = capture(4);
        let mut renderer = Collect {
            fail: true,
            ..Default::default()
        };
        let stop = AtomicBool::new(false);

        let summary = dms.run(&mut capture, &mut renderer, &stop, Duration::from_millis(500));
        assert!(summary.frames_processed >= 1);
        assert_eq!(renderer.sequences.len() as u64, summary.frames_processed);
        assert_eq!(renderer.sequences.last(), Some(&4));
    }
}
