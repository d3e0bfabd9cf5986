//! Driver Monitoring System (DMS)
//!
//! Real-time drowsiness detection from a cabin camera:
//! - Face detection and landmark placement
//! - Eye region extraction and open/closed classification
//! - Debounced, auto-repeating drowsiness alarm

pub mod analysis;
pub mod config;
pub mod detector;
pub mod eye_region;
pub mod geometry;
pub mod runner;
pub mod state;

pub use analysis::{EyeStatus, FaceAnalysis, FaceOutcome, FrameAnalysis};
pub use config::{DmsConfig, FaceRegionFraction};
pub use detector::{FaceDetector, FixedRegionDetector, LandmarkLocator, MeanShapeLocator};
pub use eye_region::{BoundsPolicy, EyeRegion, EyeRegionExtractor};
pub use geometry::{EyeBox, FaceRegion, LandmarkSet, Point2D};
pub use runner::{FrameRenderer, RunSummary};
pub use state::{AlarmDecision, DrowsinessState, DrowsinessStateMachine};
pub use inference_engine::EyeLabel;

use alerting::{AlarmDispatcher, AlertError};
use camera_capture::{CameraError, VideoFrame};
use image::{GrayImage, RgbImage};
use inference_engine::{EyeClassifier, InferenceError, OnnxEyeClassifier};
use thiserror::Error;
use tracing::{debug, info, warn};

/// DMS error types
#[derive(Error, Debug)]
pub enum DmsError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Landmark model loading failed: {0}")]
    LandmarkModel(String),

    #[error("Inference failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("Face detection failed: {0}")]
    Detection(String),

    #[error("Landmarks unusable: {0}")]
    Landmarks(String),

    #[error("Eye geometry rejected: {0}")]
    Geometry(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Image processing failed: {0}")]
    ImageProcessing(String),

    #[error("Capture error: {0}")]
    Capture(#[from] CameraError),

    #[error("Alarm error: {0}")]
    Alarm(#[from] AlertError),
}

struct ClassifiedEyes {
    left_box: EyeBox,
    right_box: EyeBox,
    left: EyeLabel,
    right: EyeLabel,
}

/// Driver monitoring module
pub struct DmsModule {
    config: DmsConfig,
    face_detector: Box<dyn FaceDetector>,
    landmark_locator: Box<dyn LandmarkLocator>,
    eye_classifier: Box<dyn EyeClassifier>,
    extractor: EyeRegionExtractor,
    state_machine: DrowsinessStateMachine,
    dispatcher: AlarmDispatcher,
}

impl DmsModule {
    /// Assemble a module from explicit collaborators
    pub fn new(
        config: DmsConfig,
        face_detector: Box<dyn FaceDetector>,
        landmark_locator: Box<dyn LandmarkLocator>,
        eye_classifier: Box<dyn EyeClassifier>,
        dispatcher: AlarmDispatcher,
    ) -> Result<Self, DmsError> {
        config.validate()?;
        Ok(Self {
            extractor: EyeRegionExtractor::from_config(&config)?,
            state_machine: DrowsinessStateMachine::from_config(&config)?,
            face_detector,
            landmark_locator,
            eye_classifier,
            dispatcher,
            config,
        })
    }

    /// Create a module with the bundled collaborators, loading all models.
    /// Any missing or unreadable model is fatal.
    pub fn from_config(config: DmsConfig, dispatcher: AlarmDispatcher) -> Result<Self, DmsError> {
        config.validate()?;

        let landmark_locator =
            MeanShapeLocator::load(&config.landmark_model_path, config.required_landmarks())?;
        let eye_classifier =
            OnnxEyeClassifier::load(&config.eye_model_path, config.eye_input_size, config.input_layout)
                .map_err(|e| DmsError::ModelLoad(e.to_string()))?;
        let face_detector = FixedRegionDetector::new(&config);

        info!(
            "DMS ready: threshold={} frames, repeat every {} frames",
            config.closed_frame_threshold, config.alarm_repeat_interval
        );
        Self::new(
            config,
            Box::new(face_detector),
            Box::new(landmark_locator),
            Box::new(eye_classifier),
            dispatcher,
        )
    }

    /// Analyze a single frame for driver state.
    ///
    /// Faces whose landmarks, eye geometry or classification fail are skipped
    /// without touching the drowsiness state; frames without faces leave it
    /// unchanged as well.
    pub fn process_frame(&mut self, frame: &VideoFrame) -> Result<FrameAnalysis, DmsError> {
        let working = frame.resize_to_width(self.config.working_width)?;
        let gray = working.to_grayscale();
        let frame_size = (working.width, working.height);
        let rgb = working
            .to_rgb_image()
            .ok_or_else(|| DmsError::ImageProcessing("pixel buffer does not match dimensions".into()))?;

        let faces = self.face_detector.detect(&gray)?;
        metrics::counter!("dms_frames_processed_total").increment(1);
        if faces.is_empty() {
            debug!("Frame {}: no face", frame.sequence);
        }

        let mut analysis = FrameAnalysis {
            sequence: frame.sequence,
            frame_size,
            ..Default::default()
        };

        for face in faces {
            let face_analysis = match self.classify_face(&gray, &rgb, &face) {
                Ok(eyes) => {
                    let decision = self.state_machine.update(eyes.left, eyes.right);
                    debug!(
                        "Frame {}: left={} right={} closed_frames={}",
                        frame.sequence,
                        eyes.left.as_str(),
                        eyes.right.as_str(),
                        self.state_machine.state().consecutive_closed_frames
                    );
                    self.react(decision, &mut analysis);
                    FaceAnalysis {
                        face,
                        left_eye: Some(eyes.left_box),
                        right_eye: Some(eyes.right_box),
                        outcome: FaceOutcome::Classified {
                            left: eyes.left,
                            right: eyes.right,
                            decision,
                        },
                    }
                }
                Err(e) => {
                    warn!("Frame {}: skipping face: {}", frame.sequence, e);
                    metrics::counter!("dms_faces_skipped_total").increment(1);
                    FaceAnalysis {
                        face,
                        left_eye: None,
                        right_eye: None,
                        outcome: FaceOutcome::Skipped { reason: e.to_string() },
                    }
                }
            };
            analysis.faces.push(face_analysis);
        }

        analysis.state = *self.state_machine.state();
        Ok(analysis)
    }

    fn classify_face(&self, gray: &GrayImage, rgb: &RgbImage, face: &FaceRegion) -> Result<ClassifiedEyes, DmsError> {
        let landmarks = self.landmark_locator.locate(gray, face)?;

        let left_region = self.extractor.extract(landmarks.eye(&self.config.left_eye)?, rgb)?;
        let right_region = self.extractor.extract(landmarks.eye(&self.config.right_eye)?, rgb)?;

        let left = self.eye_classifier.predict(left_region.patch())?;
        let right = self.eye_classifier.predict(right_region.patch())?;

        Ok(ClassifiedEyes {
            left_box: left_region.source_box(),
            right_box: right_region.source_box(),
            left,
            right,
        })
    }

    fn react(&mut self, decision: AlarmDecision, analysis: &mut FrameAnalysis) {
        if let Some(event) = decision.alarm_event() {
            metrics::counter!("dms_alarm_events_total", "kind" => event.as_str()).increment(1);
            analysis.alarms.push(event);
            if let Err(e) = self.dispatcher.dispatch(event) {
                warn!("Alarm {} not played: {}", event.as_str(), e);
            }
        } else if let AlarmDecision::Reset { alarm_cleared: true } = decision {
            if let Err(e) = self.dispatcher.recover() {
                warn!("Alarm not stopped: {}", e);
            }
        }
    }

    /// Current drowsiness state
    pub fn state(&self) -> &DrowsinessState {
        self.state_machine.state()
    }

    /// Reset driver state (on driver change)
    pub fn reset_state(&mut self) {
        info!("Resetting driver state");
        self.state_machine.reset();
        if let Err(e) = self.dispatcher.recover() {
            warn!("Alarm not stopped: {}", e);
        }
    }

    pub fn config(&self) -> &DmsConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &AlarmDispatcher {
        &self.dispatcher
    }
}
