//! DMS configuration

use std::ops::Range;
use std::path::PathBuf;

use inference_engine::InputLayout;
use serde::{Deserialize, Serialize};

use crate::eye_region::BoundsPolicy;
use crate::DmsError;

/// Where the fixed-region detector expects the face, as fractions of the frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceRegionFraction {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Default for FaceRegionFraction {
    fn default() -> Self {
        Self {
            x: 0.3,
            y: 0.2,
            width: 0.4,
            height: 0.5,
        }
    }
}

/// DMS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DmsConfig {
    /// Consecutive both-eyes-closed frames before the alarm triggers
    pub closed_frame_threshold: u32,

    /// While the alarm is active, re-fire whenever the closed-frame count is a multiple of this
    pub alarm_repeat_interval: u32,

    /// Side length of the square classifier input
    pub eye_input_size: u32,

    /// Frames are resized to this width before detection
    pub working_width: u32,

    /// What to do with eye boxes that leave the frame
    pub bounds_policy: BoundsPolicy,

    /// Landmark indices of the left eye contour
    pub left_eye: Range<usize>,

    /// Landmark indices of the right eye contour
    pub right_eye: Range<usize>,

    /// Face placement for the fixed-region detector
    pub face_region: FaceRegionFraction,

    /// Minimum luminance standard deviation inside the face region to report a face
    pub min_face_contrast: f32,

    /// Model paths
    pub eye_model_path: PathBuf,
    pub landmark_model_path: PathBuf,

    /// Input tensor layout of the eye model
    pub input_layout: InputLayout,
}

impl Default for DmsConfig {
    fn default() -> Self {
        Self {
            closed_frame_threshold: 10,
            alarm_repeat_interval: 20,
            eye_input_size: 24,
            working_width: 500,
            bounds_policy: BoundsPolicy::Clamp,
            left_eye: 42..48,
            right_eye: 36..42,
            face_region: FaceRegionFraction::default(),
            min_face_contrast: 8.0,
            eye_model_path: PathBuf::from("trained_model/eye_state.onnx"),
            landmark_model_path: PathBuf::from("assets/mean_shape_68.json"),
            input_layout: InputLayout::Nhwc,
        }
    }
}

impl DmsConfig {
    /// Create strict config (alarm sooner)
    pub fn strict() -> Self {
        Self {
            closed_frame_threshold: 6,
            alarm_repeat_interval: 12,
            ..Default::default()
        }
    }

    /// Create lenient config (alarm later)
    pub fn lenient() -> Self {
        Self {
            closed_frame_threshold: 15,
            alarm_repeat_interval: 30,
            ..Default::default()
        }
    }

    /// Look up a preset by name
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "default" => Some(Self::default()),
            "strict" => Some(Self::strict()),
            "lenient" => Some(Self::lenient()),
            _ => None,
        }
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<(), DmsError> {
        if self.closed_frame_threshold == 0 {
            return Err(DmsError::Config("closed_frame_threshold must be at least 1".into()));
        }
        if self.alarm_repeat_interval == 0 {
            return Err(DmsError::Config("alarm_repeat_interval must be at least 1".into()));
        }
        if self.eye_input_size == 0 {
            return Err(DmsError::Config("eye_input_size must be at least 1".into()));
        }
        if self.working_width == 0 {
            return Err(DmsError::Config("working_width must be at least 1".into()));
        }
        for (name, range) in [("left_eye", &self.left_eye), ("right_eye", &self.right_eye)] {
            if range.end < range.start || range.len() < 2 {
                return Err(DmsError::Config(format!(
                    "{} must span at least 2 landmarks, got {:?}",
                    name, range
                )));
            }
        }

        let region = &self.face_region;
        let in_unit = |v: f32| (0.0..=1.0).contains(&v);
        if !(in_unit(region.x) && in_unit(region.y))
            || region.width <= 0.0
            || region.height <= 0.0
            || region.x + region.width > 1.0
            || region.y + region.height > 1.0
        {
            return Err(DmsError::Config(format!("face_region out of frame: {:?}", region)));
        }
        Ok(())
    }

    /// Highest landmark index the pipeline reads, plus one
    pub fn required_landmarks(&self) -> usize {
        self.left_eye.end.max(self.right_eye.end)
    }
}
