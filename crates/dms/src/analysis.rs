//! DMS analysis results

use alerting::AlarmEvent;
use inference_engine::EyeLabel;
use serde::{Deserialize, Serialize};

use crate::geometry::{EyeBox, FaceRegion};
use crate::state::{AlarmDecision, DrowsinessState};

/// Overall eye status for a frame, as shown to the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EyeStatus {
    /// No face was classified this frame
    NoFace,
    /// At least one eye open
    Opening,
    /// Both eyes closed, alarm not raised
    Closing,
    /// Alarm raised
    Drowsy,
}

impl EyeStatus {
    /// Overlay text
    pub fn label(&self) -> &'static str {
        match self {
            EyeStatus::NoFace => "No face",
            EyeStatus::Opening => "Opening",
            EyeStatus::Closing => "Closing",
            EyeStatus::Drowsy => "DROWSY!!!",
        }
    }
}

/// What happened to one detected face
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FaceOutcome {
    /// Both eyes classified and fed to the state machine
    Classified {
        left: EyeLabel,
        right: EyeLabel,
        decision: AlarmDecision,
    },
    /// Face dropped before the state update
    Skipped { reason: String },
}

/// Per-face result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceAnalysis {
    pub face: FaceRegion,

    /// Crop rectangles in working-frame coordinates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left_eye: Option<EyeBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right_eye: Option<EyeBox>,

    pub outcome: FaceOutcome,
}

impl FaceAnalysis {
    pub fn is_classified(&self) -> bool {
        matches!(self.outcome, FaceOutcome::Classified { .. })
    }
}

/// Complete result for one processed frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameAnalysis {
    /// Source frame sequence number
    pub sequence: u64,

    /// Dimensions of the working frame the coordinates refer to
    pub frame_size: (u32, u32),

    pub faces: Vec<FaceAnalysis>,

    /// State after this frame
    pub state: DrowsinessState,

    /// Alarm events dispatched while processing this frame
    pub alarms: Vec<AlarmEvent>,
}

impl FrameAnalysis {
    /// Whether a face was detected
    pub fn face_detected(&self) -> bool {
        !self.faces.is_empty()
    }

    /// Check if any alarm fired
    pub fn has_alarms(&self) -> bool {
        !self.alarms.is_empty()
    }

    /// Status from the last classified face (last writer wins)
    pub fn status(&self) -> EyeStatus {
        let last = self.faces.iter().rev().find_map(|f| match f.outcome {
            FaceOutcome::Classified { left, right, .. } => Some((left, right)),
            FaceOutcome::Skipped { .. } => None,
        });

        match last {
            None => EyeStatus::NoFace,
            Some(_) if self.state.alarm_active => EyeStatus::Drowsy,
            Some((left, right)) if left.is_closed() && right.is_closed() => EyeStatus::Closing,
            Some(_) => EyeStatus::Opening,
        }
    }

    /// Closed-frame counter readout
    pub fn counter_text(&self) -> String {
        format!("NF: {}", self.state.consecutive_closed_frames)
    }
}
