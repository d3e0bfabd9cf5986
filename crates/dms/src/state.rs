//! Driver state tracking
//!
//! The drowsiness state machine counts consecutive frames where both eyes
//! were classified closed and decides when to raise, repeat and clear the
//! alarm. It only advances when it receives a classification; frames without
//! a face leave the count untouched.

use alerting::AlarmEvent;
use inference_engine::EyeLabel;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{DmsConfig, DmsError};

/// State carried across frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DrowsinessState {
    /// Length of the current run of both-eyes-closed frames
    pub consecutive_closed_frames: u32,
    /// An alarm was raised for the current run
    pub alarm_active: bool,
}

/// Outcome of feeding one pair of eye labels to the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlarmDecision {
    /// Both eyes closed, nothing to fire this frame
    Continue,
    /// The closed run just reached the threshold
    Trigger,
    /// The alarm is active and the run hit a repeat boundary
    Repeat,
    /// At least one eye open; the run was reset
    Reset { alarm_cleared: bool },
}

impl AlarmDecision {
    /// Alarm event to dispatch, if any
    pub fn alarm_event(&self) -> Option<AlarmEvent> {
        match self {
            AlarmDecision::Trigger => Some(AlarmEvent::Trigger),
            AlarmDecision::Repeat => Some(AlarmEvent::Repeat),
            AlarmDecision::Continue | AlarmDecision::Reset { .. } => None,
        }
    }
}

/// Debounced, auto-repeating alarm logic over per-frame eye labels
#[derive(Debug, Clone)]
pub struct DrowsinessStateMachine {
    threshold: u32,
    repeat_interval: u32,
    state: DrowsinessState,
}

impl DrowsinessStateMachine {
    pub fn new(threshold: u32, repeat_interval: u32) -> Result<Self, DmsError> {
        if threshold == 0 || repeat_interval == 0 {
            return Err(DmsError::Config(format!(
                "threshold ({}) and repeat interval ({}) must be at least 1",
                threshold, repeat_interval
            )));
        }
        Ok(Self {
            threshold,
            repeat_interval,
            state: DrowsinessState::default(),
        })
    }

    pub fn from_config(config: &DmsConfig) -> Result<Self, DmsError> {
        Self::new(config.closed_frame_threshold, config.alarm_repeat_interval)
    }

    /// Advance by one classified frame.
    ///
    /// Only a pair where both eyes are closed extends the run; a single open
    /// eye resets it.
    pub fn update(&mut self, left: EyeLabel, right: EyeLabel) -> AlarmDecision {
        if !(left.is_closed() && right.is_closed()) {
            let alarm_cleared = self.state.alarm_active;
            if self.state.consecutive_closed_frames > 0 {
                debug!("Eyes open after {} closed frames", self.state.consecutive_closed_frames);
            }
            self.state = DrowsinessState::default();
            return AlarmDecision::Reset { alarm_cleared };
        }

        self.state.consecutive_closed_frames = self.state.consecutive_closed_frames.saturating_add(1);
        let count = self.state.consecutive_closed_frames;

        if count < self.threshold {
            return AlarmDecision::Continue;
        }

        if !self.state.alarm_active {
            self.state.alarm_active = true;
            AlarmDecision::Trigger
        } else if count % self.repeat_interval == 0 {
            AlarmDecision::Repeat
        } else {
            AlarmDecision::Continue
        }
    }

    pub fn state(&self) -> &DrowsinessState {
        &self.state
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn repeat_interval(&self) -> u32 {
        self.repeat_interval
    }

    /// Reset state (on driver change)
    pub fn reset(&mut self) {
        self.state = DrowsinessState::default();
    }
}
