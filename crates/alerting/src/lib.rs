//! Alerting System
//!
//! Turns drowsiness alarm events into audible alerts: dispatching,
//! bookkeeping and stopping playback once the driver recovers.

mod manager;
mod sink;

pub use manager::{AlarmConfig, AlarmDispatcher, AlarmEvent, AlarmStats};
pub use sink::{AlarmSink, LogAlarm, SoundAlarm};

use thiserror::Error;

/// Alerting error types
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Alarm sound not found: {0}")]
    SoundMissing(String),

    #[error("Playback failed: {0}")]
    Playback(String),

    #[error("Alarm player thread is gone")]
    PlayerGone,

    #[error("Built without audio support; rebuild with `--features audio` or disable the audible alarm")]
    AudioUnavailable,
}
