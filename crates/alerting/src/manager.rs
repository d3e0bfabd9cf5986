//! Alarm Dispatcher Implementation

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::{AlarmSink, AlertError};

/// Alarm signal emitted by the drowsiness state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlarmEvent {
    /// Closure run just crossed the threshold
    Trigger,
    /// Closure persists; re-fire at the configured cadence
    Repeat,
}

impl AlarmEvent {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmEvent::Trigger => "trigger",
            AlarmEvent::Repeat => "repeat",
        }
    }
}

/// Alarm configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmConfig {
    /// Sound played on trigger and repeat (default: alarm.wav)
    pub sound_path: PathBuf,
    /// Stop in-flight playback when the eyes reopen (default: true)
    pub stop_on_recovery: bool,
    /// Play through the audio device; when false alarms are only logged
    pub audible: bool,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            sound_path: PathBuf::from("alarm.wav"),
            stop_on_recovery: true,
            audible: true,
        }
    }
}

/// Alarm counters for the running session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlarmStats {
    pub triggers: u64,
    pub repeats: u64,
    pub stops: u64,
    pub failures: u64,
}

/// Forwards alarm events to a sink and tracks whether an alarm is sounding
pub struct AlarmDispatcher {
    /// Configuration
    config: AlarmConfig,
    /// Playback backend
    sink: Box<dyn AlarmSink>,
    /// An alarm was fired and the driver has not recovered yet
    active: bool,
    stats: AlarmStats,
}

impl AlarmDispatcher {
    /// Create a new dispatcher
    pub fn new(config: AlarmConfig, sink: Box<dyn AlarmSink>) -> Self {
        info!("Creating alarm dispatcher with config: {:?}", config);
        Self {
            config,
            sink,
            active: false,
            stats: AlarmStats::default(),
        }
    }

    /// Fire an alarm event. Fire-and-forget: playback failures are counted
    /// and returned but leave the dispatcher usable.
    pub fn dispatch(&mut self, event: AlarmEvent) -> Result<(), AlertError> {
        match event {
            AlarmEvent::Trigger => self.stats.triggers += 1,
            AlarmEvent::Repeat => self.stats.repeats += 1,
        }
        self.active = true;

        info!("Drowsiness alarm: {}", event.as_str());
        self.sink.play().map_err(|e| {
            self.stats.failures += 1;
            warn!("Alarm playback failed: {}", e);
            e
        })
    }

    /// The driver's eyes reopened after an alarm
    pub fn recover(&mut self) -> Result<(), AlertError> {
        if !self.active {
            return Ok(());
        }
        self.active = false;

        if !self.config.stop_on_recovery {
            debug!("Driver recovered; letting alarm playback finish");
            return Ok(());
        }

        info!("Driver recovered; stopping alarm");
        self.stats.stops += 1;
        self.sink.stop().map_err(|e| {
            self.stats.failures += 1;
            warn!("Failed to stop alarm: {}", e);
            e
        })
    }

    /// Whether an alarm has fired since the last recovery
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Get session counters
    pub fn stats(&self) -> AlarmStats {
        self.stats
    }

    /// Get configuration
    pub fn config(&self) -> &AlarmConfig {
        &self.config
    }
}
