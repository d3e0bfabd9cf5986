//! Camera Capture Library for the Drowsiness Monitor
//!
//! Provides decoded RGB frames and a background capture thread that keeps
//! only the most recent frame around for the processing loop.
//! Supports:
//! - Directory-backed frame sequences (recorded sessions, test fixtures)
//! - Any custom [`FrameSource`] (cameras, network streams)

pub mod capture;
pub mod frame;
pub mod source;

pub use capture::CaptureHandle;
pub use frame::VideoFrame;
pub use source::{FrameSource, ImageSequenceSource};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Camera error types
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Failed to open source: {0}")]
    Open(String),

    #[error("Invalid format: {0}")]
    Format(String),

    #[error("Frame decode failed: {0}")]
    Decode(String),

    #[error("Streaming error: {0}")]
    Stream(String),

    #[error("Source not started")]
    NotInitialized,
}

/// Capture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Directory holding the frame sequence (png/jpg/bmp)
    pub frames_dir: PathBuf,
    /// Target FPS for pacing the capture thread (`None` = as fast as the source delivers)
    pub fps: Option<u32>,
    /// Restart the sequence when it runs out
    pub looping: bool,
    /// How long the processing loop waits for a fresh frame (milliseconds)
    pub read_timeout_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            frames_dir: PathBuf::from("frames"),
            fps: Some(15),
            looping: false,
            read_timeout_ms: 100,
        }
    }
}

impl CaptureConfig {
    /// Pacing interval between frames, if any
    pub fn frame_interval(&self) -> Option<std::time::Duration> {
        self.fps
            .filter(|&fps| fps > 0)
            .map(|fps| std::time::Duration::from_secs_f64(1.0 / fps as f64))
    }
}
