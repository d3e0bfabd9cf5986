//! Frame sources

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info};

use crate::{CameraError, VideoFrame};

const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// A producer of decoded frames.
///
/// `read` returning `Ok(None)` means the source is exhausted; the capture
/// thread stops pulling from it.
pub trait FrameSource: Send {
    /// Prepare the source for streaming
    fn start(&mut self) -> Result<(), CameraError>;

    /// Read the next frame (blocking)
    fn read(&mut self) -> Result<Option<VideoFrame>, CameraError>;

    /// Release the source
    fn stop(&mut self);
}

/// Frames read from a directory of still images, in file name order
pub struct ImageSequenceSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    position: usize,
    looping: bool,
    sequence: u64,
    started: bool,
}

impl ImageSequenceSource {
    /// Create a source over `dir`; the directory is scanned on `start`
    pub fn new(dir: impl Into<PathBuf>, looping: bool) -> Self {
        Self {
            dir: dir.into(),
            files: Vec::new(),
            position: 0,
            looping,
            sequence: 0,
            started: false,
        }
    }

    /// Number of frames in the sequence (0 before `start`)
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Check if the sequence holds no frames
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn scan(dir: &Path) -> Result<Vec<PathBuf>, CameraError> {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| CameraError::Open(format!("{}: {}", dir.display(), e)))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();
        Ok(files)
    }
}

impl FrameSource for ImageSequenceSource {
    fn start(&mut self) -> Result<(), CameraError> {
        self.files = Self::scan(&self.dir)?;
        if self.files.is_empty() {
            return Err(CameraError::Open(format!(
                "no frames found in {}",
                self.dir.display()
            )));
        }
        self.position = 0;
        self.started = true;
        info!("Opened frame sequence {} ({} frames)", self.dir.display(), self.files.len());
        Ok(())
    }

    fn read(&mut self) -> Result<Option<VideoFrame>, CameraError> {
        if !self.started {
            return Err(CameraError::NotInitialized);
        }

        if self.position >= self.files.len() {
            if !self.looping {
                return Ok(None);
            }
            debug!("Frame sequence wrapped around");
            self.position = 0;
        }

        let path = &self.files[self.position];
        self.position += 1;

        let bytes = std::fs::read(path).map_err(|e| CameraError::Stream(format!("{}: {}", path.display(), e)))?;
        let timestamp_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        self.sequence += 1;

        VideoFrame::decode(&bytes, timestamp_ns, self.sequence)
            .map(Some)
            .map_err(|e| match e {
                CameraError::Decode(msg) => CameraError::Decode(format!("{}: {}", path.display(), msg)),
                other => other,
            })
    }

    fn stop(&mut self) {
        self.started = false;
        debug!("Frame sequence {} released", self.dir.display());
    }
}
