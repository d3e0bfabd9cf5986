//! Eye region extraction
//!
//! Turns an eye's landmark contour and the source frame into the square,
//! normalized luminance patch the eye-state classifier consumes:
//!
//! 1. bounding box of the contour
//! 2. square it on its width and raise it by half a side
//! 3. crop (clamped to the frame or rejected, per [`BoundsPolicy`])
//! 4. cubic resize to `side` x `side`
//! 5. luminance in `[0, 1]`

use image::imageops::{self, FilterType};
use image::RgbImage;
use inference_engine::{luminance_patch, LumaPatch};
use serde::{Deserialize, Serialize};

use crate::geometry::{EyeBox, Point2D};
use crate::{DmsConfig, DmsError};

/// Handling of eye boxes that extend past the frame edges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundsPolicy {
    /// Crop the part of the box that lies inside the frame
    #[default]
    Clamp,
    /// Reject the eye for this frame
    Skip,
}

/// Classifier-ready eye patch
#[derive(Debug, Clone, PartialEq)]
pub struct EyeRegion {
    patch: LumaPatch,
    source_box: EyeBox,
}

impl EyeRegion {
    /// Side length of the square patch
    pub fn side(&self) -> u32 {
        self.patch.width()
    }

    pub fn patch(&self) -> &LumaPatch {
        &self.patch
    }

    /// Frame-space rectangle the patch was cut from
    pub fn source_box(&self) -> EyeBox {
        self.source_box
    }
}

/// Stateless eye patch extractor
#[derive(Debug, Clone, Copy)]
pub struct EyeRegionExtractor {
    side: u32,
    policy: BoundsPolicy,
}

impl EyeRegionExtractor {
    pub fn new(side: u32, policy: BoundsPolicy) -> Result<Self, DmsError> {
        if side == 0 {
            return Err(DmsError::Config("eye patch side must be at least 1".into()));
        }
        Ok(Self { side, policy })
    }

    pub fn from_config(config: &DmsConfig) -> Result<Self, DmsError> {
        Self::new(config.eye_input_size, config.bounds_policy)
    }

    pub fn side(&self) -> u32 {
        self.side
    }

    /// Frame-space crop rectangle for an eye contour, after applying the bounds policy
    pub fn crop_box(&self, eye: &[Point2D], frame_width: u32, frame_height: u32) -> Result<EyeBox, DmsError> {
        if eye.len() < 2 {
            return Err(DmsError::Geometry(format!(
                "eye contour needs at least 2 points, got {}",
                eye.len()
            )));
        }

        let square = EyeBox::bounding(eye)
            .and_then(EyeBox::squared_and_raised)
            .ok_or_else(|| DmsError::Geometry(format!("eye contour {:?} out of coordinate range", eye)))?;

        if square.fits_within(frame_width, frame_height) {
            return Ok(square);
        }

        match self.policy {
            BoundsPolicy::Skip => Err(DmsError::Geometry(format!(
                "eye box {:?} leaves the {}x{} frame",
                square, frame_width, frame_height
            ))),
            BoundsPolicy::Clamp => square.clamp_to(frame_width, frame_height).ok_or_else(|| {
                DmsError::Geometry(format!(
                    "eye box {:?} lies outside the {}x{} frame",
                    square, frame_width, frame_height
                ))
            }),
        }
    }

    /// Cut, resize and normalize one eye
    pub fn extract(&self, eye: &[Point2D], frame: &RgbImage) -> Result<EyeRegion, DmsError> {
        let (frame_width, frame_height) = frame.dimensions();
        let crop = self.crop_box(eye, frame_width, frame_height)?;

        let roi = imageops::crop_imm(frame, crop.x as u32, crop.y as u32, crop.width, crop.height).to_image();
        let resized = imageops::resize(&roi, self.side, self.side, FilterType::CatmullRom);

        Ok(EyeRegion {
            patch: luminance_patch(&resized),
            source_box: crop,
        })
    }
}
