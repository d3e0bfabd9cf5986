//! Face detection and landmark localization

use std::path::Path;

use image::GrayImage;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::config::FaceRegionFraction;
use crate::geometry::{FaceRegion, LandmarkSet, Point2D};
use crate::{DmsConfig, DmsError};

/// Finds faces in a grayscale frame
pub trait FaceDetector: Send {
    /// Zero or more faces; an empty result is not an error
    fn detect(&self, gray: &GrayImage) -> Result<Vec<FaceRegion>, DmsError>;
}

/// Places facial landmarks inside a detected face
pub trait LandmarkLocator: Send {
    fn locate(&self, gray: &GrayImage, face: &FaceRegion) -> Result<LandmarkSet, DmsError>;
}

/// Detector for a fixed cabin camera: the face is expected in a configured
/// region of the frame and is reported whenever that region shows enough
/// contrast (a covered lens or a dark frame yields no face).
pub struct FixedRegionDetector {
    region: FaceRegionFraction,
    min_contrast: f32,
}

impl FixedRegionDetector {
    pub fn new(config: &DmsConfig) -> Self {
        warn!("No face detection model configured. Using fixed face region {:?}", config.face_region);
        Self {
            region: config.face_region,
            min_contrast: config.min_face_contrast,
        }
    }

    fn region_in(&self, width: u32, height: u32) -> FaceRegion {
        let x = (width as f32 * self.region.x).round() as i32;
        let y = (height as f32 * self.region.y).round() as i32;
        let w = ((width as f32 * self.region.width).round() as u32).min(width.saturating_sub(x as u32));
        let h = ((height as f32 * self.region.height).round() as u32).min(height.saturating_sub(y as u32));
        FaceRegion {
            x,
            y,
            width: w,
            height: h,
            confidence: 0.0,
        }
    }
}

impl FaceDetector for FixedRegionDetector {
    fn detect(&self, gray: &GrayImage) -> Result<Vec<FaceRegion>, DmsError> {
        let (width, height) = gray.dimensions();
        let mut face = self.region_in(width, height);
        if face.width == 0 || face.height == 0 {
            return Ok(Vec::new());
        }

        let (mut sum, mut sum_sq) = (0f64, 0f64);
        for y in face.y as u32..face.y as u32 + face.height {
            for x in face.x as u32..face.x as u32 + face.width {
                let v = gray.get_pixel(x, y)[0] as f64;
                sum += v;
                sum_sq += v * v;
            }
        }
        let n = (face.width as f64) * (face.height as f64);
        let mean = sum / n;
        let std_dev = (sum_sq / n - mean * mean).max(0.0).sqrt() as f32;

        if std_dev < self.min_contrast {
            debug!("Face region contrast {:.1} below {:.1}; no face", std_dev, self.min_contrast);
            return Ok(Vec::new());
        }

        face.confidence = (std_dev / (self.min_contrast * 4.0)).min(1.0);
        Ok(vec![face])
    }
}

#[derive(Deserialize)]
struct MeanShapeFile {
    /// `[x, y]` pairs normalized to the face box
    points: Vec<[f32; 2]>,
}

/// Landmark locator that places a normalized mean face shape inside the
/// detected face box
pub struct MeanShapeLocator {
    shape: Vec<[f32; 2]>,
}

impl MeanShapeLocator {
    /// Load the shape from JSON. Fails if the file is missing, unparsable or
    /// has fewer than `required_points` landmarks.
    pub fn load(path: impl AsRef<Path>, required_points: usize) -> Result<Self, DmsError> {
        let path = path.as_ref();
        info!("Loading landmark model from {}", path.display());

        let text = std::fs::read_to_string(path).map_err(|e| {
            error!("Failed to read landmark model: {}", e);
            DmsError::LandmarkModel(format!("{}: {}", path.display(), e))
        })?;
        let file: MeanShapeFile = serde_json::from_str(&text)
            .map_err(|e| DmsError::LandmarkModel(format!("{}: {}", path.display(), e)))?;

        Self::from_points(file.points, required_points)
    }

    pub fn from_points(shape: Vec<[f32; 2]>, required_points: usize) -> Result<Self, DmsError> {
        if shape.len() < required_points {
            return Err(DmsError::LandmarkModel(format!(
                "shape has {} points, eye ranges need {}",
                shape.len(),
                required_points
            )));
        }
        if shape.iter().flatten().any(|v| !v.is_finite()) {
            return Err(DmsError::LandmarkModel("shape contains non-finite coordinates".into()));
        }
        Ok(Self { shape })
    }

    pub fn len(&self) -> usize {
        self.shape.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shape.is_empty()
    }
}

impl LandmarkLocator for MeanShapeLocator {
    fn locate(&self, _gray: &GrayImage, face: &FaceRegion) -> Result<LandmarkSet, DmsError> {
        let points = self
            .shape
            .iter()
            .map(|&[nx, ny]| {
                Point2D::new(
                    face.x + (nx * face.width as f32).round() as i32,
                    face.y + (ny * face.height as f32).round() as i32,
                )
            })
            .collect();
        Ok(LandmarkSet::new(points))
    }
}
