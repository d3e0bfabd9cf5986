//! Face geometry: landmark points, face regions and eye boxes

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::DmsError;

/// Pixel coordinate produced by the landmark locator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point2D {
    pub x: i32,
    pub y: i32,
}

impl Point2D {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Ordered landmarks for one detected face
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LandmarkSet {
    points: Vec<Point2D>,
}

impl LandmarkSet {
    pub fn new(points: Vec<Point2D>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[Point2D] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Contour points of one eye
    pub fn eye(&self, range: &Range<usize>) -> Result<&[Point2D], DmsError> {
        self.points.get(range.clone()).ok_or_else(|| {
            DmsError::Landmarks(format!(
                "eye range {:?} outside landmark set of {} points",
                range,
                self.points.len()
            ))
        })
    }
}

/// Face bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub confidence: f32,
}

/// Axis-aligned integer rectangle in frame coordinates; may start off-frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EyeBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl EyeBox {
    /// Smallest box enclosing all points (inclusive of the extreme pixels).
    ///
    /// `None` for no points or a span too wide to represent.
    pub fn bounding(points: &[Point2D]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut max_x, mut min_y, mut max_y) = (first.x, first.x, first.y, first.y);
        for p in &points[1..] {
            min_x = min_x.min(p.x);
            max_x = max_x.max(p.x);
            min_y = min_y.min(p.y);
            max_y = max_y.max(p.y);
        }

        Some(Self {
            x: min_x,
            y: min_y,
            width: u32::try_from(max_x as i64 - min_x as i64 + 1).ok()?,
            height: u32::try_from(max_y as i64 - min_y as i64 + 1).ok()?,
        })
    }

    /// Make the box square using its width, then shift it up by half its new height.
    ///
    /// Eyelid closure shrinks the contour's height but not its width, so the
    /// width is the stable dimension. `None` if the raised box starts above
    /// the representable coordinate range.
    pub fn squared_and_raised(self) -> Option<Self> {
        let side = self.width;
        let y = i32::try_from(self.y as i64 - (side / 2) as i64).ok()?;
        Some(Self {
            x: self.x,
            y,
            width: side,
            height: side,
        })
    }

    /// Right edge (exclusive)
    pub fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    /// Bottom edge (exclusive)
    pub fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }

    /// Whether the box lies entirely inside a `width` x `height` frame
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x >= 0 && self.y >= 0 && self.right() <= width as i64 && self.bottom() <= height as i64
    }

    /// Intersection with a `width` x `height` frame, `None` if empty
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Self> {
        let x0 = (self.x as i64).clamp(0, width as i64);
        let y0 = (self.y as i64).clamp(0, height as i64);
        let x1 = self.right().clamp(0, width as i64);
        let y1 = self.bottom().clamp(0, height as i64);

        if x1 <= x0 || y1 <= y0 {
            return None;
        }

        Some(Self {
            x: x0 as i32,
            y: y0 as i32,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
        })
    }
}
