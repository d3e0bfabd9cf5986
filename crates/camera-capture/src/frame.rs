//! Video frame types and processing

use image::{imageops::FilterType, GrayImage, ImageBuffer, Rgb, RgbImage};

use crate::CameraError;

/// Decoded RGB video frame
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    /// RGB pixel data (width * height * 3)
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Capture timestamp (nanoseconds)
    pub timestamp_ns: u64,
    /// Frame sequence number
    pub sequence: u64,
}

impl VideoFrame {
    /// Create a new video frame from raw RGB data
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        timestamp_ns: u64,
        sequence: u64,
    ) -> Result<Self, CameraError> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(CameraError::Format(format!(
                "expected {} bytes for {}x{} RGB, got {}",
                expected,
                width,
                height,
                data.len()
            )));
        }
        Ok(Self {
            data,
            width,
            height,
            timestamp_ns,
            sequence,
        })
    }

    /// Wrap an already decoded RGB image
    pub fn from_rgb_image(image: RgbImage, timestamp_ns: u64, sequence: u64) -> Self {
        let (width, height) = image.dimensions();
        Self {
            data: image.into_raw(),
            width,
            height,
            timestamp_ns,
            sequence,
        }
    }

    /// Decode an encoded image (png, jpeg, bmp...) into a frame
    pub fn decode(bytes: &[u8], timestamp_ns: u64, sequence: u64) -> Result<Self, CameraError> {
        let img = image::load_from_memory(bytes).map_err(|e| CameraError::Decode(e.to_string()))?;
        Ok(Self::from_rgb_image(img.to_rgb8(), timestamp_ns, sequence))
    }

    /// Borrow the pixel data as an RGB image view
    pub fn as_rgb_view(&self) -> Option<ImageBuffer<Rgb<u8>, &[u8]>> {
        ImageBuffer::from_raw(self.width, self.height, self.data.as_slice())
    }

    /// Copy the pixel data into an owned RGB image
    pub fn to_rgb_image(&self) -> Option<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.clone())
    }

    /// Convert to grayscale
    pub fn to_grayscale(&self) -> GrayImage {
        let mut gray = Vec::with_capacity((self.width * self.height) as usize);
        for pixel in self.data.chunks_exact(3) {
            // Luminance formula: 0.299*R + 0.587*G + 0.114*B
            let y = pixel[0] as f32 * 0.299 + pixel[1] as f32 * 0.587 + pixel[2] as f32 * 0.114;
            gray.push(y.round().min(255.0) as u8);
        }
        GrayImage::from_raw(self.width, self.height, gray).unwrap_or_else(|| GrayImage::new(self.width, self.height))
    }

    /// Resize to a fixed width, keeping the aspect ratio
    pub fn resize_to_width(&self, new_width: u32) -> Result<VideoFrame, CameraError> {
        if self.width == 0 || self.height == 0 || new_width == 0 {
            return Err(CameraError::Format(format!(
                "cannot resize {}x{} frame to width {}",
                self.width, self.height, new_width
            )));
        }
        if new_width == self.width {
            return Ok(self.clone());
        }

        let new_height = ((self.height as u64 * new_width as u64) as f64 / self.width as f64)
            .round()
            .max(1.0) as u32;
        let view = self
            .as_rgb_view()
            .ok_or_else(|| CameraError::Format("pixel buffer does not match dimensions".into()))?;
        let resized = image::imageops::resize(&view, new_width, new_height, FilterType::Triangle);

        Ok(VideoFrame::from_rgb_image(resized, self.timestamp_ns, self.sequence))
    }
}
