//! Classifier input preprocessing

use image::{ImageBuffer, Luma, RgbImage};

/// Single-channel patch with values in `[0, 1]`
pub type LumaPatch = ImageBuffer<Luma<f32>, Vec<f32>>;

/// RGB weights the eye model was trained with
pub const LUMA_WEIGHTS: [f32; 3] = [0.2989, 0.5870, 0.1140];

/// Convert an RGB patch to the normalized luminance the classifier expects
pub fn luminance_patch(rgb: &RgbImage) -> LumaPatch {
    let [wr, wg, wb] = LUMA_WEIGHTS;
    ImageBuffer::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        Luma([(r as f32 * wr + g as f32 * wg + b as f32 * wb) / 255.0])
    })
}
