//! ONNX Inference Engine
//!
//! Binary eye-state classification (open/closed) on normalized luminance
//! patches, using tract-onnx.

mod engine;
mod label;
mod preprocess;

pub use engine::{EyeClassifier, InputLayout, OnnxEyeClassifier, ScriptedEyeClassifier};
pub use label::EyeLabel;
pub use preprocess::{luminance_patch, LumaPatch, LUMA_WEIGHTS};

use thiserror::Error;

/// Errors during inference
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Model load failed: {0}")]
    ModelLoadError(String),
    #[error("Inference failed: {0}")]
    InferenceFailed(String),
    #[error("Invalid input shape: expected {expected}, got {actual}")]
    InvalidInputShape { expected: String, actual: String },
    #[error("Invalid model output: {0}")]
    InvalidOutput(String),
}
