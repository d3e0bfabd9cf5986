//! Eye State Inference Engine Implementation

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use tract_onnx::prelude::*;

use crate::{EyeLabel, InferenceError, LumaPatch};

type EyeModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Binary open/closed classifier over a normalized luminance patch
pub trait EyeClassifier: Send {
    /// Classify a single patch (batched internally as one sample)
    fn predict(&self, patch: &LumaPatch) -> Result<EyeLabel, InferenceError>;
}

/// Tensor layout the model expects for its single input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputLayout {
    /// `[1, side, side, 1]` (Keras export default)
    #[default]
    Nhwc,
    /// `[1, 1, side, side]`
    Nchw,
}

impl InputLayout {
    fn shape(&self, side: usize) -> [usize; 4] {
        match self {
            InputLayout::Nhwc => [1, side, side, 1],
            InputLayout::Nchw => [1, 1, side, side],
        }
    }
}

/// ONNX eye-state classifier
pub struct OnnxEyeClassifier {
    model: EyeModel,
    side: u32,
    layout: InputLayout,
}

impl OnnxEyeClassifier {
    /// Load and optimize the model. Fails if the file is missing or not a valid ONNX graph.
    pub fn load(path: impl AsRef<Path>, side: u32, layout: InputLayout) -> Result<Self, InferenceError> {
        let path = path.as_ref();
        info!("Loading eye model from {}", path.display());

        if !path.is_file() {
            error!("Eye model not found at {}", path.display());
            return Err(InferenceError::ModelLoadError(format!(
                "model file not found: {}",
                path.display()
            )));
        }

        let shape = layout.shape(side as usize);
        let model = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|model| model.with_input_fact(0, f32::fact(shape).into()))
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(|e| {
                error!("Failed to load eye model: {}", e);
                InferenceError::ModelLoadError(e.to_string())
            })?;

        info!("Eye model loaded ({}x{}, {:?})", side, side, layout);
        Ok(Self { model, side, layout })
    }

    /// Input side length the model was loaded for
    pub fn side(&self) -> u32 {
        self.side
    }
}

impl EyeClassifier for OnnxEyeClassifier {
    fn predict(&self, patch: &LumaPatch) -> Result<EyeLabel, InferenceError> {
        let start = Instant::now();

        if patch.dimensions() != (self.side, self.side) {
            return Err(InferenceError::InvalidInputShape {
                expected: format!("{}x{}", self.side, self.side),
                actual: format!("{}x{}", patch.width(), patch.height()),
            });
        }

        let shape = self.layout.shape(self.side as usize);
        let input = Tensor::from_shape(&shape, patch.as_raw().as_slice())
            .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?;

        let outputs = self
            .model
            .run(tvec!(input.into()))
            .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?;
        let output = outputs
            .first()
            .ok_or_else(|| InferenceError::InvalidOutput("model produced no outputs".into()))?;
        let values = output
            .as_slice::<f32>()
            .map_err(|e| InferenceError::InvalidOutput(e.to_string()))?;

        let label = decode_output(values)?;
        debug!("Eye inference {:?} in {}us", label, start.elapsed().as_micros());
        Ok(label)
    }
}

/// Turn raw model output into a label.
///
/// A single value is a sigmoid probability of "open"; two values are class
/// scores where index 1 is "open".
pub fn decode_output(values: &[f32]) -> Result<EyeLabel, InferenceError> {
    if values.iter().any(|v| !v.is_finite()) {
        return Err(InferenceError::InvalidOutput(format!("non-finite output {:?}", values)));
    }

    let class = match values {
        [p_open] => usize::from(*p_open > 0.5),
        [closed, open] => usize::from(open > closed),
        other => {
            return Err(InferenceError::InvalidOutput(format!(
                "expected 1 or 2 values per sample, got {}",
                other.len()
            )))
        }
    };
    EyeLabel::from_class(class).ok_or_else(|| InferenceError::InvalidOutput(format!("unknown class {}", class)))
}

/// Classifier that replays a fixed sequence of labels (development and tests)
pub struct ScriptedEyeClassifier {
    labels: Mutex<VecDeque<EyeLabel>>,
    repeat: Option<EyeLabel>,
}

impl ScriptedEyeClassifier {
    /// Replay `labels` in order, failing once they run out
    pub fn new(labels: impl IntoIterator<Item = EyeLabel>) -> Self {
        info!("Creating scripted eye classifier");
        Self {
            labels: Mutex::new(labels.into_iter().collect()),
            repeat: None,
        }
    }

    /// Always answer `label`
    pub fn always(label: EyeLabel) -> Self {
        Self {
            labels: Mutex::new(VecDeque::new()),
            repeat: Some(label),
        }
    }
}

impl EyeClassifier for ScriptedEyeClassifier {
    fn predict(&self, _patch: &LumaPatch) -> Result<EyeLabel, InferenceError> {
        let next = self
            .labels
            .lock()
            .map_err(|_| InferenceError::InferenceFailed("script lock poisoned".into()))?
            .pop_front();

        next.or(self.repeat)
            .ok_or_else(|| InferenceError::InferenceFailed("scripted labels exhausted".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_sigmoid() {
        assert_eq!(decode_output(&[0.9]).unwrap(), EyeLabel::Open);
        assert_eq!(decode_output(&[0.5]).unwrap(), EyeLabel::Closed);
        assert_eq!(decode_output(&[0.1]).unwrap(), EyeLabel::Closed);
    }

    #[test]
    fn test_decode_two_class() {
        assert_eq!(decode_output(&[0.2, 0.8]).unwrap(), EyeLabel::Open);
        assert_eq!(decode_output(&[0.7, 0.3]).unwrap(), EyeLabel::Closed);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode_output(&[]), Err(InferenceError::InvalidOutput(_))));
        assert!(matches!(decode_output(&[0.1, 0.2, 0.7]), Err(InferenceError::InvalidOutput(_))));
        assert!(matches!(decode_output(&[f32::NAN]), Err(InferenceError::InvalidOutput(_))));
    }

    #[test]
    fn test_missing_model_is_load_error() {
        let result = OnnxEyeClassifier::load("/nonexistent/eye_model.onnx", 24, InputLayout::Nhwc);
        assert!(matches!(result, Err(InferenceError::ModelLoadError(_))));
    }

    #[test]
    fn test_corrupt_model_is_load_error() {
        let path = std::env::temp_dir().join(format!("corrupt-eye-model-{}.onnx", std::process::id()));
        std::fs::write(&path, b"definitely not protobuf").unwrap();

        let result = OnnxEyeClassifier::load(&path, 24, InputLayout::Nhwc);
        assert!(matches!(result, Err(InferenceError::ModelLoadError(_))));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_scripted_classifier() {
        let patch = LumaPatch::new(24, 24);
        let classifier = ScriptedEyeClassifier::new([EyeLabel::Closed, EyeLabel::Open]);
        assert_eq!(classifier.predict(&patch).unwrap(), EyeLabel::Closed);
        assert_eq!(classifier.predict(&patch).unwrap(), EyeLabel::Open);
        assert!(classifier.predict(&patch).is_err());

        let constant = ScriptedEyeClassifier::always(EyeLabel::Open);
        for _ in 0..3 {
            assert_eq!(constant.predict(&patch).unwrap(), EyeLabel::Open);
        }
    }

    #[test]
    fn test_layout_shapes() {
        assert_eq!(InputLayout::Nhwc.shape(24), [1, 24, 24, 1]);
        assert_eq!(InputLayout::Nchw.shape(24), [1, 1, 24, 24]);
    }
}
