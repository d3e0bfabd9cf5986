//! Eye state labels

use serde::{Deserialize, Serialize};

/// Classifier verdict for one eye
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EyeLabel {
    Closed = 0,
    Open = 1,
}

impl EyeLabel {
    /// Map a class index to a label
    pub fn from_class(class: usize) -> Option<Self> {
        match class {
            0 => Some(EyeLabel::Closed),
            1 => Some(EyeLabel::Open),
            _ => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        *self == EyeLabel::Closed
    }

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            EyeLabel::Closed => "closed",
            EyeLabel::Open => "open",
        }
    }
}
