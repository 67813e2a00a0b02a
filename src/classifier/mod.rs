//! Image classification contract.
//!
//! The prediction service only ever sees [`Classifier`], so a stub and a
//! real model are interchangeable without touching the HTTP layer.

mod onnx;
mod stub;

pub use onnx::{preprocess, softmax, KeywordGroup, OnnxClassifier, OnnxSettings};
pub use stub::StubClassifier;

use std::fmt;

use image::DynamicImage;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("inference failed: {0}")]
    Inference(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ClassifierLoadError {
    #[error("failed to load model {path}: {reason}")]
    Model { path: String, reason: String },

    #[error("failed to read labels {path}: {source}")]
    Labels {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("labels file {0} contains no labels")]
    NoLabels(String),

    #[error("input_size must be greater than zero")]
    InputSize,
}

/// A score in `[0.0, 1.0]`. Out-of-range inputs are clamped and NaN maps to 0.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Confidence(f64);

impl Confidence {
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            Self(0.0)
        } else {
            Self(value.clamp(0.0, 1.0))
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl From<f32> for Confidence {
    fn from(value: f32) -> Self {
        Self::new(f64::from(value))
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub label: String,
    pub confidence: Confidence,
}

pub trait Classifier: Send + Sync {
    /// Short name reported by the info endpoint.
    fn kind(&self) -> &'static str;

    fn classify(&self, image_bytes: &[u8]) -> Result<Classification, ClassifyError>;
}

/// Decodes an upload, rejecting anything that is not a supported raster format.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, ClassifyError> {
    if bytes.is_empty() {
        return Err(ClassifyError::InvalidImage("empty upload".to_string()));
    }
    let format = image::guess_format(bytes)
        .map_err(|_| ClassifyError::InvalidImage("unrecognized image format".to_string()))?;
    image::load_from_memory_with_format(bytes, format)
        .map_err(|e| ClassifyError::InvalidImage(e.to_string()))
}
