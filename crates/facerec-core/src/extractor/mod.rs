//! Descriptor extraction: image path in, ordered detected faces out.
//!
//! The detection and embedding algorithm is a pluggable capability. The
//! lifecycle manager only sees [`FaceExtractor`] and instantiates it through
//! an [`ExtractorLoader`] when the first handle is acquired.

mod arcface;
mod onnx;
mod scrfd;

pub use onnx::{OnnxExtractor, OnnxModels};

use crate::types::DetectedFace;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("model file not found: {0} — download from insightface and place in the model directory")]
    ModelNotFound(String),
    #[error("cannot read image {path}: {source}")]
    Image {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("extractor is not initialized")]
    NotInitialized,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// A loaded face detection + embedding engine.
pub trait FaceExtractor: Send + Sync {
    /// Detect every face in the image at `path` and compute its descriptor.
    ///
    /// Order is implementation-defined but stable within one call.
    fn extract_faces(&self, path: &Path) -> Result<Vec<DetectedFace>, ExtractError>;

    /// Largest descriptor distance still accepted as the same identity.
    fn distance_threshold(&self) -> f32;
}

/// Instantiates a [`FaceExtractor`] on engine initialization.
pub trait ExtractorLoader: Send + Sync {
    fn load(&self) -> Result<Box<dyn FaceExtractor>, ExtractError>;
}

impl<F> ExtractorLoader for F
where
    F: Fn() -> Result<Box<dyn FaceExtractor>, ExtractError> + Send + Sync,
{
    fn load(&self) -> Result<Box<dyn FaceExtractor>, ExtractError> {
        self()
    }
}
