//! facerec-core — trainable face classification.
//!
//! A [`Recognizer`] hands out reference-counted [`Handle`]s to one shared
//! engine: an ONNX face extractor (SCRFD detection, ArcFace embeddings) plus
//! a nearest-neighbour index built from a persisted label store. Handles
//! recognize faces in images and teach the index new labels.

pub mod engine;
pub mod error;
pub mod extractor;
pub mod index;
pub mod recognition;
pub mod store;
pub mod training;
pub mod types;

#[cfg(test)]
mod test_support;

pub use engine::{Handle, LabelSummary, Recognizer};
pub use error::FacerecError;
pub use extractor::{ExtractError, ExtractorLoader, FaceExtractor, OnnxExtractor, OnnxModels};
pub use index::{Classification, ClassificationIndex, IndexError, LabelId};
pub use recognition::Recognition;
pub use store::{LabelStore, StoreError};
pub use training::Trained;
pub use types::{Descriptor, DetectedFace, KnownFace, LabelRecord, Point, Rect, UnknownFace};

use std::path::PathBuf;

/// System-wide model directory used when none is configured.
pub fn default_model_dir() -> PathBuf {
    PathBuf::from("/usr/share/facerec/models")
}
