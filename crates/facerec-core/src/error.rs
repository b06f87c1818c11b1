use crate::extractor::ExtractError;
use crate::index::IndexError;
use crate::store::StoreError;
use crate::types::Rect;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FacerecError {
    #[error("failed to initialize face extractor: {0}")]
    Initialization(#[source] ExtractError),
    #[error("face detection failed: {0}")]
    DetectionFailed(#[source] ExtractError),
    #[error("image has no unknown faces")]
    NoUnknownFace,
    #[error("image has {count} unknown faces; cannot tell which one to label")]
    AmbiguousFace { count: usize },
    #[error("no detected face matches {0}")]
    FaceNotFound(Rect),
    #[error("face at {rect} is already known as {label:?}")]
    AlreadyKnown { label: String, rect: Rect },
    #[error("label must not be blank")]
    InvalidLabel,
    #[error("classification index invariant violated: {0}")]
    Integrity(#[from] IndexError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
