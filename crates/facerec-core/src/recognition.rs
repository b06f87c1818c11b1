//! Read-only classification of every face in an image.

use crate::engine::Handle;
use crate::error::FacerecError;
use crate::index::Classification;
use crate::types::{KnownFace, Rect, UnknownFace};
use serde::Serialize;
use std::path::Path;

/// Faces of one image split by classification, each list in extraction order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Recognition {
    pub known: Vec<KnownFace>,
    pub unknown: Vec<UnknownFace>,
}

impl Recognition {
    /// Map a user-drawn selection onto exactly one unknown face. A face
    /// matches when either rectangle contains the other.
    ///
    /// The returned rectangle is the detector's own, suitable for
    /// [`Handle::train_face`].
    pub fn resolve_selection(&self, selection: &Rect) -> Result<Rect, FacerecError> {
        let overlaps = |r: &Rect| r.within(selection) || selection.within(r);

        let mut candidates = self.unknown.iter().filter(|f| overlaps(&f.rect));
        match (candidates.next(), candidates.count()) {
            (Some(face), 0) => Ok(face.rect),
            (Some(_), rest) => Err(FacerecError::AmbiguousFace { count: rest + 1 }),
            (None, _) => match self.known.iter().find(|f| overlaps(&f.rect)) {
                Some(known) => Err(FacerecError::AlreadyKnown {
                    label: known.label.clone(),
                    rect: known.rect,
                }),
                None => Err(FacerecError::FaceNotFound(*selection)),
            },
        }
    }
}

impl Handle {
    /// Detect and classify every face in the image at `path`.
    ///
    /// Extraction holds no lock; classification holds the read side, so
    /// recognitions run in parallel with each other but never observe a
    /// training mid-update.
    pub fn recognize(&self, path: impl AsRef<Path>) -> Result<Recognition, FacerecError> {
        let path = path.as_ref();
        let faces = self
            .extractor()?
            .extract_faces(path)
            .map_err(FacerecError::DetectionFailed)?;

        self.with_engine(|engine| {
            let mut recognition = Recognition::default();
            for face in faces {
                match engine.index.classify(&face.descriptor) {
                    Classification::Known { id, .. } => match engine.index.label(id) {
                        Some(label) => recognition.known.push(KnownFace {
                            label: label.to_string(),
                            rect: face.rect,
                        }),
                        None => {
                            tracing::warn!(%id, rect = %face.rect, "label id without label; reporting face as unknown");
                            recognition.unknown.push(UnknownFace { rect: face.rect });
                        }
                    },
                    Classification::Unknown => recognition.unknown.push(UnknownFace { rect: face.rect }),
                }
            }

            tracing::debug!(
                path = %path.display(),
                known = recognition.known.len(),
                unknown = recognition.unknown.len(),
                "recognized faces"
            );
            recognition
        })
    }
}
