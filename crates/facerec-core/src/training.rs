//! Teaching the index new samples.
//!
//! Both entry points extract outside any lock, then run classify, extend,
//! rebuild and persist as one critical section under the write lock. The
//! in-memory index is authoritative: the store is written from it and never
//! re-read mid-session.

use crate::engine::{Engine, Handle};
use crate::error::FacerecError;
use crate::index::{Classification, LabelId};
use crate::store::LabelStore;
use crate::types::{DetectedFace, Rect};
use serde::Serialize;
use std::path::Path;

/// A successfully stored training sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Trained {
    pub label: String,
    pub label_id: LabelId,
    /// Rectangle of the face that was enrolled.
    pub rect: Rect,
    /// Whether this sample introduced the label.
    pub new_label: bool,
}

impl Handle {
    /// Label the single unknown face in the image.
    ///
    /// Fails with [`FacerecError::NoUnknownFace`] when every face is already
    /// known (or none was found), and [`FacerecError::AmbiguousFace`] when
    /// more than one face is unknown. Labels are stored verbatim: blank ones
    /// and ones with leading or trailing whitespace are refused with
    /// [`FacerecError::InvalidLabel`].
    pub fn train(&self, path: impl AsRef<Path>, label: &str) -> Result<Trained, FacerecError> {
        let label = checked_label(label)?;
        let faces = self.extract(path.as_ref())?;

        self.with_engine_mut(|engine| {
            let face = {
                let mut unknown = faces
                    .into_iter()
                    .filter(|f| engine.index.classify(&f.descriptor) == Classification::Unknown);
                match (unknown.next(), unknown.count()) {
                    (None, _) => return Err(FacerecError::NoUnknownFace),
                    (Some(face), 0) => face,
                    (Some(_), rest) => return Err(FacerecError::AmbiguousFace { count: rest + 1 }),
                }
            };
            commit(engine, self.store(), face, label)
        })
    }

    /// Label the face whose detected rectangle is exactly `rect`.
    ///
    /// Overlap does not count; `rect` has to be one the extractor reports,
    /// e.g. from [`Recognition::resolve_selection`](crate::Recognition::resolve_selection).
    pub fn train_face(&self, path: impl AsRef<Path>, rect: Rect, label: &str) -> Result<Trained, FacerecError> {
        let label = checked_label(label)?;
        let face = self
            .extract(path.as_ref())?
            .into_iter()
            .find(|f| f.rect == rect)
            .ok_or(FacerecError::FaceNotFound(rect))?;

        self.with_engine_mut(|engine| {
            if let Classification::Known { id, .. } = engine.index.classify(&face.descriptor) {
                return Err(FacerecError::AlreadyKnown {
                    label: engine.index.label(id).unwrap_or_default().to_string(),
                    rect,
                });
            }
            commit(engine, self.store(), face, label)
        })
    }

    fn extract(&self, path: &Path) -> Result<Vec<DetectedFace>, FacerecError> {
        self.extractor()?
            .extract_faces(path)
            .map_err(FacerecError::DetectionFailed)
    }
}

/// Labels are stored verbatim, so blank ones and ones with surrounding
/// whitespace are refused rather than rewritten.
fn checked_label(label: &str) -> Result<&str, FacerecError> {
    if label.trim().is_empty() || label.trim() != label {
        return Err(FacerecError::InvalidLabel);
    }
    Ok(label)
}

/// Append `face` under `label`, rebuild, persist. Caller holds the write lock.
fn commit(engine: &mut Engine, store: &LabelStore, face: DetectedFace, label: &str) -> Result<Trained, FacerecError> {
    let index = &mut engine.index;

    let mut labels = index.labels().to_vec();
    let (label_id, new_label) = match index.label_id(label) {
        Some(id) => (id, false),
        None => {
            labels.push(label.to_string());
            (LabelId(labels.len() - 1), true)
        }
    };

    let mut samples = index.samples().to_vec();
    samples.push(face.descriptor);
    let mut categories = index.categories().to_vec();
    categories.push(label_id);

    index.rebuild(samples, categories, labels)?;

    if let Err(e) = store.save(index) {
        tracing::warn!(
            error = %e,
            label,
            samples = index.len(),
            "label store not updated; in-memory index is ahead of disk"
        );
        return Err(e.into());
    }

    tracing::info!(label, %label_id, new_label, rect = %face.rect, "trained face");
    Ok(Trained {
        label: label.to_string(),
        label_id,
        rect: face.rect,
        new_label,
    })
}
