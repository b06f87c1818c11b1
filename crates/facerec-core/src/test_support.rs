//! Shared fixtures for unit tests: an extractor that replays scripted faces
//! per path, and throwaway store locations.

use crate::engine::Recognizer;
use crate::extractor::{ExtractError, FaceExtractor};
use crate::store::LabelStore;
use crate::types::{Descriptor, DetectedFace, LabelRecord, Rect};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub(crate) struct ScriptedExtractor {
    scripts: Arc<Mutex<HashMap<PathBuf, Vec<DetectedFace>>>>,
    threshold: f32,
}

impl ScriptedExtractor {
    pub fn new(threshold: f32) -> Self {
        Self {
            scripts: Arc::default(),
            threshold,
        }
    }

    /// Faces returned for `path`, in this order.
    pub fn script(&self, path: impl Into<PathBuf>, faces: Vec<DetectedFace>) {
        self.scripts.lock().unwrap().insert(path.into(), faces);
    }
}

impl FaceExtractor for ScriptedExtractor {
    fn extract_faces(&self, path: &Path) -> Result<Vec<DetectedFace>, ExtractError> {
        self.scripts
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| ExtractError::Image {
                path: path.display().to_string(),
                source: image::ImageError::IoError(io::Error::from(io::ErrorKind::NotFound)),
            })
    }

    fn distance_threshold(&self) -> f32 {
        self.threshold
    }
}

pub(crate) fn rect(x0: i32, y0: i32, x1: i32, y1: i32) -> Rect {
    Rect::new(x0, y0, x1, y1)
}

pub(crate) fn face(rect: Rect, values: Vec<f32>) -> DetectedFace {
    DetectedFace {
        rect,
        descriptor: Descriptor::new(values),
    }
}

/// A store path inside a fresh, not yet created temp directory.
pub(crate) fn temp_store_path() -> PathBuf {
    std::env::temp_dir()
        .join(format!("facerec-test-{}", uuid::Uuid::new_v4()))
        .join("facerec.json")
}

/// Write `records` as a store file at `path`.
pub(crate) fn write_store(path: &Path, records: &[(&str, Vec<f32>)]) {
    let records: Vec<LabelRecord> = records
        .iter()
        .map(|(label, values)| LabelRecord {
            label: label.to_string(),
            descriptor: Descriptor::new(values.clone()),
        })
        .collect();
    let index = crate::index::ClassificationIndex::from_records(records, 0.0).unwrap();
    LabelStore::new(path).save(&index).unwrap();
}

/// A recognizer over a fresh store seeded with `records` (none ⇒ no file).
pub(crate) fn recognizer_with_store(extractor: ScriptedExtractor, records: &[(&str, Vec<f32>)]) -> Recognizer {
    let path = temp_store_path();
    if !records.is_empty() {
        write_store(&path, records);
    }
    Recognizer::new(
        LabelStore::new(path),
        move || -> Result<Box<dyn FaceExtractor>, ExtractError> { Ok(Box::new(extractor.clone())) },
    )
}
