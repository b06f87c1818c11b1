use super::arcface::Embedder;
use super::scrfd::Detector;
use super::{ExtractError, ExtractorLoader, FaceExtractor};
use crate::types::DetectedFace;
use std::path::{Path, PathBuf};

/// Model files and tuning for the ONNX extractor.
#[derive(Debug, Clone)]
pub struct OnnxModels {
    /// SCRFD detection model (`det_10g.onnx`).
    pub detector: PathBuf,
    /// ArcFace recognition model (`w600k_r50.onnx`).
    pub embedder: PathBuf,
    /// Minimum detector confidence for a face to be reported.
    pub score_threshold: f32,
    /// Maximum Euclidean distance between L2-normalized embeddings for a match.
    pub distance_threshold: f32,
    pub intra_threads: usize,
}

impl OnnxModels {
    /// Standard insightface file names inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            detector: dir.join("det_10g.onnx"),
            embedder: dir.join("w600k_r50.onnx"),
            score_threshold: 0.5,
            distance_threshold: 1.10,
            intra_threads: 2,
        }
    }
}

impl ExtractorLoader for OnnxModels {
    fn load(&self) -> Result<Box<dyn FaceExtractor>, ExtractError> {
        Ok(Box::new(OnnxExtractor::load(self)?))
    }
}

/// SCRFD detection followed by ArcFace embedding of every detected face.
pub struct OnnxExtractor {
    detector: Detector,
    embedder: Embedder,
    distance_threshold: f32,
}

impl OnnxExtractor {
    pub fn load(models: &OnnxModels) -> Result<Self, ExtractError> {
        let detector = Detector::load(&models.detector, models.score_threshold, models.intra_threads)?;
        let embedder = Embedder::load(&models.embedder, models.intra_threads)?;
        Ok(Self {
            detector,
            embedder,
            distance_threshold: models.distance_threshold,
        })
    }
}

impl FaceExtractor for OnnxExtractor {
    fn extract_faces(&self, path: &Path) -> Result<Vec<DetectedFace>, ExtractError> {
        let image = image::open(path)
            .map_err(|source| ExtractError::Image {
                path: path.display().to_string(),
                source,
            })?
            .to_rgb8();
        let (width, height) = image.dimensions();

        let mut faces = Vec::new();
        for detection in self.detector.detect(&image)? {
            let rect = detection.to_rect(width, height);
            if rect.is_empty() {
                continue;
            }
            let descriptor = self.embedder.embed(&image, &rect)?;
            faces.push(DetectedFace { rect, descriptor });
        }

        tracing::debug!(path = %path.display(), faces = faces.len(), "extracted faces");
        Ok(faces)
    }

    fn distance_threshold(&self) -> f32 {
        self.distance_threshold
    }
}
