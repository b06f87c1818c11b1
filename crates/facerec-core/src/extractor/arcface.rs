//! ArcFace embeddings from face crops.

use super::ExtractError;
use crate::types::{Descriptor, Rect};
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use std::sync::Mutex;

const INPUT_SIZE: u32 = 112;
const MEAN: f32 = 127.5;
const STD: f32 = 127.5; // symmetric, unlike SCRFD
const EMBEDDING_DIM: usize = 512;

pub(super) struct Embedder {
    session: Mutex<Session>,
}

impl Embedder {
    pub fn load(model_path: &Path, threads: usize) -> Result<Self, ExtractError> {
        if !model_path.exists() {
            return Err(ExtractError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(threads)?
            .commit_from_file(model_path)?;

        tracing::info!(path = %model_path.display(), "loaded ArcFace model");

        Ok(Self {
            session: Mutex::new(session),
        })
    }

    /// Embed the face inside `rect`. The crop is squashed to 112x112 without
    /// landmark alignment.
    pub fn embed(&self, image: &RgbImage, rect: &Rect) -> Result<Descriptor, ExtractError> {
        if rect.is_empty() {
            return Err(ExtractError::InferenceFailed(format!("empty face region {rect}")));
        }
        let crop = imageops::crop_imm(
            image,
            rect.min.x as u32,
            rect.min.y as u32,
            rect.width() as u32,
            rect.height() as u32,
        )
        .to_image();
        let input = preprocess(&crop);

        let mut session = self
            .session
            .lock()
            .map_err(|_| ExtractError::InferenceFailed("embedder session poisoned".into()))?;
        let outputs = session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ExtractError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw.len() != EMBEDDING_DIM {
            return Err(ExtractError::InferenceFailed(format!(
                "expected {EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        to_descriptor(raw)
    }
}

/// Normalize a raw embedding, refusing anything that would not survive
/// distance comparison or the store.
fn to_descriptor(raw: &[f32]) -> Result<Descriptor, ExtractError> {
    let descriptor = Descriptor::new(l2_normalize(raw));
    if !raw.iter().all(|v| v.is_finite()) || !descriptor.is_finite() {
        return Err(ExtractError::InferenceFailed("embedding has non-finite values".into()));
    }
    Ok(descriptor)
}

fn preprocess(crop: &RgbImage) -> Array4<f32> {
    let resized = imageops::resize(crop, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);
    let size = INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel.0[c] as f32 - MEAN) / STD;
        }
    }
    tensor
}

fn l2_normalize(raw: &[f32]) -> Vec<f32> {
    let norm = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|x| x / norm).collect()
    } else {
        raw.to_vec()
    }
}
