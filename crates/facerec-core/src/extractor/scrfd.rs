//! SCRFD face detection on RGB images.
//!
//! The image is letterboxed into the top-left corner of a 640x640 canvas, so
//! mapping detections back only needs the resize scale.

use super::ExtractError;
use crate::types::Rect;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use std::sync::Mutex;

const INPUT_SIZE: u32 = 640;
const MEAN: f32 = 127.5;
const STD: f32 = 128.0;
const NMS_IOU: f32 = 0.4;
const STRIDES: [usize; 3] = [8, 16, 32];
const ANCHORS_PER_CELL: usize = 2;

/// A raw detection in image pixel space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub score: f32,
}

impl Detection {
    fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    /// Round outward to whole pixels and clip to the image.
    pub fn to_rect(self, width: u32, height: u32) -> Rect {
        let clip = |v: f32, hi: u32| (v.max(0.0) as i64).min(hi as i64) as i32;
        Rect::new(
            clip(self.x1.floor(), width),
            clip(self.y1.floor(), height),
            clip(self.x2.ceil(), width),
            clip(self.y2.ceil(), height),
        )
    }
}

pub(super) struct Detector {
    session: Mutex<Session>,
    score_threshold: f32,
}

impl Detector {
    pub fn load(model_path: &Path, score_threshold: f32, threads: usize) -> Result<Self, ExtractError> {
        if !model_path.exists() {
            return Err(ExtractError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(threads)?
            .commit_from_file(model_path)?;

        let outputs = session.outputs().len();
        tracing::info!(path = %model_path.display(), outputs, "loaded SCRFD model");

        // Three strides, each with a score and a bbox tensor (keypoints unused).
        if outputs < 6 {
            return Err(ExtractError::InferenceFailed(format!(
                "SCRFD model requires at least 6 outputs, got {outputs}"
            )));
        }

        Ok(Self {
            session: Mutex::new(session),
            score_threshold,
        })
    }

    /// Detect faces, highest score first.
    pub fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, ExtractError> {
        let (input, scale) = letterbox(image);

        let mut session = self
            .session
            .lock()
            .map_err(|_| ExtractError::InferenceFailed("detector session poisoned".into()))?;
        let outputs = session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut detections = Vec::new();
        for (pos, &stride) in STRIDES.iter().enumerate() {
            let (_, scores) = outputs[pos]
                .try_extract_tensor::<f32>()
                .map_err(|e| ExtractError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, boxes) = outputs[pos + STRIDES.len()]
                .try_extract_tensor::<f32>()
                .map_err(|e| ExtractError::InferenceFailed(format!("boxes stride {stride}: {e}")))?;

            detections.extend(decode_stride(scores, boxes, stride, scale, self.score_threshold));
        }

        Ok(nms(detections, NMS_IOU))
    }
}

/// Resize to fit the canvas, anchor top-left, normalize into NCHW.
fn letterbox(image: &RgbImage) -> (Array4<f32>, f32) {
    let (width, height) = image.dimensions();
    let scale = (INPUT_SIZE as f32 / width.max(1) as f32).min(INPUT_SIZE as f32 / height.max(1) as f32);
    let new_w = ((width as f32 * scale).round() as u32).clamp(1, INPUT_SIZE);
    let new_h = ((height as f32 * scale).round() as u32).clamp(1, INPUT_SIZE);
    let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);

    let size = INPUT_SIZE as usize;
    // Padding is zero after normalization.
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel.0[c] as f32 - MEAN) / STD;
        }
    }

    (tensor, scale)
}

fn decode_stride(scores: &[f32], boxes: &[f32], stride: usize, scale: f32, threshold: f32) -> Vec<Detection> {
    let grid_w = INPUT_SIZE as usize / stride;
    let grid_h = INPUT_SIZE as usize / stride;
    let anchors = grid_w * grid_h * ANCHORS_PER_CELL;
    let step = stride as f32;

    (0..anchors)
        .filter_map(|idx| {
            let score = *scores.get(idx)?;
            if score < threshold {
                return None;
            }
            let offsets = boxes.get(idx * 4..idx * 4 + 4)?;
            let cell = idx / ANCHORS_PER_CELL;
            let cx = (cell % grid_w) as f32 * step;
            let cy = (cell / grid_w) as f32 * step;

            Some(Detection {
                x1: (cx - offsets[0] * step) / scale,
                y1: (cy - offsets[1] * step) / scale,
                x2: (cx + offsets[2] * step) / scale,
                y2: (cy + offsets[3] * step) / scale,
                score,
            })
        })
        .collect()
}

fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<Detection> = Vec::with_capacity(detections.len());
    for det in detections {
        if keep.iter().all(|k| iou(k, &det) <= iou_threshold) {
            keep.push(det);
        }
    }
    keep
}

fn iou(a: &Detection, b: &Detection) -> f32 {
    let inter = Detection {
        x1: a.x1.max(b.x1),
        y1: a.y1.max(b.y1),
        x2: a.x2.min(b.x2),
        y2: a.y2.min(b.y2),
        score: 0.0,
    }
    .area();
    let union = a.area() + b.area() - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}
