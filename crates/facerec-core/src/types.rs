use serde::{Deserialize, Serialize};
use std::fmt;

/// A pixel position in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned face bounding box. `max` is exclusive, so a rectangle with
/// `min == max` is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub min: Point,
    pub max: Point,
}

impl Rect {
    pub const fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self {
            min: Point::new(x0, y0),
            max: Point::new(x1, y1),
        }
    }

    pub fn width(&self) -> i32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> i32 {
        self.max.y - self.min.y
    }

    pub fn is_empty(&self) -> bool {
        self.min.x >= self.max.x || self.min.y >= self.max.y
    }

    /// Whether every pixel of `self` lies inside `outer`. An empty rectangle
    /// is inside anything.
    pub fn within(&self, outer: &Rect) -> bool {
        if self.is_empty() {
            return true;
        }
        outer.min.x <= self.min.x
            && self.max.x <= outer.max.x
            && outer.min.y <= self.min.y
            && self.max.y <= outer.max.y
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({},{})-({},{})",
            self.min.x, self.min.y, self.max.x, self.max.y
        )
    }
}

/// Face descriptor (512-dimensional for ArcFace). Opaque beyond distance
/// comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Descriptor {
    pub values: Vec<f32>,
}

impl Descriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }

    /// Euclidean distance, or `None` when the dimensions differ.
    pub fn distance(&self, other: &Descriptor) -> Option<f32> {
        if self.values.len() != other.values.len() {
            return None;
        }
        let sum = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>();
        Some(sum.sqrt())
    }
}

impl From<Vec<f32>> for Descriptor {
    fn from(values: Vec<f32>) -> Self {
        Self::new(values)
    }
}

/// A face found by the extractor, not yet classified.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedFace {
    pub rect: Rect,
    pub descriptor: Descriptor,
}

/// A detected face that matched no enrolled label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnknownFace {
    pub rect: Rect,
}

/// A detected face resolved to a label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownFace {
    pub label: String,
    pub rect: Rect,
}

/// One persisted training sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LabelRecord {
    pub label: String,
    pub descriptor: Descriptor,
}
