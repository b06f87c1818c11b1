//! In-memory classification index: samples, their categories, and the label
//! table the categories point into.

use crate::types::{Descriptor, LabelRecord};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Position of a label in the index's label table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct LabelId(pub usize);

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Outcome of classifying one descriptor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Classification {
    Known { id: LabelId, distance: f32 },
    Unknown,
}

impl Classification {
    pub fn label_id(&self) -> Option<LabelId> {
        match self {
            Classification::Known { id, .. } => Some(*id),
            Classification::Unknown => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndexError {
    #[error("mismatched samples and categories length ({samples} vs {categories})")]
    LengthMismatch { samples: usize, categories: usize },
    #[error("category {category} has no attached label ({labels} labels)")]
    DanglingCategory { category: LabelId, labels: usize },
    #[error("sample {index} has a non-finite component")]
    NonFiniteDescriptor { index: usize },
    #[error("sample {index} has {found} dimensions, expected {expected}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },
}

/// Check the structural invariants shared by the index and the store codec.
pub fn validate(samples: &[Descriptor], categories: &[LabelId], labels: &[String]) -> Result<(), IndexError> {
    if samples.len() != categories.len() {
        return Err(IndexError::LengthMismatch {
            samples: samples.len(),
            categories: categories.len(),
        });
    }
    if let Some(&category) = categories.iter().find(|c| c.0 >= labels.len()) {
        return Err(IndexError::DanglingCategory {
            category,
            labels: labels.len(),
        });
    }
    if let Some(index) = samples.iter().position(|s| !s.is_finite()) {
        return Err(IndexError::NonFiniteDescriptor { index });
    }
    if let Some(first) = samples.first() {
        let expected = first.dim();
        if let Some((index, sample)) = samples.iter().enumerate().find(|(_, s)| s.dim() != expected) {
            return Err(IndexError::DimensionMismatch {
                index,
                expected,
                found: sample.dim(),
            });
        }
    }
    Ok(())
}

/// Nearest-neighbour index over enrolled descriptors.
#[derive(Debug, Clone)]
pub struct ClassificationIndex {
    samples: Vec<Descriptor>,
    categories: Vec<LabelId>,
    labels: Vec<String>,
    threshold: f32,
}

impl ClassificationIndex {
    /// Empty index accepting matches at distance `threshold` or closer.
    pub fn new(threshold: f32) -> Self {
        Self {
            samples: Vec::new(),
            categories: Vec::new(),
            labels: Vec::new(),
            threshold,
        }
    }

    /// Build from persisted records. Labels get ids in first-occurrence order.
    pub fn from_records(records: Vec<LabelRecord>, threshold: f32) -> Result<Self, IndexError> {
        let mut samples = Vec::with_capacity(records.len());
        let mut categories = Vec::with_capacity(records.len());
        let mut labels: Vec<String> = Vec::new();

        for record in records {
            let id = match labels.iter().position(|l| *l == record.label) {
                Some(pos) => LabelId(pos),
                None => {
                    labels.push(record.label);
                    LabelId(labels.len() - 1)
                }
            };
            samples.push(record.descriptor);
            categories.push(id);
        }

        let mut index = Self::new(threshold);
        index.rebuild(samples, categories, labels)?;
        Ok(index)
    }

    /// Replace the whole contents at once. Nothing changes if the new contents
    /// violate an invariant.
    pub fn rebuild(
        &mut self,
        samples: Vec<Descriptor>,
        categories: Vec<LabelId>,
        labels: Vec<String>,
    ) -> Result<(), IndexError> {
        validate(&samples, &categories, &labels)?;
        self.samples = samples;
        self.categories = categories;
        self.labels = labels;
        Ok(())
    }

    /// Nearest sample across the whole index, accepted within the threshold.
    pub fn classify(&self, probe: &Descriptor) -> Classification {
        let mut best: Option<(usize, f32)> = None;

        for (i, sample) in self.samples.iter().enumerate() {
            let Some(distance) = probe.distance(sample).filter(|d| d.is_finite()) else {
                continue;
            };
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((i, distance));
            }
        }

        match best {
            Some((i, distance)) if distance <= self.threshold => Classification::Known {
                id: self.categories[i],
                distance,
            },
            _ => Classification::Unknown,
        }
    }

    pub fn label_id(&self, label: &str) -> Option<LabelId> {
        self.labels.iter().position(|l| l == label).map(LabelId)
    }

    pub fn label(&self, id: LabelId) -> Option<&str> {
        self.labels.get(id.0).map(String::as_str)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn samples(&self) -> &[Descriptor] {
        &self.samples
    }

    pub fn categories(&self) -> &[LabelId] {
        &self.categories
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples per label, indexed by label id.
    pub fn sample_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.labels.len()];
        for id in &self.categories {
            counts[id.0] += 1;
        }
        counts
    }

    /// Records in sample order, ready for the store.
    pub fn records(&self) -> Result<Vec<LabelRecord>, IndexError> {
        validate(&self.samples, &self.categories, &self.labels)?;
        Ok(self
            .samples
            .iter()
            .zip(&self.categories)
            .map(|(descriptor, id)| LabelRecord {
                label: self.labels[id.0].clone(),
                descriptor: descriptor.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(label: &str, values: &[f32]) -> LabelRecord {
        LabelRecord {
            label: label.into(),
            descriptor: Descriptor::new(values.to_vec()),
        }
    }

    #[test]
    fn test_from_records_first_occurrence_order() {
        let index = ClassificationIndex::from_records(
            vec![
                record("Bob", &[0.0, 1.0]),
                record("Alice", &[1.0, 0.0]),
                record("Bob", &[0.1, 0.9]),
                record("Carol", &[-1.0, 0.0]),
            ],
            0.5,
        )
        .unwrap();

        assert_eq!(index.labels(), &["Bob", "Alice", "Carol"]);
        assert_eq!(
            index.categories(),
            &[LabelId(0), LabelId(1), LabelId(0), LabelId(2)]
        );
        assert_eq!(index.sample_counts(), vec![2, 1, 1]);
    }

    #[test]
    fn test_classify_nearest_within_threshold() {
        let index = ClassificationIndex::from_records(
            vec![record("Alice", &[1.0, 0.0]), record("Bob", &[0.0, 1.0])],
            0.5,
        )
        .unwrap();

        let near_bob = Descriptor::new(vec![0.1, 0.95]);
        match index.classify(&near_bob) {
            Classification::Known { id, distance } => {
                assert_eq!(index.label(id), Some("Bob"));
                assert!(distance < 0.5);
            }
            Classification::Unknown => panic!("expected a match"),
        }
    }

    #[test]
    fn test_classify_outside_threshold_is_unknown() {
        let index = ClassificationIndex::from_records(vec![record("Alice", &[1.0, 0.0])], 0.5).unwrap();
        assert_eq!(index.classify(&Descriptor::new(vec![-1.0, 0.0])), Classification::Unknown);
    }

    #[test]
    fn test_classify_empty_index_is_unknown() {
        let index = ClassificationIndex::new(10.0);
        assert_eq!(index.classify(&Descriptor::new(vec![0.0])), Classification::Unknown);
    }

    #[test]
    fn test_classify_skips_other_dimensions() {
        let index = ClassificationIndex::from_records(vec![record("Alice", &[1.0, 0.0])], 10.0).unwrap();
        assert_eq!(index.classify(&Descriptor::new(vec![1.0, 0.0, 0.0])), Classification::Unknown);
    }

    #[test]
    fn test_rebuild_rejects_length_mismatch() {
        let mut index = ClassificationIndex::new(0.5);
        let err = index
            .rebuild(vec![Descriptor::new(vec![0.0])], vec![], vec!["a".into()])
            .unwrap_err();
        assert_eq!(err, IndexError::LengthMismatch { samples: 1, categories: 0 });
        assert!(index.is_empty());
    }

    #[test]
    fn test_rebuild_rejects_dangling_category() {
        let mut index = ClassificationIndex::from_records(vec![record("Alice", &[1.0])], 0.5).unwrap();
        let err = index
            .rebuild(
                vec![Descriptor::new(vec![1.0])],
                vec![LabelId(1)],
                vec!["Alice".into()],
            )
            .unwrap_err();
        assert!(matches!(err, IndexError::DanglingCategory { category: LabelId(1), labels: 1 }));
        // Previous contents survive a rejected rebuild.
        assert_eq!(index.labels(), &["Alice"]);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_rebuild_rejects_mixed_dimensions() {
        let err = ClassificationIndex::from_records(
            vec![record("a", &[1.0, 0.0]), record("b", &[1.0])],
            0.5,
        )
        .unwrap_err();
        assert_eq!(
            err,
            IndexError::DimensionMismatch { index: 1, expected: 2, found: 1 }
        );
    }

    #[test]
    fn test_rebuild_rejects_non_finite_descriptor() {
        let mut index = ClassificationIndex::from_records(vec![record("Alice", &[1.0, 0.0])], 0.5).unwrap();
        let err = index
            .rebuild(
                vec![Descriptor::new(vec![f32::NAN, 0.0]), Descriptor::new(vec![1.0, 0.0])],
                vec![LabelId(0), LabelId(1)],
                vec!["Ghost".into(), "Alice".into()],
            )
            .unwrap_err();
        assert_eq!(err, IndexError::NonFiniteDescriptor { index: 0 });
        assert_eq!(index.labels(), &["Alice"]);

        let err = ClassificationIndex::from_records(vec![record("Ghost", &[f32::INFINITY])], 0.5).unwrap_err();
        assert_eq!(err, IndexError::NonFiniteDescriptor { index: 0 });
    }

    #[test]
    fn test_classify_non_finite_probe_is_unknown() {
        let index = ClassificationIndex::from_records(
            vec![record("Alice", &[1.0, 0.0]), record("Bob", &[0.0, 1.0])],
            10.0,
        )
        .unwrap();
        assert_eq!(index.classify(&Descriptor::new(vec![f32::NAN, 0.0])), Classification::Unknown);
        // A bad probe does not disturb later lookups.
        assert_eq!(index.classify(&Descriptor::new(vec![0.0, 1.0])).label_id(), Some(LabelId(1)));
    }

    #[test]
    fn test_records_preserve_sample_order() {
        let input = vec![
            record("Bob", &[0.0, 1.0]),
            record("Alice", &[1.0, 0.0]),
            record("Bob", &[0.2, 0.8]),
        ];
        let index = ClassificationIndex::from_records(input.clone(), 0.5).unwrap();
        assert_eq!(index.records().unwrap(), input);
    }

    #[test]
    fn test_label_lookup() {
        let index = ClassificationIndex::from_records(
            vec![record("Alice", &[1.0]), record("Bob", &[2.0])],
            0.5,
        )
        .unwrap();
        assert_eq!(index.label_id("Bob"), Some(LabelId(1)));
        assert_eq!(index.label_id("Carol"), None);
        assert_eq!(index.label(LabelId(0)), Some("Alice"));
        assert_eq!(index.label(LabelId(7)), None);
    }
}
