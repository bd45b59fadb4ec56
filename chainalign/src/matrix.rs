//! Sparse pairwise registration matrix.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cache::{load_from_path, save_to_path};
use crate::error::{CacheError, MatrixError};
use crate::transform::{Transform, TransformRecord};

/// Directed, confidence-annotated transforms between frame pairs of one feed.
///
/// Only the `newer > older` direction is stored: the entry for `(newer, older)` is
/// the registration of `older` against reference `newer`, and the opposite
/// direction is obtained by inversion. A pair that was never registered, or whose
/// registration failed, has no entry at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistrationMatrix {
    frame_count: usize,
    entries: BTreeMap<(usize, usize), Transform>,
}

impl RegistrationMatrix {
    pub fn new(frame_count: usize) -> Self {
        Self {
            frame_count,
            entries: BTreeMap::new(),
        }
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stores the registration of `target` against `reference`.
    ///
    /// When `reference < target` the transform is inverted and stored under
    /// `(target, reference)`. Returns the entry it replaced, if any.
    pub fn insert(
        &mut self,
        reference: usize,
        target: usize,
        transform: Transform,
    ) -> Result<Option<Transform>, MatrixError> {
        if reference == target {
            return Err(MatrixError::SelfPair { frame: reference });
        }
        for frame in [reference, target] {
            if frame >= self.frame_count {
                return Err(MatrixError::FrameOutOfRange {
                    frame,
                    frame_count: self.frame_count,
                });
            }
        }

        let (newer, older) = (reference.max(target), reference.min(target));
        if !transform.is_valid() {
            return Err(MatrixError::InvalidTransform { newer, older });
        }

        let stored = if reference > target {
            transform
        } else {
            transform.inverse()
        };
        Ok(self.entries.insert((newer, older), stored))
    }

    /// Stored entry for the unordered pair `{a, b}`, in the `newer > older` direction.
    pub fn get(&self, a: usize, b: usize) -> Option<&Transform> {
        self.entries.get(&(a.max(b), a.min(b)))
    }

    pub fn contains(&self, a: usize, b: usize) -> bool {
        self.get(a, b).is_some()
    }

    /// Transform from frame `from` toward frame `to`, inverting the stored entry
    /// when `from < to`.
    pub fn transform_between(&self, from: usize, to: usize) -> Option<Transform> {
        if from == to {
            return None;
        }
        let stored = self.get(from, to)?;
        Some(if from > to { *stored } else { stored.inverse() })
    }

    /// Iterates stored entries as `((newer, older), transform)` in key order.
    pub fn iter(&self) -> impl Iterator<Item = ((usize, usize), &Transform)> {
        self.entries.iter().map(|(&k, t)| (k, t))
    }

    pub fn to_record(&self) -> MatrixRecord {
        let mut rows: BTreeMap<usize, BTreeMap<usize, TransformRecord>> = BTreeMap::new();
        for (&(newer, older), t) in &self.entries {
            rows.entry(newer).or_default().insert(older, (*t).into());
        }
        MatrixRecord {
            frame_count: Some(self.frame_count),
            rows,
        }
    }

    /// Rebuilds a matrix from its persisted form. Rows keyed by the older frame
    /// are normalized by inversion; a pair present in both directions is
    /// rejected.
    pub fn from_record(record: &MatrixRecord) -> Result<Self, MatrixError> {
        let inferred = record
            .rows
            .iter()
            .flat_map(|(&i, row)| row.keys().map(move |&j| i.max(j) + 1))
            .max()
            .unwrap_or(0);
        let mut matrix = Self::new(record.frame_count.unwrap_or(inferred));

        for (&reference, row) in &record.rows {
            for (&target, t) in row {
                if matrix.insert(reference, target, Transform::from(*t))?.is_some() {
                    return Err(MatrixError::DuplicatePair {
                        newer: reference.max(target),
                        older: reference.min(target),
                    });
                }
            }
        }
        Ok(matrix)
    }
}

/// Persisted form of one feed's matrix: `rows[newer][older]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatrixRecord {
    /// Missing in older result files, then inferred as the largest index plus one.
    #[serde(default)]
    pub frame_count: Option<usize>,
    pub rows: BTreeMap<usize, BTreeMap<usize, TransformRecord>>,
}

/// Pairwise registration output for many feeds, as handed from the
/// registration step to chain resolution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrationResults {
    pub feeds: BTreeMap<String, MatrixRecord>,
}

impl RegistrationResults {
    pub fn insert(&mut self, feed: &str, matrix: &RegistrationMatrix) {
        self.feeds.insert(feed.to_string(), matrix.to_record());
    }

    pub fn matrix(&self, feed: &str) -> Option<Result<RegistrationMatrix, MatrixError>> {
        self.feeds.get(feed).map(RegistrationMatrix::from_record)
    }

    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        save_to_path(self, path)
    }

    pub fn load(path: &Path) -> Result<Self, CacheError> {
        load_from_path(path)
    }
}
