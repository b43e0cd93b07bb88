//! Dataset
//! ---
//!
//! Defines labelled datasets with one-hot (or soft) label rows, along with the
//! class-balancing, validation split and minibatch helpers used by the trainers.
use hashbrown::HashMap;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::{DataError, Result};

/// Key identifying a label row exactly.  Zeros of either sign share a key.
pub type LabelKey = Vec<u32>;

fn label_key(row: &[f32]) -> LabelKey {
    row.iter()
        .map(|v| if *v == 0.0 { 0 } else { v.to_bits() })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Feature rows paired with label rows
pub struct LabeledSet {
    /// Feature vectors
    x: Vec<Vec<f32>>,
    /// Label vectors, usually one-hot
    y: Vec<Vec<f32>>,
}

impl LabeledSet {
    /// Creates a new dataset, checking that every feature row and every label row
    /// has the same width as the first.
    pub fn new(x: Vec<Vec<f32>>, y: Vec<Vec<f32>>) -> Result<Self> {
        if x.len() != y.len() {
            return Err(DataError::Shape(format!(
                "{} feature rows but {} label rows",
                x.len(),
                y.len()
            )));
        }
        if let (Some(x0), Some(y0)) = (x.first(), y.first()) {
            if let Some(i) = x.iter().position(|r| r.len() != x0.len()) {
                return Err(DataError::Shape(format!(
                    "feature row {} has {} columns, expected {}",
                    i,
                    x[i].len(),
                    x0.len()
                )));
            }
            if let Some(i) = y.iter().position(|r| r.len() != y0.len()) {
                return Err(DataError::Shape(format!(
                    "label row {} has {} columns, expected {}",
                    i,
                    y[i].len(),
                    y0.len()
                )));
            }
        }
        Ok(LabeledSet { x: x, y: y })
    }

    /// Creates a dataset from class indices, one-hot encoding them
    pub fn from_classes(x: Vec<Vec<f32>>, labels: &[usize], n_classes: usize) -> Result<Self> {
        let mut y = Vec::with_capacity(labels.len());
        for &l in labels {
            if l >= n_classes {
                return Err(DataError::Shape(format!(
                    "class {} out of range for {} classes",
                    l, n_classes
                )));
            }
            let mut row = vec![0f32; n_classes];
            row[l] = 1.0;
            y.push(row);
        }
        LabeledSet::new(x, y)
    }

    /// Feature rows
    pub fn x(&self) -> &[Vec<f32>] {
        &self.x
    }

    /// Label rows
    pub fn y(&self) -> &[Vec<f32>] {
        &self.y
    }

    /// Number of examples
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Whether there are no examples
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Width of the feature rows
    pub fn dims(&self) -> usize {
        self.x.first().map(|r| r.len()).unwrap_or(0)
    }

    /// Width of the label rows
    pub fn n_classes(&self) -> usize {
        self.y.first().map(|r| r.len()).unwrap_or(0)
    }

    /// Counts the examples of each distinct label row
    pub fn class_counts(&self) -> HashMap<LabelKey, usize> {
        let mut counts = HashMap::new();
        for row in self.y.iter() {
            *counts.entry(label_key(row)).or_insert(0) += 1;
        }
        counts
    }

    /// Per example weights which equalize the total weight of every class:
    /// each example weighs `max_count / count` of its label row.
    pub fn balanced_weights(&self) -> Vec<f32> {
        let counts = self.class_counts();
        let max_count = counts.values().cloned().max().unwrap_or(1) as f32;
        self.y
            .iter()
            .map(|row| max_count / counts[&label_key(row)] as f32)
            .collect()
    }

    /// Holds out the last `frac` of the examples for validation, without shuffling.
    /// The training part keeps `floor(n * (1 - frac))` examples.
    pub fn split_validation(&self, frac: f32) -> Result<(LabeledSet, LabeledSet)> {
        if !(frac >= 0.0 && frac < 1.0) {
            return Err(DataError::Invalid {
                field: "validation_split",
                reason: format!("must be in [0, 1), got {}", frac),
            });
        }
        let split_at = (self.len() as f64 * (1.0 - frac as f64)) as usize;
        if split_at == 0 && !self.is_empty() {
            return Err(DataError::Invalid {
                field: "validation_split",
                reason: format!("leaves no training examples out of {}", self.len()),
            });
        }
        let train = LabeledSet {
            x: self.x[..split_at].to_vec(),
            y: self.y[..split_at].to_vec(),
        };
        let valid = LabeledSet {
            x: self.x[split_at..].to_vec(),
            y: self.y[split_at..].to_vec(),
        };
        Ok((train, valid))
    }

    /// Copies out the examples at the given indices
    pub fn subset(&self, idxs: &[usize]) -> LabeledSet {
        LabeledSet {
            x: idxs.iter().map(|&i| self.x[i].clone()).collect(),
            y: idxs.iter().map(|&i| self.y[i].clone()).collect(),
        }
    }

    /// Splits the example indices into batches of at most `batch_size`, optionally
    /// shuffling first.  The last batch holds the remainder.
    pub fn minibatches<R: Rng>(
        &self,
        batch_size: usize,
        shuffle: bool,
        rng: &mut R,
    ) -> Vec<Vec<usize>> {
        assert!(batch_size > 0);
        let mut idxs: Vec<usize> = (0..self.len()).collect();
        if shuffle {
            idxs.shuffle(rng);
        }
        idxs.chunks(batch_size).map(|c| c.to_vec()).collect()
    }
}
