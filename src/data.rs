//! In-memory supervised datasets.
//!
//! Training only needs two matrices with matching row counts. `Dataset` pairs them up
//! and provides a seeded train/test split; how the rows were produced (files, images,
//! synthetic generators) is up to the caller.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::{Error, Matrix, Result};

/// Features (X) and labels (Y), one sample per row.
#[derive(Debug, Clone)]
pub struct Dataset {
    features: Matrix,
    labels: Matrix,
}

/// Result of [`Dataset::split`].
#[derive(Debug, Clone)]
pub struct Split {
    pub train_features: Matrix,
    pub test_features: Matrix,
    pub train_labels: Matrix,
    pub test_labels: Matrix,
}

impl Dataset {
    pub fn new(features: Matrix, labels: Matrix) -> Result<Self> {
        if features.rows() != labels.rows() {
            return Err(Error::DimensionMismatch(format!(
                "features/labels row count mismatch: {} vs {}",
                features.rows(),
                labels.rows()
            )));
        }
        Ok(Self { features, labels })
    }

    /// Build a dataset from per-sample rows.
    pub fn from_rows(features: &[Vec<f64>], labels: &[Vec<f64>]) -> Result<Self> {
        Self::new(Matrix::from_rows(features)?, Matrix::from_rows(labels)?)
    }

    #[inline]
    pub fn features(&self) -> &Matrix {
        &self.features
    }

    #[inline]
    pub fn labels(&self) -> &Matrix {
        &self.labels
    }

    #[inline]
    /// Returns the number of samples.
    pub fn len(&self) -> usize {
        self.features.rows()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shuffle rows with `seed` and hold out `floor(len * test_fraction)` of them.
    pub fn split(&self, test_fraction: f64, seed: u64) -> Result<Split> {
        if !(0.0..=1.0).contains(&test_fraction) {
            return Err(Error::InvalidConfig(format!(
                "test_fraction must be in [0, 1], got {test_fraction}"
            )));
        }

        let total = self.len();
        let test_rows = (total as f64 * test_fraction).floor() as usize;
        let train_rows = total - test_rows;

        let mut indices: Vec<usize> = (0..total).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        indices.shuffle(&mut rng);

        let (train_idx, test_idx) = indices.split_at(train_rows);
        Ok(Split {
            train_features: gather_rows(&self.features, train_idx)?,
            test_features: gather_rows(&self.features, test_idx)?,
            train_labels: gather_rows(&self.labels, train_idx)?,
            test_labels: gather_rows(&self.labels, test_idx)?,
        })
    }
}

fn gather_rows(m: &Matrix, indices: &[usize]) -> Result<Matrix> {
    let mut data = Vec::with_capacity(indices.len() * m.cols());
    for &i in indices {
        data.extend_from_slice(m.row(i));
    }
    Matrix::from_vec(indices.len(), m.cols(), data)
}
