//! Dense per-sample feature matrices used by the classical baselines.

use ndarray::{concatenate, Array2, ArrayView1, Axis};

use crate::error::DatasetError;

/// `[samples, features]` descriptor matrix with one label per row.
#[derive(Debug, Clone)]
pub struct DescriptorDataset {
    pub features: Array2<f64>,
    pub labels: Vec<usize>,
}

impl DescriptorDataset {
    pub fn new(features: Array2<f64>, labels: Vec<usize>) -> Result<Self, DatasetError> {
        if features.nrows() != labels.len() {
            return Err(DatasetError::LengthMismatch {
                geometries: features.nrows(),
                labels: labels.len(),
            });
        }
        Ok(Self { features, labels })
    }

    /// Stack datasets row-wise; all parts must share the feature width.
    pub fn concatenate(parts: Vec<DescriptorDataset>) -> Result<Self, DatasetError> {
        let Some(width) = parts.first().map(|p| p.features.ncols()) else {
            return Err(DatasetError::InvalidArray {
                name: "fourier_descriptors".to_string(),
                reason: "no descriptor archives to concatenate".to_string(),
            });
        };
        if let Some(bad) = parts.iter().find(|p| p.features.ncols() != width) {
            return Err(DatasetError::InvalidArray {
                name: "fourier_descriptors".to_string(),
                reason: format!("width {} differs from {width}", bad.features.ncols()),
            });
        }

        let views: Vec<_> = parts.iter().map(|p| p.features.view()).collect();
        let features =
            concatenate(Axis(0), &views).map_err(|err| DatasetError::InvalidArray {
                name: "fourier_descriptors".to_string(),
                reason: err.to_string(),
            })?;
        let labels = parts.into_iter().flat_map(|p| p.labels).collect();
        Self::new(features, labels)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn row(&self, index: usize) -> ArrayView1<'_, f64> {
        self.features.row(index)
    }

    /// Rows selected by `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> DescriptorDataset {
        DescriptorDataset {
            features: self.features.select(Axis(0), indices),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
        }
    }
}
