//! Per-feature standardisation.

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Zero mean, unit variance per feature column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl StandardScaler {
    /// Fit on training features; constant columns keep a scale of 1.
    pub fn fit(features: &Array2<f64>) -> Result<Self, ModelError> {
        let mean = features.mean_axis(Axis(0)).ok_or(ModelError::EmptyBatch)?;
        let scale = features
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > 0.0 && s.is_finite() { s } else { 1.0 });
        Ok(Self { mean, scale })
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    pub fn scale(&self) -> &Array1<f64> {
        &self.scale
    }

    pub fn transform(&self, features: &Array2<f64>) -> Result<Array2<f64>, ModelError> {
        if features.ncols() != self.mean.len() {
            return Err(ModelError::ChannelMismatch {
                expected: self.mean.len(),
                got: features.ncols(),
            });
        }
        Ok((features - &self.mean) / &self.scale)
    }
}
