//! Activations and loss functions for training the classifiers.

use std::f32::consts::PI;

use ndarray::{Array1, ArrayView1, ArrayView2};

use crate::error::ModelError;

const PROB_FLOOR: f32 = 1e-7;

pub fn relu(x: &Array1<f32>) -> Array1<f32> {
    x.mapv(|v| v.max(0.0))
}

pub fn relu_derivative(x: &Array1<f32>) -> Array1<f32> {
    x.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 })
}

/// Numerically stable softmax.
pub fn softmax(logits: &Array1<f32>) -> Array1<f32> {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exp: Array1<f32> = logits.mapv(|v| (v - max).exp());
    let sum: f32 = exp.sum();
    exp / sum
}

fn log_sum_exp(values: &[f32]) -> f32 {
    let max = values.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f32>().ln()
}

/// Categorical cross-entropy of class probabilities against a one-hot target.
///
/// Probabilities are clamped away from zero so a confident wrong answer
/// yields a large but finite loss.
pub fn categorical_cross_entropy(probabilities: ArrayView1<f32>, target: ArrayView1<f32>) -> f32 {
    probabilities
        .iter()
        .zip(target.iter())
        .map(|(&p, &t)| -t * p.clamp(PROB_FLOOR, 1.0).ln())
        .sum()
}

/// Negative log-likelihood of mixture density outputs.
///
/// Parameters are laid out per component, one row per predicted value or point:
/// - univariate: `(mean, log_sigma, weight_logit)`
/// - bivariate: `(weight_logit, mu_x, mu_y, log_sigma_x, log_sigma_y, rho_raw)`
///   with correlation `tanh(rho_raw)`
#[derive(Debug, Clone, Copy)]
pub struct GaussianMixtureLoss {
    pub num_components: usize,
}

impl GaussianMixtureLoss {
    const UNIVARIATE_PARAMS: usize = 3;
    const BIVARIATE_PARAMS: usize = 6;

    pub fn new(num_components: usize) -> Result<Self, ModelError> {
        if num_components == 0 {
            return Err(ModelError::InvalidConfiguration(
                "a mixture needs at least one component".into(),
            ));
        }
        Ok(Self { num_components })
    }

    fn check_shape(
        &self,
        rows: usize,
        param_rows: usize,
        param_cols: usize,
        per_component: usize,
    ) -> Result<(), ModelError> {
        if rows == 0 {
            return Err(ModelError::EmptyBatch);
        }
        if rows != param_rows {
            return Err(ModelError::BatchMismatch {
                inputs: param_rows,
                targets: rows,
            });
        }
        let expected = self.num_components * per_component;
        if param_cols != expected {
            return Err(ModelError::ParameterWidthMismatch {
                expected,
                got: param_cols,
            });
        }
        Ok(())
    }

    /// Mean NLL of scalar `targets` under per-row 1-D Gaussian mixtures.
    pub fn univariate_nll(
        &self,
        targets: ArrayView1<f32>,
        params: ArrayView2<f32>,
    ) -> Result<f32, ModelError> {
        let (rows, cols) = params.dim();
        self.check_shape(targets.len(), rows, cols, Self::UNIVARIATE_PARAMS)?;

        let mut total = 0.0;
        for (x, row) in targets.iter().zip(params.rows()) {
            let logits: Vec<f32> = (0..self.num_components).map(|k| row[3 * k + 2]).collect();
            let norm = log_sum_exp(&logits);

            let terms: Vec<f32> = (0..self.num_components)
                .map(|k| {
                    let mean = row[3 * k];
                    let log_sigma = row[3 * k + 1];
                    let z = (x - mean) / log_sigma.exp();
                    (logits[k] - norm) - 0.5 * z * z - log_sigma - 0.5 * (2.0 * PI).ln()
                })
                .collect();
            total -= log_sum_exp(&terms);
        }
        Ok(total / targets.len() as f32)
    }

    /// Mean NLL of `[points, 2+]` targets (x, y in the first two columns)
    /// under per-point bivariate Gaussian mixtures.
    pub fn bivariate_nll(
        &self,
        targets: ArrayView2<f32>,
        params: ArrayView2<f32>,
    ) -> Result<f32, ModelError> {
        let (rows, cols) = params.dim();
        self.check_shape(targets.nrows(), rows, cols, Self::BIVARIATE_PARAMS)?;
        if targets.ncols() < 2 {
            return Err(ModelError::ChannelMismatch {
                expected: 2,
                got: targets.ncols(),
            });
        }

        let mut total = 0.0;
        for (point, row) in targets.rows().into_iter().zip(params.rows()) {
            let (x, y) = (point[0], point[1]);
            let logits: Vec<f32> = (0..self.num_components).map(|k| row[6 * k]).collect();
            let norm = log_sum_exp(&logits);

            let terms: Vec<f32> = (0..self.num_components)
                .map(|k| {
                    let base = 6 * k;
                    let (mu_x, mu_y) = (row[base + 1], row[base + 2]);
                    let (log_sx, log_sy) = (row[base + 3], row[base + 4]);
                    let rho = row[base + 5].tanh().clamp(-1.0 + 1e-6, 1.0 - 1e-6);

                    let dx = (x - mu_x) / log_sx.exp();
                    let dy = (y - mu_y) / log_sy.exp();
                    let one_minus_rho2 = 1.0 - rho * rho;
                    let z = dx * dx + dy * dy - 2.0 * rho * dx * dy;

                    (logits[k] - norm) - (2.0 * PI).ln() - log_sx - log_sy
                        - 0.5 * one_minus_rho2.ln()
                        - z / (2.0 * one_minus_rho2)
                })
                .collect();
            total -= log_sum_exp(&terms);
        }
        Ok(total / targets.nrows() as f32)
    }
}
