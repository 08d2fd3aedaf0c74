//! One-vs-rest linear support vector machine.
//!
//! Each class gets a binary hinge-loss classifier trained with Pegasos
//! stochastic sub-gradient descent, `lambda = 1 / (C * n)`. The bias is
//! learned as the weight of an appended constant feature.

use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::debug;

use crate::error::ModelError;

#[derive(Debug, Clone)]
pub struct LinearSvm {
    c: f64,
    /// `[classes, features + 1]`, last column is the bias
    weights: Array2<f64>,
}

impl LinearSvm {
    /// Fit one binary classifier per class over `epochs` passes of the data.
    pub fn fit(
        c: f64,
        epochs: usize,
        seed: u64,
        features: &Array2<f64>,
        labels: &[usize],
    ) -> Result<Self, ModelError> {
        if !(c > 0.0 && c.is_finite()) || epochs == 0 {
            return Err(ModelError::InvalidConfiguration(format!(
                "C must be positive and epochs non-zero, got C={c}, epochs={epochs}"
            )));
        }
        if features.nrows() != labels.len() {
            return Err(ModelError::BatchMismatch {
                inputs: features.nrows(),
                targets: labels.len(),
            });
        }
        let n = labels.len();
        let classes = labels.iter().max().map(|m| m + 1).ok_or(ModelError::EmptyBatch)?;
        if classes < 2 {
            return Err(ModelError::InvalidConfiguration(
                "need at least two classes".into(),
            ));
        }

        let mut augmented = Array2::<f64>::ones((n, features.ncols() + 1));
        augmented
            .slice_mut(ndarray::s![.., ..features.ncols()])
            .assign(features);
        let lambda = 1.0 / (c * n as f64);

        let rows: Vec<Array1<f64>> = (0..classes)
            .into_par_iter()
            .map(|class| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(class as u64));
                train_binary(&augmented, labels, class, lambda, epochs * n, &mut rng)
            })
            .collect();

        let mut weights = Array2::zeros((classes, features.ncols() + 1));
        for (mut row, trained) in weights.axis_iter_mut(Axis(0)).zip(&rows) {
            row.assign(trained);
        }
        debug!(c, classes, samples = n, "fitted linear svm");
        Ok(Self { c, weights })
    }

    pub fn c(&self) -> f64 {
        self.c
    }

    pub fn num_classes(&self) -> usize {
        self.weights.nrows()
    }

    fn decision(&self, x: ArrayView1<f64>) -> Array1<f64> {
        let width = x.len();
        let linear = self.weights.slice(ndarray::s![.., ..width]).dot(&x);
        linear + &self.weights.column(width)
    }

    /// Class with the highest decision value for every row.
    pub fn predict(&self, features: &Array2<f64>) -> Result<Vec<usize>, ModelError> {
        let expected = self.weights.ncols() - 1;
        if features.ncols() != expected {
            return Err(ModelError::ChannelMismatch {
                expected,
                got: features.ncols(),
            });
        }
        Ok((0..features.nrows())
            .into_par_iter()
            .map(|i| argmax_f64(self.decision(features.row(i)).iter()))
            .collect())
    }
}

fn argmax_f64<'a>(values: impl IntoIterator<Item = &'a f64>) -> usize {
    values
        .into_iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(best, best_val), (idx, &v)| {
            if v > best_val {
                (idx, v)
            } else {
                (best, best_val)
            }
        })
        .0
}

/// Pegasos on `class` versus the rest, projected onto the `1/sqrt(lambda)` ball.
fn train_binary(
    x: &Array2<f64>,
    labels: &[usize],
    class: usize,
    lambda: f64,
    iterations: usize,
    rng: &mut StdRng,
) -> Array1<f64> {
    let n = labels.len();
    let radius = 1.0 / lambda.sqrt();
    let mut w = Array1::<f64>::zeros(x.ncols());

    for t in 1..=iterations {
        let i = rng.gen_range(0..n);
        let y = if labels[i] == class { 1.0 } else { -1.0 };
        let row = x.row(i);
        let eta = 1.0 / (lambda * t as f64);
        let margin = y * w.dot(&row);

        w *= 1.0 - eta * lambda;
        if margin < 1.0 {
            w.scaled_add(eta * y, &row);
        }
        let norm = w.dot(&w).sqrt();
        if norm > radius {
            w *= radius / norm;
        }
    }
    w
}
