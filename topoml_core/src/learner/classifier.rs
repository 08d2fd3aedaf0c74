//! Convolutional sequence classifier
//!
//! Classifies a whole geometry (any number of points) into one of `C`
//! categories: Conv1D (same padding, ReLU) → global average pooling →
//! Dense (ReLU) → Dropout → Dense (softmax).

use std::path::Path;

use ndarray::{s, Array1, Array2, Array3, ArrayView1, ArrayView2, ArrayView3, ArrayViewMutD, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::bucket::argmax;
use crate::checkpoint::{check_version, CheckpointError, Checkpointable};
use crate::error::ModelError;
use crate::neural::{categorical_cross_entropy, relu, relu_derivative, softmax, Gradients, Parameterized};

const CHECKPOINT_VERSION: u32 = 1;

/// Models mapping one geometry to class probabilities.
pub trait SequenceClassifier: Parameterized {
    /// Number of output classes.
    fn num_classes(&self) -> usize;

    /// Expected point width.
    fn channels(&self) -> usize;

    /// Class probabilities for one geometry `[points, channels]`.
    fn forward(&self, geometry: ArrayView2<f32>) -> Result<Array1<f32>, ModelError>;

    /// Index of the most probable class.
    fn predict(&self, geometry: ArrayView2<f32>) -> Result<usize, ModelError> {
        let probs = self.forward(geometry)?;
        Ok(argmax(probs.iter()))
    }

    /// Mean categorical cross-entropy over a `[batch, points, channels]`
    /// batch against `[batch, classes]` one-hot targets, plus the gradient of
    /// every parameter averaged over the batch. Dropout is only active when
    /// `training` is set.
    fn compute_loss(
        &mut self,
        inputs: ArrayView3<f32>,
        targets: ArrayView2<f32>,
        training: bool,
    ) -> Result<(f32, Gradients), ModelError>;
}

/// Shared batch checks for [`SequenceClassifier::compute_loss`].
pub(crate) fn check_batch(
    inputs: &ArrayView3<f32>,
    targets: &ArrayView2<f32>,
    channels: usize,
    num_classes: usize,
) -> Result<(), ModelError> {
    let (batch, _, width) = inputs.dim();
    if batch == 0 {
        return Err(ModelError::EmptyBatch);
    }
    if batch != targets.nrows() {
        return Err(ModelError::BatchMismatch {
            inputs: batch,
            targets: targets.nrows(),
        });
    }
    if width != channels {
        return Err(ModelError::ChannelMismatch {
            expected: channels,
            got: width,
        });
    }
    if targets.ncols() != num_classes {
        return Err(ModelError::ClassCountMismatch {
            expected: num_classes,
            got: targets.ncols(),
        });
    }
    Ok(())
}

/// Inverted dropout mask; all ones when `rate` is zero.
pub(crate) fn dropout_mask(rng: &mut StdRng, len: usize, rate: f32) -> Array1<f32> {
    if rate <= 0.0 {
        return Array1::ones(len);
    }
    let keep = 1.0 / (1.0 - rate);
    Array1::from_shape_fn(len, |_| if rng.gen::<f32>() < rate { 0.0 } else { keep })
}

/// Scaled uniform initialisation in `[-sqrt(2/fan_in), sqrt(2/fan_in)]`.
pub(crate) fn init_weights<D: ndarray::Dimension, Sh: ndarray::ShapeBuilder<Dim = D>>(
    rng: &mut StdRng,
    shape: Sh,
    fan_in: usize,
) -> ndarray::Array<f32, D> {
    let scale = (2.0 / fan_in.max(1) as f32).sqrt();
    ndarray::Array::from_shape_fn(shape, |_| (rng.gen::<f32>() - 0.5) * 2.0 * scale)
}

pub(crate) fn outer(a: &Array1<f32>, b: ArrayView1<f32>) -> Array2<f32> {
    a.view()
        .insert_axis(Axis(1))
        .dot(&b.insert_axis(Axis(0)))
}

/// Architecture of a [`ConvClassifier`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Point width of the input geometries
    pub channels: usize,
    /// Convolution filters
    pub filters: usize,
    /// Convolution window, odd
    pub kernel_size: usize,
    /// Hidden dense layer width
    pub dense_size: usize,
    pub num_classes: usize,
    pub dropout: f32,
    /// Seed for weight initialisation and dropout masks
    pub seed: u64,
}

impl ClassifierConfig {
    pub fn new(channels: usize, num_classes: usize) -> Self {
        Self {
            channels,
            filters: 32,
            kernel_size: 5,
            dense_size: 32,
            num_classes,
            dropout: 0.0,
            seed: 42,
        }
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.channels == 0 || self.filters == 0 || self.dense_size == 0 {
            return Err(ModelError::InvalidConfiguration(
                "channels, filters and dense size must be positive".into(),
            ));
        }
        if self.kernel_size == 0 || self.kernel_size % 2 == 0 {
            return Err(ModelError::InvalidConfiguration(format!(
                "kernel size must be odd, got {}",
                self.kernel_size
            )));
        }
        if self.num_classes < 2 {
            return Err(ModelError::InvalidConfiguration(format!(
                "need at least two classes, got {}",
                self.num_classes
            )));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ModelError::InvalidConfiguration(format!(
                "dropout must lie in [0, 1), got {}",
                self.dropout
            )));
        }
        Ok(())
    }
}

/// Activations of one forward pass, kept for backpropagation.
struct ConvCache {
    padded: Array2<f32>,
    conv_pre: Array2<f32>,
    pooled: Array1<f32>,
    hidden_pre: Array1<f32>,
    mask: Array1<f32>,
    hidden: Array1<f32>,
    probs: Array1<f32>,
}

/// Conv1D → global average pool → Dense → Dropout → softmax.
#[derive(Debug, Clone)]
pub struct ConvClassifier {
    config: ClassifierConfig,
    // [filters, kernel, channels]
    conv_w: Array3<f32>,
    conv_b: Array1<f32>,
    // [dense, filters]
    w1: Array2<f32>,
    b1: Array1<f32>,
    // [classes, dense]
    w2: Array2<f32>,
    b2: Array1<f32>,
    rng: StdRng,
}

#[derive(Serialize, Deserialize)]
struct ConvSnapshot {
    version: u32,
    config: ClassifierConfig,
    conv_w: Array3<f32>,
    conv_b: Array1<f32>,
    w1: Array2<f32>,
    b1: Array1<f32>,
    w2: Array2<f32>,
    b2: Array1<f32>,
}

impl ConvClassifier {
    pub fn new(config: ClassifierConfig) -> Result<Self, ModelError> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);

        let conv_w = init_weights(
            &mut rng,
            (config.filters, config.kernel_size, config.channels),
            config.kernel_size * config.channels,
        );
        let w1 = init_weights(&mut rng, (config.dense_size, config.filters), config.filters);
        let w2 = init_weights(
            &mut rng,
            (config.num_classes, config.dense_size),
            config.dense_size,
        );

        Ok(Self {
            conv_b: Array1::zeros(config.filters),
            b1: Array1::zeros(config.dense_size),
            b2: Array1::zeros(config.num_classes),
            conv_w,
            w1,
            w2,
            rng,
            config,
        })
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    fn forward_with_cache(
        &self,
        geometry: ArrayView2<f32>,
        mask: Array1<f32>,
    ) -> Result<ConvCache, ModelError> {
        let (len, width) = geometry.dim();
        if width != self.config.channels {
            return Err(ModelError::ChannelMismatch {
                expected: self.config.channels,
                got: width,
            });
        }
        if len == 0 {
            return Err(ModelError::SequenceLengthMismatch {
                expected: 1,
                got: 0,
            });
        }

        let kernel = self.config.kernel_size;
        let half = kernel / 2;
        let mut padded = Array2::<f32>::zeros((len + 2 * half, width));
        padded.slice_mut(s![half..half + len, ..]).assign(&geometry);

        // z[t, f] = b[f] + sum_k window_k[t, :] . W[f, k, :]
        let mut conv_pre = Array2::<f32>::zeros((len, self.config.filters));
        conv_pre += &self.conv_b;
        for k in 0..kernel {
            let window = padded.slice(s![k..k + len, ..]);
            let taps = self.conv_w.slice(s![.., k, ..]);
            conv_pre += &window.dot(&taps.t());
        }

        let activated = conv_pre.mapv(|v| v.max(0.0));
        let pooled = activated
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(self.config.filters));

        let hidden_pre = self.w1.dot(&pooled) + &self.b1;
        let hidden = relu(&hidden_pre) * &mask;
        let logits = self.w2.dot(&hidden) + &self.b2;
        let probs = softmax(&logits);

        Ok(ConvCache {
            padded,
            conv_pre,
            pooled,
            hidden_pre,
            mask,
            hidden,
            probs,
        })
    }
}

impl Parameterized for ConvClassifier {
    fn parameters_mut(&mut self) -> Vec<(String, ArrayViewMutD<'_, f32>)> {
        vec![
            ("conv.kernel".to_string(), self.conv_w.view_mut().into_dyn()),
            ("conv.bias".to_string(), self.conv_b.view_mut().into_dyn()),
            ("hidden.weight".to_string(), self.w1.view_mut().into_dyn()),
            ("hidden.bias".to_string(), self.b1.view_mut().into_dyn()),
            ("output.weight".to_string(), self.w2.view_mut().into_dyn()),
            ("output.bias".to_string(), self.b2.view_mut().into_dyn()),
        ]
    }

    fn num_parameters(&self) -> usize {
        self.conv_w.len()
            + self.conv_b.len()
            + self.w1.len()
            + self.b1.len()
            + self.w2.len()
            + self.b2.len()
    }
}

impl SequenceClassifier for ConvClassifier {
    fn num_classes(&self) -> usize {
        self.config.num_classes
    }

    fn channels(&self) -> usize {
        self.config.channels
    }

    fn forward(&self, geometry: ArrayView2<f32>) -> Result<Array1<f32>, ModelError> {
        let mask = Array1::ones(self.config.dense_size);
        Ok(self.forward_with_cache(geometry, mask)?.probs)
    }

    fn compute_loss(
        &mut self,
        inputs: ArrayView3<f32>,
        targets: ArrayView2<f32>,
        training: bool,
    ) -> Result<(f32, Gradients), ModelError> {
        check_batch(&inputs, &targets, self.config.channels, self.config.num_classes)?;
        let batch = inputs.len_of(Axis(0));
        let len = inputs.len_of(Axis(1));
        let kernel = self.config.kernel_size;

        let mut d_conv_w = Array3::<f32>::zeros(self.conv_w.dim());
        let mut d_conv_b = Array1::<f32>::zeros(self.conv_b.dim());
        let mut dw1 = Array2::<f32>::zeros(self.w1.dim());
        let mut db1 = Array1::<f32>::zeros(self.b1.dim());
        let mut dw2 = Array2::<f32>::zeros(self.w2.dim());
        let mut db2 = Array1::<f32>::zeros(self.b2.dim());
        let mut total_loss = 0.0;

        for (geometry, target) in inputs.outer_iter().zip(targets.outer_iter()) {
            let rate = if training { self.config.dropout } else { 0.0 };
            let mask = dropout_mask(&mut self.rng, self.config.dense_size, rate);
            let cache = self.forward_with_cache(geometry, mask)?;
            total_loss += categorical_cross_entropy(cache.probs.view(), target);

            // softmax + cross-entropy
            let d_logits = &cache.probs - &target;
            dw2 += &outer(&d_logits, cache.hidden.view());
            db2 += &d_logits;

            let d_hidden = self.w2.t().dot(&d_logits) * &cache.mask;
            let d_hidden_pre = d_hidden * relu_derivative(&cache.hidden_pre);
            dw1 += &outer(&d_hidden_pre, cache.pooled.view());
            db1 += &d_hidden_pre;

            // average pooling spreads the gradient evenly over the sequence
            let d_pooled = self.w1.t().dot(&d_hidden_pre) / len as f32;
            let relu_mask = cache.conv_pre.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 });
            let d_conv_pre = relu_mask * &d_pooled;

            d_conv_b += &d_conv_pre.sum_axis(Axis(0));
            for k in 0..kernel {
                let window = cache.padded.slice(s![k..k + len, ..]);
                let mut taps = d_conv_w.slice_mut(s![.., k, ..]);
                taps += &d_conv_pre.t().dot(&window);
            }
        }

        let n = batch as f32;
        let mut grads = Gradients::new();
        grads.insert("conv.kernel", (d_conv_w / n).into_dyn());
        grads.insert("conv.bias", (d_conv_b / n).into_dyn());
        grads.insert("hidden.weight", (dw1 / n).into_dyn());
        grads.insert("hidden.bias", (db1 / n).into_dyn());
        grads.insert("output.weight", (dw2 / n).into_dyn());
        grads.insert("output.bias", (db2 / n).into_dyn());

        Ok((total_loss / n, grads))
    }
}

impl Checkpointable for ConvClassifier {
    fn save_checkpoint<P: AsRef<Path>>(&self, path: P) -> Result<(), CheckpointError> {
        let snapshot = ConvSnapshot {
            version: CHECKPOINT_VERSION,
            config: self.config.clone(),
            conv_w: self.conv_w.clone(),
            conv_b: self.conv_b.clone(),
            w1: self.w1.clone(),
            b1: self.b1.clone(),
            w2: self.w2.clone(),
            b2: self.b2.clone(),
        };
        Self::write_snapshot(&snapshot, path)
    }

    fn load_checkpoint<P: AsRef<Path>>(path: P) -> Result<Self, CheckpointError> {
        let snapshot: ConvSnapshot = Self::read_snapshot(path)?;
        check_version(CHECKPOINT_VERSION, snapshot.version)?;

        let mut model = ConvClassifier::new(snapshot.config)
            .map_err(|err| CheckpointError::InvalidFormat(err.to_string()))?;
        if snapshot.conv_w.dim() != model.conv_w.dim()
            || snapshot.conv_b.dim() != model.conv_b.dim()
            || snapshot.w1.dim() != model.w1.dim()
            || snapshot.b1.dim() != model.b1.dim()
            || snapshot.w2.dim() != model.w2.dim()
            || snapshot.b2.dim() != model.b2.dim()
        {
            return Err(CheckpointError::InvalidFormat(
                "weight shapes do not match the stored architecture".into(),
            ));
        }

        model.conv_w = snapshot.conv_w;
        model.conv_b = snapshot.conv_b;
        model.w1 = snapshot.w1;
        model.b1 = snapshot.b1;
        model.w2 = snapshot.w2;
        model.b2 = snapshot.b2;
        Ok(model)
    }
}
