//! Fully connected classifier over flattened fixed-length geometries.

use std::path::Path;

use ndarray::{Array1, Array2, ArrayView2, ArrayView3, ArrayViewMutD};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::checkpoint::{check_version, CheckpointError, Checkpointable};
use crate::error::ModelError;
use crate::learner::classifier::{check_batch, dropout_mask, init_weights, outer, SequenceClassifier};
use crate::neural::{categorical_cross_entropy, relu, relu_derivative, softmax, Gradients, Parameterized};

const CHECKPOINT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseConfig {
    /// Points per geometry; every input must have exactly this many
    pub points: usize,
    pub channels: usize,
    pub dense_size: usize,
    /// Dense + dropout blocks before the output layer, at least one
    pub hidden_layers: usize,
    pub num_classes: usize,
    pub dropout: f32,
    pub seed: u64,
}

impl DenseConfig {
    /// `repeat_deep_arch` extra hidden blocks on top of the first one.
    pub fn new(points: usize, channels: usize, num_classes: usize, repeat_deep_arch: usize) -> Self {
        Self {
            points,
            channels,
            dense_size: 32,
            hidden_layers: 1 + repeat_deep_arch,
            num_classes,
            dropout: 0.5,
            seed: 42,
        }
    }

    fn input_size(&self) -> usize {
        self.points * self.channels
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.input_size() == 0 || self.dense_size == 0 || self.hidden_layers == 0 {
            return Err(ModelError::InvalidConfiguration(
                "input size, dense size and hidden layers must be positive".into(),
            ));
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

/// Weights and bias of one fully connected layer, `weight` is `[out, in]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Layer {
    weight: Array2<f32>,
    bias: Array1<f32>,
}

/// Flatten → (Dense ReLU → Dropout) × hidden_layers → Dense softmax.
#[derive(Debug, Clone)]
pub struct DenseClassifier {
    config: DenseConfig,
    hidden: Vec<Layer>,
    output: Layer,
    rng: StdRng,
}

#[derive(Serialize, Deserialize)]
struct DenseSnapshot {
    version: u32,
    config: DenseConfig,
    hidden: Vec<Layer>,
    output: Layer,
}

impl DenseClassifier {
    pub fn new(config: DenseConfig) -> Result<Self, ModelError> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);

        let mut hidden = Vec::with_capacity(config.hidden_layers);
        let mut fan_in = config.input_size();
        for _ in 0..config.hidden_layers {
            hidden.push(Layer {
                weight: init_weights(&mut rng, (config.dense_size, fan_in), fan_in),
                bias: Array1::zeros(config.dense_size),
            });
            fan_in = config.dense_size;
        }
        let output = Layer {
            weight: init_weights(&mut rng, (config.num_classes, fan_in), fan_in),
            bias: Array1::zeros(config.num_classes),
        };

        Ok(Self {
            config,
            hidden,
            output,
            rng,
        })
    }

    pub fn config(&self) -> &DenseConfig {
        &self.config
    }

    fn flatten(&self, geometry: ArrayView2<f32>) -> Result<Array1<f32>, ModelError> {
        let (points, width) = geometry.dim();
        if width != self.config.channels {
            return Err(ModelError::ChannelMismatch {
                expected: self.config.channels,
                got: width,
            });
        }
        if points != self.config.points {
            return Err(ModelError::SequenceLengthMismatch {
                expected: self.config.points,
                got: points,
            });
        }
        Ok(geometry.iter().copied().collect())
    }

    /// Returns probabilities plus, per hidden layer, its input, pre-activation and mask.
    fn forward_with_cache(
        &self,
        input: Array1<f32>,
        masks: Vec<Array1<f32>>,
    ) -> (Array1<f32>, Vec<(Array1<f32>, Array1<f32>, Array1<f32>)>) {
        let mut cache = Vec::with_capacity(self.hidden.len());
        let mut activation = input;
        for (layer, mask) in self.hidden.iter().zip(masks) {
            let pre = layer.weight.dot(&activation) + &layer.bias;
            let next = relu(&pre) * &mask;
            cache.push((activation, pre, mask));
            activation = next;
        }
        let logits = self.output.weight.dot(&activation) + &self.output.bias;
        cache.push((activation, Array1::zeros(0), Array1::zeros(0)));
        (softmax(&logits), cache)
    }

    fn layer_names(index: usize) -> (String, String) {
        (format!("dense_{index}.weight"), format!("dense_{index}.bias"))
    }
}

impl Parameterized for DenseClassifier {
    fn parameters_mut(&mut self) -> Vec<(String, ArrayViewMutD<'_, f32>)> {
        let mut params = Vec::with_capacity(2 * (self.hidden.len() + 1));
        for (index, layer) in self.hidden.iter_mut().enumerate() {
            let (weight, bias) = Self::layer_names(index);
            params.push((weight, layer.weight.view_mut().into_dyn()));
            params.push((bias, layer.bias.view_mut().into_dyn()));
        }
        params.push(("output.weight".to_string(), self.output.weight.view_mut().into_dyn()));
        params.push(("output.bias".to_string(), self.output.bias.view_mut().into_dyn()));
        params
    }

    fn num_parameters(&self) -> usize {
        self.hidden
            .iter()
            .chain(std::iter::once(&self.output))
            .map(|layer| layer.weight.len() + layer.bias.len())
            .sum()
    }
}

impl SequenceClassifier for DenseClassifier {
    fn num_classes(&self) -> usize {
        self.config.num_classes
    }

    fn channels(&self) -> usize {
        self.config.channels
    }

    fn forward(&self, geometry: ArrayView2<f32>) -> Result<Array1<f32>, ModelError> {
        let input = self.flatten(geometry)?;
        let masks = vec![Array1::ones(self.config.dense_size); self.hidden.len()];
        Ok(self.forward_with_cache(input, masks).0)
    }

    fn compute_loss(
        &mut self,
        inputs: ArrayView3<f32>,
        targets: ArrayView2<f32>,
        training: bool,
    ) -> Result<(f32, Gradients), ModelError> {
        check_batch(&inputs, &targets, self.config.channels, self.config.num_classes)?;
        let batch = inputs.outer_iter().len();

        let mut d_hidden: Vec<(Array2<f32>, Array1<f32>)> = self
            .hidden
            .iter()
            .map(|l| (Array2::zeros(l.weight.dim()), Array1::zeros(l.bias.dim())))
            .collect();
        let mut d_out_w = Array2::<f32>::zeros(self.output.weight.dim());
        let mut d_out_b = Array1::<f32>::zeros(self.output.bias.dim());
        let mut total_loss = 0.0;

        let rate = if training { self.config.dropout } else { 0.0 };
        for (geometry, target) in inputs.outer_iter().zip(targets.outer_iter()) {
            let input = self.flatten(geometry)?;
            let masks = (0..self.hidden.len())
                .map(|_| dropout_mask(&mut self.rng, self.config.dense_size, rate))
                .collect();
            let (probs, mut cache) = self.forward_with_cache(input, masks);
            total_loss += categorical_cross_entropy(probs.view(), target);

            let mut delta = &probs - &target;
            let (last, _, _) = cache.pop().unwrap_or_default();
            d_out_w += &outer(&delta, last.view());
            d_out_b += &delta;

            let mut upstream = self.output.weight.t().dot(&delta);
            for (index, (layer_input, pre, mask)) in cache.into_iter().enumerate().rev() {
                delta = upstream * &mask * relu_derivative(&pre);
                let (dw, db) = &mut d_hidden[index];
                *dw += &outer(&delta, layer_input.view());
                *db += &delta;
                upstream = self.hidden[index].weight.t().dot(&delta);
            }
        }

        let n = batch as f32;
        let mut grads = Gradients::new();
        for (index, (dw, db)) in d_hidden.into_iter().enumerate() {
            let (weight, bias) = Self::layer_names(index);
            grads.insert(weight, (dw / n).into_dyn());
            grads.insert(bias, (db / n).into_dyn());
        }
        grads.insert("output.weight", (d_out_w / n).into_dyn());
        grads.insert("output.bias", (d_out_b / n).into_dyn());

        Ok((total_loss / n, grads))
    }
}

impl Checkpointable for DenseClassifier {
    fn save_checkpoint<P: AsRef<Path>>(&self, path: P) -> Result<(), CheckpointError> {
        let snapshot = DenseSnapshot {
            version: CHECKPOINT_VERSION,
            config: self.config.clone(),
            hidden: self.hidden.clone(),
            output: self.output.clone(),
        };
        Self::write_snapshot(&snapshot, path)
    }

    fn load_checkpoint<P: AsRef<Path>>(path: P) -> Result<Self, CheckpointError> {
        let snapshot: DenseSnapshot = Self::read_snapshot(path)?;
        check_version(CHECKPOINT_VERSION, snapshot.version)?;

        let mut model = DenseClassifier::new(snapshot.config)
            .map_err(|err| CheckpointError::InvalidFormat(err.to_string()))?;
        let shapes_match = snapshot.hidden.len() == model.hidden.len()
            && snapshot
                .hidden
                .iter()
                .chain(std::iter::once(&snapshot.output))
                .zip(model.hidden.iter().chain(std::iter::once(&model.output)))
                .all(|(stored, fresh)| {
                    stored.weight.dim() == fresh.weight.dim() && stored.bias.dim() == fresh.bias.dim()
                });
        if !shapes_match {
            return Err(CheckpointError::InvalidFormat(
                "weight shapes do not match the stored architecture".into(),
            ));
        }

        model.hidden = snapshot.hidden;
        model.output = snapshot.output;
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neural::AdamOptimizer;
    use ndarray::{array, Array3};

    fn config(repeat: usize) -> DenseConfig {
        DenseConfig {
            dense_size: 8,
            dropout: 0.0,
            ..DenseConfig::new(3, 2, 2, repeat)
        }
    }

    fn separable() -> (Array3<f32>, Array2<f32>) {
        let inputs = Array3::from_shape_fn((8, 3, 2), |(b, t, c)| {
            let sign = if b % 2 == 0 { 1.0 } else { -1.0 };
            sign * (0.5 + 0.1 * t as f32) + 0.05 * c as f32
        });
        let targets = Array2::from_shape_fn((8, 2), |(b, c)| if b % 2 == c { 1.0 } else { 0.0 });
        (inputs, targets)
    }

    #[test]
    fn test_layer_count_follows_repeat() {
        let model = DenseClassifier::new(config(2)).unwrap();
        assert_eq!(model.hidden.len(), 3);
        assert_eq!(model.hidden[0].weight.dim(), (8, 6));
        assert_eq!(model.hidden[2].weight.dim(), (8, 8));

        let mut model = model;
        assert_eq!(model.parameters_mut().len(), 8);
    }

    #[test]
    fn test_fixed_length_is_enforced() {
        let model = DenseClassifier::new(config(0)).unwrap();
        let result = model.forward(Array2::zeros((4, 2)).view());
        assert_eq!(
            result,
            Err(ModelError::SequenceLengthMismatch {
                expected: 3,
                got: 4
            })
        );
        let probs = model.forward(array![[0.1, 0.2], [0.3, 0.4], [0.5, 0.6]].view()).unwrap();
        assert!((probs.sum() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_gradients_cover_every_parameter() {
        let mut model = DenseClassifier::new(config(1)).unwrap();
        let (inputs, targets) = separable();
        let (loss, grads) = model.compute_loss(inputs.view(), targets.view(), true).unwrap();
        assert!(loss.is_finite() && loss > 0.0);

        let names: Vec<String> = model.parameters_mut().into_iter().map(|(n, _)| n).collect();
        assert_eq!(grads.len(), names.len());
        for name in names {
            assert!(grads.get(&name).is_some(), "missing gradient for {name}");
        }
        assert!(grads.global_norm().is_finite());
    }

    #[test]
    fn test_training_reduces_loss() {
        let mut model = DenseClassifier::new(config(1)).unwrap();
        let mut optimizer = AdamOptimizer::new(1e-2);
        let (inputs, targets) = separable();

        let (initial, _) = model.compute_loss(inputs.view(), targets.view(), false).unwrap();
        for _ in 0..50 {
            let (_, grads) = model.compute_loss(inputs.view(), targets.view(), true).unwrap();
            optimizer.step(&mut model, &grads);
        }
        let (trained, _) = model.compute_loss(inputs.view(), targets.view(), false).unwrap();
        assert!(trained < initial, "loss went from {initial} to {trained}");

        for (geometry, target) in inputs.outer_iter().zip(targets.outer_iter()) {
            let expected = if target[0] > 0.5 { 0 } else { 1 };
            assert_eq!(model.predict(geometry).unwrap(), expected);
        }
    }

    #[test]
    fn test_checkpoint_rejects_newer_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dense.bin");
        let model = DenseClassifier::new(config(0)).unwrap();
        let snapshot = DenseSnapshot {
            version: CHECKPOINT_VERSION + 1,
            config: model.config.clone(),
            hidden: model.hidden.clone(),
            output: model.output.clone(),
        };
        DenseClassifier::write_snapshot(&snapshot, &path).unwrap();

        assert!(matches!(
            DenseClassifier::load_checkpoint(&path),
            Err(CheckpointError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn test_checkpoint_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dense.bin");
        let model = DenseClassifier::new(config(1)).unwrap();
        model.save_checkpoint(&path).unwrap();

        let restored = DenseClassifier::load_checkpoint(&path).unwrap();
        let geometry = array![[0.1, -0.2], [0.3, 0.4], [-0.5, 0.6]];
        assert_eq!(
            restored.forward(geometry.view()).unwrap(),
            model.forward(geometry.view()).unwrap()
        );
    }
}
