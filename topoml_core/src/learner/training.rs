//! Training driver
//!
//! Runs mini-batch Adam over either length buckets (variable-length
//! geometries) or a single fixed-length block. Optimizer state and model
//! parameters carry over from bucket to bucket and epoch to epoch.

use std::time::Instant;

use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::bucket::{argmax, BucketedDataset};
use crate::error::{ModelError, Result};
use crate::learner::classifier::SequenceClassifier;
use crate::logging::{TrainingLogEntry, TrainingLogger};
use crate::neural::AdamOptimizer;

/// Stop when the monitored loss has not improved by `min_delta` for `patience` epochs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EarlyStopping {
    pub patience: usize,
    pub min_delta: f32,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            min_delta: 0.001,
        }
    }
}

/// Training configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainOptions {
    pub epochs: usize,
    /// Entries per optimizer step
    pub batch_size: usize,
    /// Fraction of every fit held out (from the end) for validation
    pub validation_split: f64,
    /// Seed for shuffling
    pub seed: u64,
    pub early_stopping: Option<EarlyStopping>,
}

impl TrainOptions {
    pub fn new(epochs: usize, batch_size: usize) -> Self {
        Self {
            epochs,
            batch_size,
            validation_split: 0.1,
            seed: 42,
            early_stopping: None,
        }
    }

    fn validate(&self) -> std::result::Result<(), ModelError> {
        if self.epochs == 0 || self.batch_size == 0 {
            return Err(ModelError::InvalidConfiguration(
                "epochs and batch size must be positive".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.validation_split) {
            return Err(ModelError::InvalidConfiguration(format!(
                "validation split must lie in [0, 1), got {}",
                self.validation_split
            )));
        }
        Ok(())
    }

    /// Entries held out of `n`: everything past the first
    /// `floor(n * (1 - validation_split))`. At least one entry always stays
    /// for training.
    fn validation_count(&self, n: usize) -> usize {
        let kept = (n as f64 * (1.0 - self.validation_split)) as usize;
        (n - kept.min(n)).min(n.saturating_sub(1))
    }
}

/// Training metrics for a single epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub train_loss: f32,
    pub train_accuracy: f32,
    pub val_loss: Option<f32>,
    pub val_accuracy: Option<f32>,
    pub elapsed_ms: u128,
}

impl EpochMetrics {
    /// Loss watched by early stopping: validation loss when available.
    pub fn monitored_loss(&self) -> f32 {
        self.val_loss.unwrap_or(self.train_loss)
    }
}

/// Complete training result
#[derive(Debug, Clone, Serialize)]
pub struct TrainingResult {
    pub epoch_metrics: Vec<EpochMetrics>,
    pub stopped_early: bool,
    pub total_elapsed_ms: u128,
}

impl TrainingResult {
    /// Number of epochs actually run.
    pub fn epochs_run(&self) -> usize {
        self.epoch_metrics.len()
    }

    pub fn final_metrics(&self) -> Option<&EpochMetrics> {
        self.epoch_metrics.last()
    }
}

/// Metrics of one fit over a block of same-length entries.
#[derive(Debug, Clone, Default)]
struct FitMetrics {
    train_entries: usize,
    loss: f32,
    correct: usize,
    val_entries: usize,
    val_loss: f32,
    val_correct: usize,
}

fn count_correct<C: SequenceClassifier + ?Sized>(
    classifier: &C,
    inputs: ArrayView3<f32>,
    targets: ArrayView2<f32>,
) -> std::result::Result<usize, ModelError> {
    let mut correct = 0;
    for (geometry, target) in inputs.outer_iter().zip(targets.outer_iter()) {
        if classifier.predict(geometry)? == argmax(target.iter()) {
            correct += 1;
        }
    }
    Ok(correct)
}

/// Shuffled sub-batches over the training part, then metrics on both parts.
fn fit_block<C: SequenceClassifier + ?Sized>(
    classifier: &mut C,
    optimizer: &mut AdamOptimizer,
    inputs: &Array3<f32>,
    targets: &Array2<f32>,
    options: &TrainOptions,
    rng: &mut StdRng,
) -> std::result::Result<FitMetrics, ModelError> {
    let n = inputs.len_of(Axis(0));
    if n == 0 {
        return Err(ModelError::EmptyBatch);
    }
    let val_entries = options.validation_count(n);
    let train_entries = n - val_entries;

    let mut order: Vec<usize> = (0..train_entries).collect();
    order.shuffle(rng);

    let mut weighted_loss = 0.0;
    for chunk in order.chunks(options.batch_size) {
        let batch_inputs = inputs.select(Axis(0), chunk);
        let batch_targets = targets.select(Axis(0), chunk);
        let (loss, gradients) =
            classifier.compute_loss(batch_inputs.view(), batch_targets.view(), true)?;
        optimizer.step(&mut *classifier, &gradients);
        weighted_loss += loss * chunk.len() as f32;
    }

    let train_inputs = inputs.slice_axis(Axis(0), (..train_entries).into());
    let train_targets = targets.slice_axis(Axis(0), (..train_entries).into());
    let correct = count_correct(&*classifier, train_inputs, train_targets)?;

    let mut metrics = FitMetrics {
        train_entries,
        loss: weighted_loss / train_entries as f32,
        correct,
        val_entries,
        ..FitMetrics::default()
    };

    if val_entries > 0 {
        let val_inputs = inputs.slice_axis(Axis(0), (train_entries..).into());
        let val_targets = targets.slice_axis(Axis(0), (train_entries..).into());
        let (val_loss, _) = classifier.compute_loss(val_inputs, val_targets, false)?;
        metrics.val_loss = val_loss;
        metrics.val_correct = count_correct(&*classifier, val_inputs, val_targets)?;
    }
    Ok(metrics)
}

/// Running totals of fits within one epoch.
#[derive(Debug, Default)]
struct EpochTotals {
    train_entries: usize,
    loss: f32,
    correct: usize,
    val_entries: usize,
    val_loss: f32,
    val_correct: usize,
}

impl EpochTotals {
    fn add(&mut self, fit: &FitMetrics) {
        self.train_entries += fit.train_entries;
        self.loss += fit.loss * fit.train_entries as f32;
        self.correct += fit.correct;
        self.val_entries += fit.val_entries;
        self.val_loss += fit.val_loss * fit.val_entries as f32;
        self.val_correct += fit.val_correct;
    }

    fn finish(self, epoch: usize, started: Instant) -> EpochMetrics {
        let train = self.train_entries.max(1) as f32;
        let (val_loss, val_accuracy) = if self.val_entries > 0 {
            let val = self.val_entries as f32;
            (Some(self.val_loss / val), Some(self.val_correct as f32 / val))
        } else {
            (None, None)
        };
        EpochMetrics {
            epoch,
            train_loss: self.loss / train,
            train_accuracy: self.correct as f32 / train,
            val_loss,
            val_accuracy,
            elapsed_ms: started.elapsed().as_millis(),
        }
    }
}

fn log_fit(
    logger: &TrainingLogger,
    epoch: usize,
    options: &TrainOptions,
    bucket: Option<usize>,
    fit: &FitMetrics,
) -> Result<()> {
    let mut entry = TrainingLogEntry::new(
        epoch,
        options.epochs,
        bucket,
        fit.train_entries + fit.val_entries,
    );
    entry.loss = fit.loss;
    entry.accuracy = fit.correct as f32 / fit.train_entries.max(1) as f32;
    if fit.val_entries > 0 {
        entry.val_loss = Some(fit.val_loss);
        entry.val_accuracy = Some(fit.val_correct as f32 / fit.val_entries as f32);
    }
    logger.log(&entry)?;
    Ok(())
}

/// Tracks the monitored loss and decides when to stop.
struct StopMonitor {
    rule: Option<EarlyStopping>,
    best: f32,
    wait: usize,
}

impl StopMonitor {
    fn new(rule: Option<EarlyStopping>) -> Self {
        Self {
            rule,
            best: f32::INFINITY,
            wait: 0,
        }
    }

    fn should_stop(&mut self, loss: f32) -> bool {
        let Some(rule) = self.rule else {
            return false;
        };
        if loss < self.best - rule.min_delta {
            self.best = loss;
            self.wait = 0;
            false
        } else {
            self.wait += 1;
            self.wait >= rule.patience
        }
    }
}

/// Train on every bucket in ascending length order, `options.epochs` times.
pub fn train_bucketed<C: SequenceClassifier + ?Sized>(
    classifier: &mut C,
    optimizer: &mut AdamOptimizer,
    buckets: &BucketedDataset,
    options: &TrainOptions,
    logger: &TrainingLogger,
) -> Result<TrainingResult> {
    options.validate()?;
    if buckets.is_empty() {
        return Err(ModelError::EmptyBatch.into());
    }
    if buckets.num_classes() != classifier.num_classes() {
        return Err(ModelError::ClassCountMismatch {
            expected: classifier.num_classes(),
            got: buckets.num_classes(),
        }
        .into());
    }

    let blocks: Vec<(usize, Array3<f32>, Array2<f32>)> = buckets
        .iter()
        .map(|bucket| (bucket.key(), bucket.inputs_array(), bucket.targets_array()))
        .collect();

    let start = Instant::now();
    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut monitor = StopMonitor::new(options.early_stopping);
    let mut epoch_metrics = Vec::with_capacity(options.epochs);
    let mut stopped_early = false;

    for epoch in 1..=options.epochs {
        let epoch_start = Instant::now();
        let mut totals = EpochTotals::default();

        for (key, inputs, targets) in &blocks {
            info!(
                "Epoch {}/{}, bucket length {}, {} entries",
                epoch,
                options.epochs,
                key,
                inputs.len_of(Axis(0))
            );
            let fit = fit_block(classifier, optimizer, inputs, targets, options, &mut rng)?;
            log_fit(logger, epoch, options, Some(*key), &fit)?;
            totals.add(&fit);
        }

        let metrics = totals.finish(epoch, epoch_start);
        debug!(
            epoch,
            loss = metrics.train_loss,
            accuracy = metrics.train_accuracy,
            "epoch complete"
        );
        let stop = monitor.should_stop(metrics.monitored_loss());
        epoch_metrics.push(metrics);
        if stop {
            info!("Early stopping after epoch {}", epoch);
            stopped_early = true;
            break;
        }
    }

    Ok(TrainingResult {
        epoch_metrics,
        stopped_early,
        total_elapsed_ms: start.elapsed().as_millis(),
    })
}

/// Train on one fixed-length block `[n, points, channels]` with `[n, classes]` targets.
pub fn train_dense<C: SequenceClassifier + ?Sized>(
    classifier: &mut C,
    optimizer: &mut AdamOptimizer,
    inputs: &Array3<f32>,
    targets: &Array2<f32>,
    options: &TrainOptions,
    logger: &TrainingLogger,
) -> Result<TrainingResult> {
    options.validate()?;
    if inputs.len_of(Axis(0)) != targets.nrows() {
        return Err(ModelError::BatchMismatch {
            inputs: inputs.len_of(Axis(0)),
            targets: targets.nrows(),
        }
        .into());
    }

    let start = Instant::now();
    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut monitor = StopMonitor::new(options.early_stopping);
    let mut epoch_metrics = Vec::with_capacity(options.epochs);
    let mut stopped_early = false;

    for epoch in 1..=options.epochs {
        let epoch_start = Instant::now();
        let fit = fit_block(classifier, optimizer, inputs, targets, options, &mut rng)?;
        log_fit(logger, epoch, options, None, &fit)?;

        let mut totals = EpochTotals::default();
        totals.add(&fit);
        let metrics = totals.finish(epoch, epoch_start);
        info!(
            "Epoch {}/{}: loss {:.4}, accuracy {:.4}, val_loss {:?}",
            epoch, options.epochs, metrics.train_loss, metrics.train_accuracy, metrics.val_loss
        );

        let stop = monitor.should_stop(metrics.monitored_loss());
        epoch_metrics.push(metrics);
        if stop {
            info!("Early stopping after epoch {}", epoch);
            stopped_early = true;
            break;
        }
    }

    Ok(TrainingResult {
        epoch_metrics,
        stopped_early,
        total_elapsed_ms: start.elapsed().as_millis(),
    })
}
