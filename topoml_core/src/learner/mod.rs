//! Learner module: classifiers, the training driver and evaluation.
//!
//! - [`ConvClassifier`] for variable-length geometries (bucketed training)
//! - [`DenseClassifier`] for fixed-length geometries
//! - [`train_bucketed`] / [`train_dense`] drive mini-batch Adam
//! - [`evaluate`] scores a classifier on held-out data

pub mod classifier;
pub mod dense;
pub mod evaluation;
pub mod training;

pub use classifier::{ClassifierConfig, ConvClassifier, SequenceClassifier};
pub use dense::{DenseClassifier, DenseConfig};
pub use evaluation::{accuracy, evaluate, predict_classes};
pub use training::{
    train_bucketed, train_dense, EarlyStopping, EpochMetrics, TrainOptions, TrainingResult,
};
