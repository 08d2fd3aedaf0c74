//! # topoml core
//!
//! Geometry-based classification: vectorized 2-D shapes (coordinates plus
//! auxiliary flags per point) are scaled, grouped into length buckets and fed
//! to small hand-written classifiers trained with Adam. Classical baselines on
//! Fourier descriptors live next to them.
//!
//! ## Quick Start
//!
//! ```rust
//! use ndarray::Array2;
//! use topoml_core::{
//!     apply_scale, compute_scale, evaluate, train_bucketed, AdamOptimizer, BucketBuilder,
//!     ClassifierConfig, ConvClassifier, Geometry, GeometryDataset, TrainOptions, TrainingLogger,
//! };
//!
//! let geoms: Vec<Geometry> = (0..8)
//!     .map(|i| Geometry::new(Array2::from_shape_fn((3 + i % 3, 3), |(r, c)| (r * (i + 1) + c) as f32)))
//!     .collect();
//! let labels = (0..8).map(|i| i % 2).collect();
//! let train = GeometryDataset::new(geoms, labels).unwrap();
//!
//! let scale = compute_scale(&train.geoms).unwrap();
//! let train = GeometryDataset::new(apply_scale(&train.geoms, scale), train.labels).unwrap();
//! let buckets = BucketBuilder::new(4).unwrap().build(&train).unwrap();
//!
//! let mut model = ConvClassifier::new(ClassifierConfig::new(3, 2)).unwrap();
//! let mut optimizer = AdamOptimizer::new(1e-3);
//! let options = TrainOptions::new(2, 4);
//! train_bucketed(&mut model, &mut optimizer, &buckets, &options, &TrainingLogger::disabled())
//!     .unwrap();
//! let accuracy = evaluate(&model, &train).unwrap();
//! assert!((0.0..=1.0).contains(&accuracy));
//! ```
//!
//! ## Core Modules
//!
//! - [`data`] - geometries, descriptor datasets, `.npz` loading and download
//! - [`scaler`] - training-derived coordinate scale
//! - [`bucket`] - length-bucketed batches and one-hot encoding
//! - [`neural`] - gradients, Adam, loss functions
//! - [`learner`] - classifiers, training driver, evaluation
//! - [`baseline`] - k-NN, linear SVM and model selection
//! - [`config`] - hyper-parameters from environment variables
//! - [`checkpoint`] - versioned model persistence
//! - [`logging`] - JSON line-delimited training log

pub mod baseline;
pub mod bucket;
pub mod checkpoint;
pub mod config;
pub mod data;
pub mod error;
pub mod learner;
pub mod logging;
pub mod neural;
pub mod scaler;

pub use baseline::{
    cross_val_scores, grid_search, stratified_k_fold, stratified_shuffle_split, GridSearchResult,
    KnnClassifier, LinearSvm, Split, StandardScaler,
};
pub use bucket::{argmax, num_classes, one_hot, Bucket, BucketBuilder, BucketStats, BucketedDataset};
pub use checkpoint::{CheckpointError, Checkpointable};
pub use config::{HyperParameters, RunSettings};
pub use data::{
    ensure_local, load_descriptor_dataset, load_descriptor_datasets, load_geometry_dataset,
    load_geometry_datasets, DescriptorDataset, Geometry, GeometryDataset, COORDINATE_CHANNELS,
};
pub use error::{
    BucketError, ConfigError, DatasetError, EvaluationError, ModelError, Result, ScalerError,
    TopomlError,
};
pub use learner::{
    accuracy, evaluate, predict_classes, train_bucketed, train_dense, ClassifierConfig,
    ConvClassifier, DenseClassifier, DenseConfig, EarlyStopping, EpochMetrics,
    SequenceClassifier, TrainOptions, TrainingResult,
};
pub use logging::{TrainingLogEntry, TrainingLogger};
pub use neural::{AdamOptimizer, GaussianMixtureLoss, Gradients, Parameterized};
pub use scaler::{apply_scale, compute_scale, resolve_scale, ScaleFactor};
