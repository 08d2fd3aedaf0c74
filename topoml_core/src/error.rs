//! Error types shared across the crate.
//!
//! Each module owns a focused error enum; [`TopomlError`] aggregates them so
//! that pipeline code can use `?` across module boundaries.

use thiserror::Error;

use crate::checkpoint::CheckpointError;

/// Result type alias for topoml operations
pub type Result<T> = std::result::Result<T, TopomlError>;

/// Errors raised while deriving or applying a geometry scale factor.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScalerError {
    /// No geometry (or no geometry with at least one point) was supplied.
    #[error("cannot compute a scale factor from an empty geometry dataset")]
    EmptyDataset,

    /// The derived or configured scale is zero, negative or not finite.
    #[error("scale factor must be positive and finite, got {0}")]
    InvalidScale(f32),
}

/// Errors raised while partitioning geometries into length buckets.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BucketError {
    #[error("bucket capacity must be at least 1")]
    ZeroCapacity,

    #[error("label {label} is out of range for {num_classes} classes")]
    LabelOutOfRange { label: usize, num_classes: usize },

    #[error("cannot derive a class count from an empty label set")]
    NoLabels,

    #[error("geometry has {got} channels, bucket {key} expects {expected}")]
    ChannelMismatch {
        key: usize,
        expected: usize,
        got: usize,
    },

    #[error("{geometries} geometries paired with {labels} labels")]
    LengthMismatch { geometries: usize, labels: usize },
}

/// Errors raised while loading, fetching or splitting datasets.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read npz archive {path}: {message}")]
    Npz { path: String, message: String },

    #[error("array '{name}' not found in {path}")]
    MissingArray { name: String, path: String },

    #[error("array '{name}' has invalid contents: {reason}")]
    InvalidArray { name: String, reason: String },

    #[error("{geometries} geometries paired with {labels} labels")]
    LengthMismatch { geometries: usize, labels: usize },

    #[error("no files starting with '{prefix}' found in {folder}")]
    NoMatchingFiles { folder: String, prefix: String },

    #[error("test fraction must lie in (0, 1), got {0}")]
    InvalidSplit(f32),

    #[error("failed to download {url}: {message}")]
    Download { url: String, message: String },
}

/// Errors raised by classifiers and optimizers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("input has {got} channels, model expects {expected}")]
    ChannelMismatch { expected: usize, got: usize },

    #[error("input has {got} points, model expects {expected}")]
    SequenceLengthMismatch { expected: usize, got: usize },

    #[error("target has {got} classes, model predicts {expected}")]
    ClassCountMismatch { expected: usize, got: usize },

    #[error("mixture parameters have {got} columns, expected {expected}")]
    ParameterWidthMismatch { expected: usize, got: usize },

    #[error("batch is empty")]
    EmptyBatch,

    #[error("{inputs} inputs paired with {targets} targets")]
    BatchMismatch { inputs: usize, targets: usize },

    #[error("invalid model configuration: {0}")]
    InvalidConfiguration(String),
}

/// Errors raised while scoring predictions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("cannot compute accuracy over an empty set")]
    EmptySet,

    #[error("{labels} labels paired with {predictions} predictions")]
    LengthMismatch { labels: usize, predictions: usize },
}

/// Errors raised while reading hyper-parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{key}={value} is not a valid {expected}")]
    Parse {
        key: String,
        value: String,
        expected: &'static str,
    },

    #[error("{key} is out of range: {reason}")]
    OutOfRange { key: String, reason: String },
}

/// Umbrella error for pipeline code.
#[derive(Debug, Error)]
pub enum TopomlError {
    #[error(transparent)]
    Scaler(#[from] ScalerError),

    #[error(transparent)]
    Bucket(#[from] BucketError),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("failed to write training log: {0}")]
    Log(#[from] std::io::Error),
}
