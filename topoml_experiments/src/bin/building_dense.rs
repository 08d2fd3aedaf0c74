//! Estimate the building type from the building footprint alone.
//!
//! Training archives `buildings_order_30_train*.npz` are produced by the
//! preprocessing scripts and read from `DATA_FOLDER`.

use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use ndarray::{Array2, Axis};
use tracing::info;

use topoml_core::{
    apply_scale, evaluate, load_geometry_dataset, load_geometry_datasets, num_classes, one_hot,
    resolve_scale, train_dense, AdamOptimizer, Checkpointable, DenseClassifier, DenseConfig,
    EarlyStopping, GeometryDataset, HyperParameters, RunSettings, TrainOptions, TrainingLogger,
};
use topoml_experiments::{
    hostname, init_tracing, notifier_from, notify_best_effort, run_signature, Cli, RunMode,
    RunSummary,
};

const SCRIPT_NAME: &str = "building_dense";
const DATA_FOLDER: &str = "../files/buildings/";
const FILENAME_PREFIX: &str = "buildings_order_30_train";
const TEST_DATA_FILE: &str = "buildings_order_30_test.npz";
const LABEL_FIELD: &str = "building_type";
const CLIP_NORM: f32 = 1.0;

fn targets(labels: &[usize], classes: usize) -> Result<Array2<f32>> {
    let mut block = Array2::zeros((labels.len(), classes));
    for (mut row, &label) in block.axis_iter_mut(Axis(0)).zip(labels) {
        row.assign(&one_hot(label, classes)?);
    }
    Ok(block)
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let start = Instant::now();

    let hp = HyperParameters::from_env(HyperParameters::building_defaults())
        .context("reading hyper-parameters")?;
    let settings = RunSettings::from_env(DATA_FOLDER);
    let signature = run_signature(SCRIPT_NAME, env!("CARGO_PKG_VERSION"));

    let train = load_geometry_datasets(&settings.data_folder, FILENAME_PREFIX, LABEL_FIELD)
        .with_context(|| format!("loading training data from {}", settings.data_folder.display()))?;
    let (train, test) = match cli.mode() {
        RunMode::FinalTest => {
            info!("Training in final test mode");
            let path = settings.data_folder.join(TEST_DATA_FILE);
            let test = load_geometry_dataset(&path, LABEL_FIELD)
                .with_context(|| format!("loading {}", path.display()))?;
            (train, test)
        }
        RunMode::Standard => {
            info!("Training in standard training mode");
            train.train_test_split(0.1, hp.seed)?
        }
    };

    let scale = resolve_scale(hp.geom_scale, &train.geoms)?;
    info!(scale = scale.value(), "geometry scale");
    let train = GeometryDataset::new(apply_scale(&train.geoms, scale), train.labels)?;
    let test = GeometryDataset::new(apply_scale(&test.geoms, scale), test.labels)?;

    // one fixed input length for both sets
    let points = train.max_len().max(test.max_len());
    let inputs = train.to_padded_array(points)?;
    let test = GeometryDataset::new(
        test.geoms.iter().map(|g| g.pad_back(points)).collect(),
        test.labels,
    )?;

    let classes = num_classes(&train.labels)?;
    let train_targets = targets(&train.labels, classes)?;
    let channels = inputs.len_of(Axis(2));
    info!(samples = train.len(), points, channels, classes, "training block");

    let mut config = DenseConfig::new(points, channels, classes, hp.repeat_deep_arch);
    config.dense_size = hp.dense_size;
    config.dropout = hp.dropout;
    config.seed = hp.seed;
    let mut model = DenseClassifier::new(config)?;
    let mut optimizer = AdamOptimizer::new(hp.learning_rate).with_clip_norm(CLIP_NORM);

    let mut options = TrainOptions::new(hp.epochs, hp.batch_size);
    options.validation_split = hp.train_validate_split;
    options.seed = hp.seed;
    options.early_stopping = hp.early_stopping.then(|| EarlyStopping::new(hp.patience));

    let logger = TrainingLogger::create(&settings.log_dir, &signature)
        .with_context(|| format!("creating training log in {}", settings.log_dir.display()))?;
    let result = train_dense(&mut model, &mut optimizer, &inputs, &train_targets, &options, &logger)?;
    if result.stopped_early {
        info!("Stopped early after {} epochs", result.epochs_run());
    }

    info!("Run on test data...");
    let accuracy = evaluate(&model, &test)?;

    if let Some(path) = &settings.checkpoint_path {
        model
            .save_checkpoint(path)
            .with_context(|| format!("saving model to {}", path.display()))?;
    }

    let summary = RunSummary {
        hostname: hostname(),
        accuracy,
        elapsed: start.elapsed(),
        epochs: result.epochs_run(),
        settings: hp
            .to_pairs()
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect(),
    };
    let notifier = notifier_from(settings.slack_webhook_url.as_deref());
    notify_best_effort(notifier.as_ref(), &signature, SCRIPT_NAME, &summary.message());
    Ok(())
}
