//! Estimate the type of an archaeological feature from its geometry alone.
//!
//! The dataset is published at http://hdl.handle.net/10411/GYPPBR and is
//! downloaded on first use.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use topoml_core::{
    apply_scale, ensure_local, evaluate, load_geometry_dataset, resolve_scale, train_bucketed,
    AdamOptimizer, BucketBuilder, Checkpointable, ClassifierConfig, ConvClassifier,
    EarlyStopping, GeometryDataset, HyperParameters, RunSettings, TrainOptions, TrainingLogger,
};
use topoml_experiments::{
    hostname, init_tracing, notifier_from, notify_best_effort, run_signature, Cli, RunMode,
    RunSummary,
};

const SCRIPT_NAME: &str = "archaeology_convnet";
const DATA_FOLDER: &str = "../files/archaeology/";
const TRAIN_DATA_FILE: &str = "archaeology_train_v7.npz";
const TEST_DATA_FILE: &str = "archaeology_test_v7.npz";
const TRAIN_DATA_URL: &str = "https://dataverse.nl/api/access/datafile/11377";
const TEST_DATA_URL: &str = "https://dataverse.nl/api/access/datafile/11376";
const LABEL_FIELD: &str = "feature_type";

fn load(folder: &Path, file: &str, url: &str) -> Result<GeometryDataset> {
    let path = folder.join(file);
    ensure_local(&path, url).with_context(|| format!("retrieving {file}"))?;
    load_geometry_dataset(&path, LABEL_FIELD).with_context(|| format!("loading {}", path.display()))
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let start = Instant::now();

    let hp = HyperParameters::from_env(HyperParameters::archaeology_defaults())
        .context("reading hyper-parameters")?;
    let settings = RunSettings::from_env(DATA_FOLDER);
    let signature = run_signature(SCRIPT_NAME, env!("CARGO_PKG_VERSION"));

    let train = load(&settings.data_folder, TRAIN_DATA_FILE, TRAIN_DATA_URL)?;
    let (train, test) = match cli.mode() {
        RunMode::FinalTest => {
            info!("Training in final test mode");
            let test = load(&settings.data_folder, TEST_DATA_FILE, TEST_DATA_URL)?;
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

    let buckets = BucketBuilder::new(hp.batch_size)?.build(&train)?;
    for stats in buckets.stats() {
        info!(?stats, "bucket");
    }

    let channels = train.geoms.first().map_or(0, |g| g.channels());
    let mut config = ClassifierConfig::new(channels, buckets.num_classes());
    config.dense_size = hp.dense_size;
    config.dropout = hp.dropout;
    config.seed = hp.seed;
    let mut model = ConvClassifier::new(config)?;
    let mut optimizer = AdamOptimizer::new(hp.learning_rate);

    let mut options = TrainOptions::new(hp.epochs, hp.batch_size);
    options.validation_split = hp.train_validate_split;
    options.seed = hp.seed;
    options.early_stopping = hp.early_stopping.then(|| EarlyStopping::new(hp.patience));

    let logger = TrainingLogger::create(&settings.log_dir, &signature)
        .with_context(|| format!("creating training log in {}", settings.log_dir.display()))?;
    let result = train_bucketed(&mut model, &mut optimizer, &buckets, &options, &logger)?;

    info!("Run on test data...");
    let accuracy = evaluate(&model, &test)?;

    if let Some(path) = &settings.checkpoint_path {
        model
            .save_checkpoint(path)
            .with_context(|| format!("saving model to {}", path.display()))?;
        info!(path = %path.display(), "model saved");
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
