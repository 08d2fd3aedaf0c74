//! k-nearest-neighbours baseline for archaeological feature types, trained on
//! standardised Fourier descriptors.

use std::time::Instant;

use anyhow::{Context, Result};
use tracing::info;

use topoml_core::{
    accuracy, cross_val_scores, grid_search, load_descriptor_dataset, stratified_k_fold,
    stratified_shuffle_split, DescriptorDataset, KnnClassifier, RunSettings, StandardScaler,
};
use topoml_experiments::{format_duration, init_tracing, notifier_from, notify_best_effort};

const SCRIPT_NAME: &str = "archaeo_feature_type_knn";
const DATA_FOLDER: &str = "../files/archaeology/";
const TRAIN_DATA_FILE: &str = "archaeo_features_train.npz";
const TEST_DATA_FILE: &str = "archaeo_features_test.npz";
const LABEL_FIELD: &str = "feature_type";
const SEARCH_SPLITS: usize = 5;
const SEARCH_TEST_SIZE: f64 = 0.2;
const SEARCH_SEED: u64 = 42;
const CV_FOLDS: usize = 10;

/// Accuracy of a `k`-NN fitted on the `train` rows and scored on the `test` rows.
fn fit_and_score(
    k: usize,
    data: &DescriptorDataset,
    train: &[usize],
    test: &[usize],
) -> topoml_core::Result<f64> {
    let fitted = data.select(train);
    let held_out = data.select(test);
    let clf = KnnClassifier::fit(k, fitted.features, fitted.labels)?;
    let predictions = clf.predict(&held_out.features)?;
    Ok(accuracy(&held_out.labels, &predictions)?)
}

fn main() -> Result<()> {
    init_tracing();
    let start = Instant::now();
    let settings = RunSettings::from_env(DATA_FOLDER);

    let path = settings.data_folder.join(TRAIN_DATA_FILE);
    let train = load_descriptor_dataset(&path, LABEL_FIELD)
        .with_context(|| format!("loading {}", path.display()))?;
    let scaler = StandardScaler::fit(&train.features)?;
    let train = DescriptorDataset::new(scaler.transform(&train.features)?, train.labels)?;

    info!("Performing grid search on model...");
    let candidates: Vec<usize> = (1..=16).collect();
    let splits =
        stratified_shuffle_split(&train.labels, SEARCH_SPLITS, SEARCH_TEST_SIZE, SEARCH_SEED)?;
    let search = grid_search(&candidates, &splits, |&k, fit, score| {
        fit_and_score(k, &train, fit, score)
    })?;
    info!(
        "The best parameters are k={} with a score of {:.3}",
        search.best_params, search.best_score
    );

    info!("Training model on best parameters...");
    let k = search.best_params;
    let folds = stratified_k_fold(&train.labels, CV_FOLDS)?;
    let scores = cross_val_scores(&folds, |fit, score| fit_and_score(k, &train, fit, score))?;
    info!("Cross-validation scores: {:?}", scores);
    let clf = KnnClassifier::fit(k, train.features, train.labels)?;

    let path = settings.data_folder.join(TEST_DATA_FILE);
    let test = load_descriptor_dataset(&path, LABEL_FIELD)
        .with_context(|| format!("loading {}", path.display()))?;
    let test_features = scaler.transform(&test.features)?;

    info!("Run on test data...");
    let predictions = clf.predict(&test_features)?;
    let test_accuracy = accuracy(&test.labels, &predictions)?;
    info!("Test accuracy: {:.3}", test_accuracy);

    let message = format!(
        "test accuracy of {} in {}",
        test_accuracy,
        format_duration(start.elapsed())
    );
    let notifier = notifier_from(settings.slack_webhook_url.as_deref());
    notify_best_effort(notifier.as_ref(), SCRIPT_NAME, SCRIPT_NAME, &message);
    Ok(())
}
