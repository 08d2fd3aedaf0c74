//! Linear SVM baseline for building types on standardised Fourier descriptors.

use anyhow::{Context, Result};
use tracing::info;

use topoml_core::{
    accuracy, grid_search, load_descriptor_dataset, load_descriptor_datasets,
    stratified_shuffle_split, DescriptorDataset, LinearSvm, RunSettings, StandardScaler,
};
use topoml_experiments::{init_tracing, notifier_from, notify_best_effort};

const SCRIPT_NAME: &str = "building_type_svm_linear";
const DATA_FOLDER: &str = "../files/buildings/";
const FILENAME_PREFIX: &str = "buildings-train";
const TEST_DATA_FILE: &str = "buildings-test.npz";
const LABEL_FIELD: &str = "building_type";
const C_RANGE: [f64; 5] = [1e-3, 1e-2, 1e-1, 1e0, 1e1];
const SVM_EPOCHS: usize = 20;
const SEED: u64 = 42;

fn main() -> Result<()> {
    init_tracing();
    let settings = RunSettings::from_env(DATA_FOLDER);

    let train = load_descriptor_datasets(&settings.data_folder, FILENAME_PREFIX, LABEL_FIELD)
        .with_context(|| format!("loading training data from {}", settings.data_folder.display()))?;
    let scaler = StandardScaler::fit(&train.features)?;
    let train = DescriptorDataset::new(scaler.transform(&train.features)?, train.labels)?;

    info!("Performing grid search on model...");
    let splits = stratified_shuffle_split(&train.labels, 5, 0.2, SEED)?;
    let search = grid_search(&C_RANGE, &splits, |&c, fit, score| {
        let fitted = train.select(fit);
        let held_out = train.select(score);
        let svm = LinearSvm::fit(c, SVM_EPOCHS, SEED, &fitted.features, &fitted.labels)?;
        Ok(accuracy(&held_out.labels, &svm.predict(&held_out.features)?)?)
    })?;
    info!(
        "The best parameters are C={} with a score of {:.2}",
        search.best_params, search.best_score
    );

    let svm = LinearSvm::fit(search.best_params, SVM_EPOCHS, SEED, &train.features, &train.labels)?;

    info!("Run on test data...");
    let path = settings.data_folder.join(TEST_DATA_FILE);
    let test = load_descriptor_dataset(&path, LABEL_FIELD)
        .with_context(|| format!("loading {}", path.display()))?;
    let predictions = svm.predict(&scaler.transform(&test.features)?)?;
    let test_accuracy = accuracy(&test.labels, &predictions)?;
    info!("Test accuracy: {:.2}", test_accuracy);

    let message = format!("test accuracy of {} with C: {} ", test_accuracy, svm.c());
    let notifier = notifier_from(settings.slack_webhook_url.as_deref());
    notify_best_effort(notifier.as_ref(), SCRIPT_NAME, SCRIPT_NAME, &message);
    Ok(())
}
