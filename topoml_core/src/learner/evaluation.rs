//! Scoring trained classifiers on held-out geometries.

use crate::data::{Geometry, GeometryDataset};
use crate::error::{EvaluationError, Result};
use crate::learner::classifier::SequenceClassifier;

/// Predicted class for every geometry; the first failure aborts.
pub fn predict_classes<C: SequenceClassifier + ?Sized>(
    classifier: &C,
    geometries: &[Geometry],
) -> Result<Vec<usize>> {
    let mut predictions = Vec::with_capacity(geometries.len());
    for geometry in geometries {
        predictions.push(classifier.predict(geometry.points())?);
    }
    Ok(predictions)
}

/// Fraction of positions where `predictions` matches `labels`.
pub fn accuracy(labels: &[usize], predictions: &[usize]) -> std::result::Result<f64, EvaluationError> {
    if labels.len() != predictions.len() {
        return Err(EvaluationError::LengthMismatch {
            labels: labels.len(),
            predictions: predictions.len(),
        });
    }
    if labels.is_empty() {
        return Err(EvaluationError::EmptySet);
    }
    let correct = labels
        .iter()
        .zip(predictions)
        .filter(|(label, prediction)| label == prediction)
        .count();
    Ok(correct as f64 / labels.len() as f64)
}

/// Accuracy of `classifier` on `dataset`.
pub fn evaluate<C: SequenceClassifier + ?Sized>(
    classifier: &C,
    dataset: &GeometryDataset,
) -> Result<f64> {
    let predictions = predict_classes(classifier, &dataset.geoms)?;
    Ok(accuracy(&dataset.labels, &predictions)?)
}
