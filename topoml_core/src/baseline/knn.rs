//! k-nearest-neighbours classification.

use ndarray::{Array2, ArrayView1};
use rayon::prelude::*;

use crate::error::ModelError;

/// Euclidean k-NN with majority vote; ties go to the smallest label.
#[derive(Debug, Clone)]
pub struct KnnClassifier {
    k: usize,
    features: Array2<f64>,
    labels: Vec<usize>,
}

impl KnnClassifier {
    /// Memorise the training set.
    pub fn fit(k: usize, features: Array2<f64>, labels: Vec<usize>) -> Result<Self, ModelError> {
        if k == 0 {
            return Err(ModelError::InvalidConfiguration("k must be at least 1".into()));
        }
        if features.nrows() != labels.len() {
            return Err(ModelError::BatchMismatch {
                inputs: features.nrows(),
                targets: labels.len(),
            });
        }
        if labels.is_empty() {
            return Err(ModelError::EmptyBatch);
        }
        Ok(Self {
            k,
            features,
            labels,
        })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    fn predict_one(&self, query: ArrayView1<f64>) -> usize {
        let mut distances: Vec<(f64, usize)> = self
            .features
            .outer_iter()
            .zip(&self.labels)
            .map(|(row, &label)| {
                let d: f64 = row
                    .iter()
                    .zip(query.iter())
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum();
                (d, label)
            })
            .collect();

        let k = self.k.min(distances.len());
        distances.select_nth_unstable_by(k - 1, |a, b| a.0.total_cmp(&b.0));

        let classes = self.labels.iter().max().map_or(0, |m| m + 1);
        let mut votes = vec![0usize; classes];
        for &(_, label) in &distances[..k] {
            votes[label] += 1;
        }
        // first maximum is the smallest label
        votes
            .iter()
            .enumerate()
            .fold((0, 0), |(best, count), (label, &v)| {
                if v > count {
                    (label, v)
                } else {
                    (best, count)
                }
            })
            .0
    }

    /// Predicted label per row of `features`, computed in parallel.
    pub fn predict(&self, features: &Array2<f64>) -> Result<Vec<usize>, ModelError> {
        if features.ncols() != self.features.ncols() {
            return Err(ModelError::ChannelMismatch {
                expected: self.features.ncols(),
                got: features.ncols(),
            });
        }
        Ok((0..features.nrows())
            .into_par_iter()
            .map(|i| self.predict_one(features.row(i)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn clusters() -> (Array2<f64>, Vec<usize>) {
        let features = array![
            [0.0, 0.0],
            [0.1, 0.2],
            [-0.1, 0.1],
            [5.0, 5.0],
            [5.2, 4.9],
            [4.8, 5.1],
            [0.0, 9.0],
            [0.2, 9.1],
        ];
        (features, vec![0, 0, 0, 1, 1, 1, 2, 2])
    }

    #[test]
    fn test_separable_clusters() {
        let (features, labels) = clusters();
        let knn = KnnClassifier::fit(3, features, labels).unwrap();
        let predicted = knn
            .predict(&array![[0.05, 0.05], [5.1, 5.0], [0.1, 8.8]])
            .unwrap();
        assert_eq!(predicted, vec![0, 1, 2]);
    }

    #[test]
    fn test_tie_goes_to_smallest_label() {
        let features = array![[1.0], [-1.0]];
        let knn = KnnClassifier::fit(2, features, vec![3, 1]).unwrap();
        assert_eq!(knn.predict(&array![[0.0]]).unwrap(), vec![1]);
    }

    #[test]
    fn test_k_larger_than_training_set() {
        let (features, labels) = clusters();
        let knn = KnnClassifier::fit(50, features, labels).unwrap();
        // every point votes: class 0 and 1 tie at 3, smallest wins
        assert_eq!(knn.predict(&array![[5.0, 5.0]]).unwrap(), vec![0]);
    }

    #[test]
    fn test_invalid_fit() {
        let (features, labels) = clusters();
        assert!(KnnClassifier::fit(0, features.clone(), labels.clone()).is_err());
        assert!(KnnClassifier::fit(1, features, labels[..3].to_vec()).is_err());
    }
}
