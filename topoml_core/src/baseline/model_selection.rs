//! Stratified splitting and grid selection.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use tracing::info;

use crate::error::{ModelError, Result};

/// `(train_indices, test_indices)`, both sorted.
pub type Split = (Vec<usize>, Vec<usize>);

fn indices_by_class(labels: &[usize]) -> BTreeMap<usize, Vec<usize>> {
    let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (index, &label) in labels.iter().enumerate() {
        by_class.entry(label).or_default().push(index);
    }
    by_class
}

/// `n_splits` random train/test splits that keep class proportions.
///
/// Every class contributes `round(count * test_size)` entries to the test
/// side, but always keeps at least one on the training side.
pub fn stratified_shuffle_split(
    labels: &[usize],
    n_splits: usize,
    test_size: f64,
    seed: u64,
) -> std::result::Result<Vec<Split>, ModelError> {
    if n_splits == 0 || !(test_size > 0.0 && test_size < 1.0) {
        return Err(ModelError::InvalidConfiguration(format!(
            "need at least one split and a test size in (0, 1), got {n_splits} and {test_size}"
        )));
    }
    if labels.is_empty() {
        return Err(ModelError::EmptyBatch);
    }

    let by_class = indices_by_class(labels);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut splits = Vec::with_capacity(n_splits);

    for _ in 0..n_splits {
        let mut train = Vec::with_capacity(labels.len());
        let mut test = Vec::new();
        for members in by_class.values() {
            let mut members = members.clone();
            members.shuffle(&mut rng);
            let n_test = ((members.len() as f64 * test_size).round() as usize)
                .min(members.len().saturating_sub(1));
            test.extend_from_slice(&members[..n_test]);
            train.extend_from_slice(&members[n_test..]);
        }
        train.sort_unstable();
        test.sort_unstable();
        splits.push((train, test));
    }
    Ok(splits)
}

/// `k` folds; members of every class are dealt round-robin over the folds.
pub fn stratified_k_fold(labels: &[usize], k: usize) -> std::result::Result<Vec<Split>, ModelError> {
    if k < 2 || k > labels.len() {
        return Err(ModelError::InvalidConfiguration(format!(
            "fold count {k} must lie in [2, {}]",
            labels.len()
        )));
    }

    let mut fold_of = vec![0usize; labels.len()];
    let mut offset = 0;
    for members in indices_by_class(labels).values() {
        for (position, &index) in members.iter().enumerate() {
            fold_of[index] = (offset + position) % k;
        }
        offset += members.len();
    }

    Ok((0..k)
        .map(|fold| {
            let (test, train): (Vec<usize>, Vec<usize>) =
                (0..labels.len()).partition(|&i| fold_of[i] == fold);
            (train, test)
        })
        .collect())
}

/// Score of `fit_and_score` on every split, evaluated in parallel.
pub fn cross_val_scores<F>(splits: &[Split], fit_and_score: F) -> Result<Vec<f64>>
where
    F: Fn(&[usize], &[usize]) -> Result<f64> + Sync,
{
    splits
        .par_iter()
        .map(|(train, test)| fit_and_score(train, test))
        .collect()
}

#[derive(Debug, Clone)]
pub struct GridSearchResult<P> {
    pub best_params: P,
    pub best_index: usize,
    pub best_score: f64,
    /// Mean score per candidate, in candidate order
    pub mean_scores: Vec<f64>,
}

/// Mean score of every candidate over `splits`; the highest mean wins,
/// the earliest candidate on ties.
pub fn grid_search<P, F>(candidates: &[P], splits: &[Split], fit_and_score: F) -> Result<GridSearchResult<P>>
where
    P: Clone + Sync,
    F: Fn(&P, &[usize], &[usize]) -> Result<f64> + Sync,
{
    if candidates.is_empty() || splits.is_empty() {
        return Err(ModelError::InvalidConfiguration(
            "grid search needs candidates and splits".into(),
        )
        .into());
    }
    info!(
        candidates = candidates.len(),
        splits = splits.len(),
        threads = rayon::current_num_threads(),
        "performing grid search"
    );

    let jobs: Vec<(usize, usize)> = (0..candidates.len())
        .flat_map(|c| (0..splits.len()).map(move |s| (c, s)))
        .collect();
    let scores: Vec<f64> = jobs
        .par_iter()
        .map(|&(c, s)| {
            let (train, test) = &splits[s];
            fit_and_score(&candidates[c], train, test)
        })
        .collect::<Result<_>>()?;

    let mean_scores: Vec<f64> = scores
        .chunks(splits.len())
        .map(|chunk| chunk.iter().sum::<f64>() / chunk.len() as f64)
        .collect();

    let (best_index, best_score) = mean_scores.iter().enumerate().fold(
        (0, f64::NEG_INFINITY),
        |(best, best_score), (index, &score)| {
            if score > best_score {
                (index, score)
            } else {
                (best, best_score)
            }
        },
    );

    Ok(GridSearchResult {
        best_params: candidates[best_index].clone(),
        best_index,
        best_score,
        mean_scores,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<usize> {
        // 20 of class 0, 10 of class 1, 5 of class 2
        std::iter::repeat(0)
            .take(20)
            .chain(std::iter::repeat(1).take(10))
            .chain(std::iter::repeat(2).take(5))
            .collect()
    }

    fn class_count(labels: &[usize], indices: &[usize], class: usize) -> usize {
        indices.iter().filter(|&&i| labels[i] == class).count()
    }

    #[test]
    fn test_shuffle_split_preserves_proportions() {
        let labels = labels();
        let splits = stratified_shuffle_split(&labels, 5, 0.2, 42).unwrap();
        assert_eq!(splits.len(), 5);
        for (train, test) in &splits {
            assert_eq!(train.len() + test.len(), labels.len());
            assert_eq!(class_count(&labels, test, 0), 4);
            assert_eq!(class_count(&labels, test, 1), 2);
            assert_eq!(class_count(&labels, test, 2), 1);
            assert!(train.iter().all(|i| !test.contains(i)));
        }
        assert_ne!(splits[0].1, splits[1].1);
    }

    #[test]
    fn test_shuffle_split_is_seeded() {
        let labels = labels();
        assert_eq!(
            stratified_shuffle_split(&labels, 3, 0.2, 1).unwrap(),
            stratified_shuffle_split(&labels, 3, 0.2, 1).unwrap()
        );
        assert!(stratified_shuffle_split(&labels, 3, 1.0, 1).is_err());
    }

    #[test]
    fn test_k_fold_partitions_every_index_once() {
        let labels = labels();
        let folds = stratified_k_fold(&labels, 5).unwrap();
        let mut seen = vec![0; labels.len()];
        for (train, test) in &folds {
            assert_eq!(train.len() + test.len(), labels.len());
            assert_eq!(class_count(&labels, test, 0), 4);
            assert_eq!(class_count(&labels, test, 1), 2);
            assert_eq!(class_count(&labels, test, 2), 1);
            for &i in test {
                seen[i] += 1;
            }
        }
        assert!(seen.iter().all(|&count| count == 1));
        assert!(stratified_k_fold(&labels, 1).is_err());
    }

    #[test]
    fn test_grid_search_picks_highest_mean_first_on_ties() {
        let splits = stratified_k_fold(&labels(), 5).unwrap();
        let result = grid_search(&[1, 2, 3, 2], &splits, |&p, _, _| {
            Ok(if p == 1 { 0.5 } else { 1.0 - 0.1 * (p % 2) as f64 })
        })
        .unwrap();
        assert_eq!(result.best_index, 1);
        assert_eq!(result.best_params, 2);
        assert_eq!(result.best_score, 1.0);
        assert_eq!(result.mean_scores.len(), 4);
    }

    #[test]
    fn test_grid_search_propagates_errors() {
        let splits = stratified_k_fold(&labels(), 2).unwrap();
        let result = grid_search(&[1, 2], &splits, |&p, _, _| {
            if p == 2 {
                Err(ModelError::EmptyBatch.into())
            } else {
                Ok(1.0)
            }
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_cross_val_scores_in_split_order() {
        let splits = stratified_k_fold(&labels(), 5).unwrap();
        let scores = cross_val_scores(&splits, |_, test| Ok(test.len() as f64)).unwrap();
        assert_eq!(scores, vec![7.0; 5]);
    }
}
