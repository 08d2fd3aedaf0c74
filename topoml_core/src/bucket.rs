//! Length-bucketed batching.
//!
//! Variable-length geometries are grouped into buckets keyed by sequence
//! length so that each training batch shares one length without padding the
//! whole corpus to the longest geometry. Pairs are visited longest first; a
//! shorter geometry is front-padded into the current (smallest) bucket while
//! that bucket is below capacity, otherwise it opens a new bucket.

use std::collections::BTreeMap;

use ndarray::{Array1, Array2, Array3, Axis};
use serde::Serialize;

use crate::data::{Geometry, GeometryDataset};
use crate::error::BucketError;

/// One-hot encode `label` over `num_classes` classes.
pub fn one_hot(label: usize, num_classes: usize) -> Result<Array1<f32>, BucketError> {
    if label >= num_classes {
        return Err(BucketError::LabelOutOfRange { label, num_classes });
    }
    let mut encoded = Array1::zeros(num_classes);
    encoded[label] = 1.0;
    Ok(encoded)
}

/// Number of classes observed in `labels`: `max(label) + 1`.
pub fn num_classes(labels: &[usize]) -> Result<usize, BucketError> {
    labels
        .iter()
        .max()
        .map(|&max| max + 1)
        .ok_or(BucketError::NoLabels)
}

/// Index of the largest value; the first one wins on ties.
pub fn argmax<'a>(values: impl IntoIterator<Item = &'a f32>) -> usize {
    values
        .into_iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best, best_val), (idx, &v)| {
            if v > best_val {
                (idx, v)
            } else {
                (best, best_val)
            }
        })
        .0
}

/// Same-length geometries with their one-hot labels.
#[derive(Debug, Clone)]
pub struct Bucket {
    key: usize,
    geoms: Vec<Geometry>,
    targets: Vec<Array1<f32>>,
    padded: usize,
}

impl Bucket {
    fn new(key: usize) -> Self {
        Self {
            key,
            geoms: Vec::new(),
            targets: Vec::new(),
            padded: 0,
        }
    }

    fn push(&mut self, geom: Geometry, target: Array1<f32>) -> Result<(), BucketError> {
        if let Some(first) = self.geoms.first() {
            if first.channels() != geom.channels() {
                return Err(BucketError::ChannelMismatch {
                    key: self.key,
                    expected: first.channels(),
                    got: geom.channels(),
                });
            }
        }
        debug_assert_eq!(geom.len(), self.key);
        self.geoms.push(geom);
        self.targets.push(target);
        Ok(())
    }

    /// Sequence length shared by every geometry in the bucket.
    pub fn key(&self) -> usize {
        self.key
    }

    pub fn len(&self) -> usize {
        self.geoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.geoms.is_empty()
    }

    /// Entries that entered through padding.
    pub fn padded_count(&self) -> usize {
        self.padded
    }

    pub fn geometries(&self) -> &[Geometry] {
        &self.geoms
    }

    pub fn targets(&self) -> &[Array1<f32>] {
        &self.targets
    }

    /// Stacked inputs, `[entries, key, channels]`.
    pub fn inputs_array(&self) -> Array3<f32> {
        let channels = self.geoms.first().map_or(0, Geometry::channels);
        let mut stacked = Array3::zeros((self.len(), self.key, channels));
        for (mut slot, geom) in stacked.axis_iter_mut(Axis(0)).zip(&self.geoms) {
            slot.assign(&geom.points());
        }
        stacked
    }

    /// Stacked one-hot labels, `[entries, classes]`.
    pub fn targets_array(&self) -> Array2<f32> {
        let classes = self.targets.first().map_or(0, Array1::len);
        let mut stacked = Array2::zeros((self.len(), classes));
        for (mut row, target) in stacked.axis_iter_mut(Axis(0)).zip(&self.targets) {
            row.assign(target);
        }
        stacked
    }
}

/// Summary of one bucket for logging.
#[derive(Debug, Clone, Serialize)]
pub struct BucketStats {
    pub key: usize,
    pub entries: usize,
    pub padded: usize,
}

/// Buckets keyed by sequence length, iterated in ascending key order.
#[derive(Debug, Clone, Default)]
pub struct BucketedDataset {
    buckets: BTreeMap<usize, Bucket>,
    num_classes: usize,
}

impl BucketedDataset {
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Total number of (geometry, label) pairs across all buckets.
    pub fn total_entries(&self) -> usize {
        self.buckets.values().map(Bucket::len).sum()
    }

    pub fn get(&self, key: usize) -> Option<&Bucket> {
        self.buckets.get(&key)
    }

    pub fn keys(&self) -> impl Iterator<Item = usize> + '_ {
        self.buckets.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bucket> {
        self.buckets.values()
    }

    pub fn stats(&self) -> Vec<BucketStats> {
        self.iter()
            .map(|b| BucketStats {
                key: b.key,
                entries: b.len(),
                padded: b.padded,
            })
            .collect()
    }
}

/// Partitions labelled geometries into length buckets of roughly `capacity` entries.
#[derive(Debug, Clone, Copy)]
pub struct BucketBuilder {
    capacity: usize,
}

impl BucketBuilder {
    pub fn new(capacity: usize) -> Result<Self, BucketError> {
        if capacity == 0 {
            return Err(BucketError::ZeroCapacity);
        }
        Ok(Self { capacity })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bucket a dataset; the class count is derived from its labels.
    pub fn build(&self, dataset: &GeometryDataset) -> Result<BucketedDataset, BucketError> {
        let classes = num_classes(&dataset.labels)?;
        self.build_with_classes(&dataset.geoms, &dataset.labels, classes)
    }

    /// Bucket `geoms`/`labels` with a fixed class count.
    ///
    /// Pairs whose length equals the current bucket key are appended without
    /// a capacity check, so such buckets can grow beyond `capacity`. Only the
    /// padding path is bounded.
    pub fn build_with_classes(
        &self,
        geoms: &[Geometry],
        labels: &[usize],
        classes: usize,
    ) -> Result<BucketedDataset, BucketError> {
        if geoms.len() != labels.len() {
            return Err(BucketError::LengthMismatch {
                geometries: geoms.len(),
                labels: labels.len(),
            });
        }

        let mut order: Vec<usize> = (0..geoms.len()).collect();
        // stable: equal lengths keep their input order
        order.sort_by(|&a, &b| geoms[b].len().cmp(&geoms[a].len()));

        let mut buckets: BTreeMap<usize, Bucket> = BTreeMap::new();
        // Key of the newest bucket. Lengths only decrease, so it is always the smallest key.
        let mut cursor: Option<usize> = None;

        for idx in order {
            let geom = &geoms[idx];
            let target = one_hot(labels[idx], classes)?;
            let len = geom.len();

            match cursor {
                Some(key) if key == len => {
                    if let Some(bucket) = buckets.get_mut(&key) {
                        bucket.push(geom.clone(), target)?;
                    }
                }
                Some(key) if buckets.get(&key).map_or(0, Bucket::len) < self.capacity => {
                    if let Some(bucket) = buckets.get_mut(&key) {
                        bucket.push(geom.pad_front(key), target)?;
                        bucket.padded += 1;
                    }
                }
                _ => {
                    let mut bucket = Bucket::new(len);
                    bucket.push(geom.clone(), target)?;
                    buckets.insert(len, bucket);
                    cursor = Some(len);
                }
            }
        }

        Ok(BucketedDataset {
            buckets,
            num_classes: classes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geom(len: usize) -> Geometry {
        Geometry::new(Array2::from_shape_fn((len, 3), |(r, c)| {
            (r * 3 + c + 1) as f32
        }))
    }

    fn dataset(lengths: &[usize], labels: &[usize]) -> GeometryDataset {
        GeometryDataset::new(lengths.iter().map(|&l| geom(l)).collect(), labels.to_vec())
            .unwrap()
    }

    #[test]
    fn test_one_hot_argmax_round_trip() {
        for classes in 1..6 {
            for label in 0..classes {
                let encoded = one_hot(label, classes).unwrap();
                assert_eq!(encoded.sum(), 1.0);
                assert_eq!(argmax(encoded.iter()), label);
            }
        }
    }

    #[test]
    fn test_one_hot_rejects_out_of_range() {
        assert_eq!(
            one_hot(3, 3),
            Err(BucketError::LabelOutOfRange {
                label: 3,
                num_classes: 3
            })
        );
    }

    #[test]
    fn test_num_classes() {
        assert_eq!(num_classes(&[0, 4, 2]), Ok(5));
        assert_eq!(num_classes(&[]), Err(BucketError::NoLabels));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(BucketBuilder::new(0), Err(BucketError::ZeroCapacity)));
    }

    #[test]
    fn test_full_bucket_opens_new_one() {
        let data = dataset(&[5, 5, 3], &[0, 1, 0]);
        let buckets = BucketBuilder::new(2).unwrap().build(&data).unwrap();

        assert_eq!(buckets.keys().collect::<Vec<_>>(), vec![3, 5]);
        assert_eq!(buckets.get(5).unwrap().len(), 2);
        assert_eq!(buckets.get(3).unwrap().len(), 1);
        assert_eq!(buckets.get(5).unwrap().padded_count(), 0);
    }

    #[test]
    fn test_short_geometry_padded_into_open_bucket() {
        let data = dataset(&[3, 5], &[1, 0]);
        let buckets = BucketBuilder::new(4).unwrap().build(&data).unwrap();

        assert_eq!(buckets.len(), 1);
        let bucket = buckets.get(5).unwrap();
        assert_eq!(bucket.len(), 2);
        assert_eq!(bucket.padded_count(), 1);

        // the length-3 geometry was front-padded with two zero rows
        let padded = &bucket.geometries()[1];
        assert_eq!(padded.len(), 5);
        assert_eq!(padded.points().row(0).sum(), 0.0);
        assert_eq!(padded.points().row(1).sum(), 0.0);
        assert_eq!(padded.points().row(2).to_vec(), vec![1.0, 2.0, 3.0]);
        assert_eq!(bucket.targets()[1].to_vec(), vec![0.0, 1.0]);
    }

    #[test]
    fn test_exact_length_matches_exceed_capacity() {
        // Exact-length pairs skip the capacity check; this is kept on purpose.
        let data = dataset(&[4, 4, 4, 4, 4], &[0, 1, 0, 1, 0]);
        let buckets = BucketBuilder::new(2).unwrap().build(&data).unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets.get(4).unwrap().len(), 5);
    }

    #[test]
    fn test_padding_path_respects_capacity() {
        let lengths = [9, 8, 8, 7, 7, 6, 5, 5, 5, 4, 3, 2, 2, 1, 1, 1];
        let labels: Vec<usize> = (0..lengths.len()).map(|i| i % 3).collect();
        let data = dataset(&lengths, &labels);
        let buckets = BucketBuilder::new(3).unwrap().build(&data).unwrap();

        for bucket in buckets.iter() {
            if bucket.padded_count() > 0 {
                assert!(bucket.len() <= 3, "bucket {} holds {}", bucket.key(), bucket.len());
            }
        }
    }

    #[test]
    fn test_buckets_conserve_pairs_and_share_length() {
        let lengths = [12, 3, 7, 7, 1, 9, 12, 4, 4, 4, 2, 8, 5, 6, 3, 10, 11, 1];
        let labels: Vec<usize> = (0..lengths.len()).map(|i| (i * 7) % 4).collect();
        let data = dataset(&lengths, &labels);
        let buckets = BucketBuilder::new(3).unwrap().build(&data).unwrap();

        assert_eq!(buckets.total_entries(), lengths.len());
        assert_eq!(buckets.num_classes(), 4);

        let mut label_counts = [0usize; 4];
        for bucket in buckets.iter() {
            assert!(bucket.geometries().iter().all(|g| g.len() == bucket.key()));
            for target in bucket.targets() {
                label_counts[argmax(target.iter())] += 1;
            }
        }
        let mut expected = [0usize; 4];
        for &l in &labels {
            expected[l] += 1;
        }
        assert_eq!(label_counts, expected);
    }

    #[test]
    fn test_stacked_arrays() {
        let data = dataset(&[2, 2, 1], &[0, 2, 1]);
        let buckets = BucketBuilder::new(8).unwrap().build(&data).unwrap();
        let bucket = buckets.get(2).unwrap();

        assert_eq!(bucket.inputs_array().dim(), (3, 2, 3));
        let targets = bucket.targets_array();
        assert_eq!(targets.dim(), (3, 3));
        assert_eq!(targets.row(2).to_vec(), vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_channel_mismatch_is_reported() {
        let geoms = vec![geom(2), Geometry::new(Array2::zeros((2, 5)))];
        let result = BucketBuilder::new(4)
            .unwrap()
            .build_with_classes(&geoms, &[0, 0], 1);
        assert!(matches!(result, Err(BucketError::ChannelMismatch { .. })));
    }
}
