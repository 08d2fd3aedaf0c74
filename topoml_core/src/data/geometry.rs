//! Vectorized geometries and labelled geometry datasets.
//!
//! A geometry is an ordered sequence of point vectors. The first
//! [`COORDINATE_CHANNELS`] channels of every point hold the x/y coordinates,
//! any further channels are auxiliary flags (render/stop markers).

use ndarray::{s, Array2, Array3, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::DatasetError;

/// Number of leading channels holding coordinates.
pub const COORDINATE_CHANNELS: usize = 2;

/// One vectorized geometry, `[points, channels]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    points: Array2<f32>,
}

impl Geometry {
    pub fn new(points: Array2<f32>) -> Self {
        Self { points }
    }

    /// Sequence length (number of points).
    pub fn len(&self) -> usize {
        self.points.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.points.nrows() == 0
    }

    /// Width of each point vector.
    pub fn channels(&self) -> usize {
        self.points.ncols()
    }

    pub fn points(&self) -> ArrayView2<'_, f32> {
        self.points.view()
    }

    /// Coordinate channels only, `[points, 2]` (fewer if the geometry is narrower).
    pub fn coordinates(&self) -> ArrayView2<'_, f32> {
        let width = COORDINATE_CHANNELS.min(self.channels());
        self.points.slice(s![.., ..width])
    }

    /// Prepend zero rows until the sequence has `target_len` points.
    ///
    /// Geometries already at or beyond `target_len` are returned unchanged.
    pub fn pad_front(&self, target_len: usize) -> Geometry {
        let len = self.len();
        if len >= target_len {
            return self.clone();
        }
        let mut padded = Array2::zeros((target_len, self.channels()));
        padded
            .slice_mut(s![target_len - len.., ..])
            .assign(&self.points);
        Geometry::new(padded)
    }

    /// Zero-pad at the end up to `target_len` points, used to lay geometries
    /// out in a dense `[samples, points, channels]` block.
    pub fn pad_back(&self, target_len: usize) -> Geometry {
        let len = self.len();
        if len >= target_len {
            return self.clone();
        }
        let mut padded = Array2::zeros((target_len, self.channels()));
        padded.slice_mut(s![..len, ..]).assign(&self.points);
        Geometry::new(padded)
    }

    /// Drop trailing rows whose every channel is zero.
    pub fn trim_trailing_padding(&self) -> Geometry {
        let keep = self
            .points
            .axis_iter(Axis(0))
            .rposition(|row| row.iter().any(|&v| v != 0.0))
            .map_or(0, |last| last + 1);
        Geometry::new(self.points.slice(s![..keep, ..]).to_owned())
    }

    /// Apply `f` to every coordinate value, leaving flag channels untouched.
    pub fn map_coordinates(&self, f: impl Fn(f32) -> f32) -> Geometry {
        let mut points = self.points.clone();
        let width = COORDINATE_CHANNELS.min(self.channels());
        points.slice_mut(s![.., ..width]).mapv_inplace(f);
        Geometry::new(points)
    }
}

/// Geometries paired 1:1 with integer labels.
#[derive(Debug, Clone, Default)]
pub struct GeometryDataset {
    pub geoms: Vec<Geometry>,
    pub labels: Vec<usize>,
}

impl GeometryDataset {
    pub fn new(geoms: Vec<Geometry>, labels: Vec<usize>) -> Result<Self, DatasetError> {
        if geoms.len() != labels.len() {
            return Err(DatasetError::LengthMismatch {
                geometries: geoms.len(),
                labels: labels.len(),
            });
        }
        Ok(Self { geoms, labels })
    }

    pub fn len(&self) -> usize {
        self.geoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.geoms.is_empty()
    }

    /// Append all samples of `other`.
    pub fn extend(&mut self, other: GeometryDataset) {
        self.geoms.extend(other.geoms);
        self.labels.extend(other.labels);
    }

    /// Longest sequence in the dataset.
    pub fn max_len(&self) -> usize {
        self.geoms.iter().map(Geometry::len).max().unwrap_or(0)
    }

    /// Dense `[samples, points, channels]` block with every geometry
    /// zero-padded at the end to `points` (at least the longest sequence).
    pub fn to_padded_array(&self, points: usize) -> Result<Array3<f32>, DatasetError> {
        let channels = self.geoms.first().map_or(0, Geometry::channels);
        if let Some(bad) = self.geoms.iter().find(|g| g.channels() != channels) {
            return Err(DatasetError::InvalidArray {
                name: "geoms".to_string(),
                reason: format!("{} channels where {channels} were expected", bad.channels()),
            });
        }
        let points = points.max(self.max_len());
        let mut block = Array3::zeros((self.len(), points, channels));
        for (mut slot, geom) in block.axis_iter_mut(Axis(0)).zip(&self.geoms) {
            slot.slice_mut(s![..geom.len(), ..]).assign(&geom.points());
        }
        Ok(block)
    }

    /// Randomly split off a test set holding `ceil(len * test_fraction)` samples.
    ///
    /// Returns `(train, test)`.
    pub fn train_test_split(
        self,
        test_fraction: f32,
        seed: u64,
    ) -> Result<(GeometryDataset, GeometryDataset), DatasetError> {
        if !(test_fraction > 0.0 && test_fraction < 1.0) {
            return Err(DatasetError::InvalidSplit(test_fraction));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut indices: Vec<usize> = (0..self.len()).collect();
        indices.shuffle(&mut rng);

        let test_len = ((self.len() as f32) * test_fraction).ceil() as usize;
        let mut slots: Vec<Option<(Geometry, usize)>> =
            self.geoms.into_iter().zip(self.labels).map(Some).collect();

        let mut take = |idx: &[usize]| {
            let mut part = GeometryDataset::default();
            for &i in idx {
                if let Some((geom, label)) = slots[i].take() {
                    part.geoms.push(geom);
                    part.labels.push(label);
                }
            }
            part
        };

        let test = take(&indices[..test_len]);
        let train = take(&indices[test_len..]);
        Ok((train, test))
    }
}
