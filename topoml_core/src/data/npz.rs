//! Reading labelled geometry and descriptor datasets from `.npz` archives.
//!
//! Archives hold named numeric arrays:
//! - `geoms`: `[samples, max_points, channels]`, f32 or f64
//! - `geom_lengths` (optional): true sequence length of every sample
//! - a label array (`feature_type`, `building_type`) of integral values
//! - `fourier_descriptors`: `[samples, features]` for the baselines

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use ndarray::{s, Array1, Array2, Array3, Axis, Ix1, Ix2, Ix3, OwnedRepr};
use ndarray_npy::{NpzReader, ReadNpyError, ReadNpzError};
use tracing::{debug, info};

use crate::data::descriptors::DescriptorDataset;
use crate::data::geometry::{Geometry, GeometryDataset};
use crate::error::DatasetError;

pub const GEOMS_ARRAY: &str = "geoms";
pub const LENGTHS_ARRAY: &str = "geom_lengths";
pub const DESCRIPTORS_ARRAY: &str = "fourier_descriptors";

type Archive = NpzReader<BufReader<File>>;

fn open(path: &Path) -> Result<Archive, DatasetError> {
    let file = File::open(path).map_err(|source| DatasetError::Io {
        path: path.display().to_string(),
        source,
    })?;
    NpzReader::new(BufReader::new(file)).map_err(|err| DatasetError::Npz {
        path: path.display().to_string(),
        message: err.to_string(),
    })
}

/// Resolve `name` to the entry stored in the archive (NumPy appends `.npy`).
fn entry_name(archive: &mut Archive, path: &Path, name: &str) -> Result<Option<String>, DatasetError> {
    let names = archive.names().map_err(|err| DatasetError::Npz {
        path: path.display().to_string(),
        message: err.to_string(),
    })?;
    let with_ext = format!("{name}.npy");
    Ok(names.into_iter().find(|n| n == name || *n == with_ext))
}

fn require_entry(archive: &mut Archive, path: &Path, name: &str) -> Result<String, DatasetError> {
    entry_name(archive, path, name)?.ok_or_else(|| DatasetError::MissingArray {
        name: name.to_string(),
        path: path.display().to_string(),
    })
}

macro_rules! read_as_f32 {
    ($archive:expr, $entry:expr, $dim:ty) => {{
        match $archive.by_name::<OwnedRepr<f32>, $dim>($entry) {
            Ok(array) => Ok(array),
            Err(_) => $archive
                .by_name::<OwnedRepr<f64>, $dim>($entry)
                .map(|array| array.mapv(|v| v as f32)),
        }
    }};
}

/// Whether `err` reports an object (`|O`) dtype, as NumPy writes for ragged
/// or pickled arrays.
fn is_object_dtype(err: &ReadNpzError) -> bool {
    match err {
        ReadNpzError::Npy(ReadNpyError::WrongDescriptor(descr)) => {
            let descr = descr.to_string();
            descr
                .trim_matches(|c| c == '\'' || c == '"')
                .trim_start_matches(|c| matches!(c, '|' | '<' | '>' | '='))
                == "O"
        }
        _ => false,
    }
}

fn read_geoms(archive: &mut Archive, path: &Path, entry: &str) -> Result<Array3<f32>, DatasetError> {
    read_as_f32!(archive, entry, Ix3).map_err(|err| {
        if is_object_dtype(&err) {
            DatasetError::InvalidArray {
                name: GEOMS_ARRAY.to_string(),
                reason: format!(
                    "ragged object-dtype arrays are not supported; store a dense \
                     [samples, points, channels] block with '{LENGTHS_ARRAY}'"
                ),
            }
        } else {
            DatasetError::Npz {
                path: path.display().to_string(),
                message: format!("{entry}: {err}"),
            }
        }
    })
}

fn read_floats2_f64(
    archive: &mut Archive,
    path: &Path,
    entry: &str,
) -> Result<Array2<f64>, DatasetError> {
    match archive.by_name::<OwnedRepr<f64>, Ix2>(entry) {
        Ok(array) => Ok(array),
        Err(_) => archive
            .by_name::<OwnedRepr<f32>, Ix2>(entry)
            .map(|array| array.mapv(f64::from))
            .map_err(|err| DatasetError::Npz {
                path: path.display().to_string(),
                message: format!("{entry}: {err}"),
            }),
    }
}

/// Read a 1-D array of non-negative integral values, whatever its dtype.
fn read_indices(archive: &mut Archive, path: &Path, entry: &str) -> Result<Vec<usize>, DatasetError> {
    let values: Array1<f64> = if let Ok(a) = archive.by_name::<OwnedRepr<i64>, Ix1>(entry) {
        a.mapv(|v| v as f64)
    } else if let Ok(a) = archive.by_name::<OwnedRepr<i32>, Ix1>(entry) {
        a.mapv(f64::from)
    } else if let Ok(a) = archive.by_name::<OwnedRepr<u8>, Ix1>(entry) {
        a.mapv(f64::from)
    } else if let Ok(a) = archive.by_name::<OwnedRepr<f32>, Ix1>(entry) {
        a.mapv(f64::from)
    } else {
        archive
            .by_name::<OwnedRepr<f64>, Ix1>(entry)
            .map_err(|err| DatasetError::Npz {
                path: path.display().to_string(),
                message: format!("{entry}: {err}"),
            })?
    };

    values
        .iter()
        .map(|&v| {
            if v >= 0.0 && v.fract() == 0.0 && v.is_finite() {
                Ok(v as usize)
            } else {
                Err(DatasetError::InvalidArray {
                    name: entry.to_string(),
                    reason: format!("{v} is not a non-negative integer"),
                })
            }
        })
        .collect()
}

/// Split a dense geometry block into per-sample geometries.
fn split_geometries(
    block: &Array3<f32>,
    lengths: Option<&[usize]>,
) -> Result<Vec<Geometry>, DatasetError> {
    let (samples, max_points, _) = block.dim();
    if let Some(lengths) = lengths {
        if lengths.len() != samples {
            return Err(DatasetError::InvalidArray {
                name: LENGTHS_ARRAY.to_string(),
                reason: format!("{} lengths for {samples} geometries", lengths.len()),
            });
        }
        if let Some(&bad) = lengths.iter().find(|&&len| len > max_points) {
            return Err(DatasetError::InvalidArray {
                name: LENGTHS_ARRAY.to_string(),
                reason: format!("length {bad} exceeds {max_points} stored points"),
            });
        }
    }

    Ok(block
        .axis_iter(Axis(0))
        .enumerate()
        .map(|(i, sample)| match lengths {
            Some(lengths) => Geometry::new(sample.slice(s![..lengths[i], ..]).to_owned()),
            None => Geometry::new(sample.to_owned()).trim_trailing_padding(),
        })
        .collect())
}

/// Load geometries plus the label array `label_field` from one archive.
pub fn load_geometry_dataset(path: &Path, label_field: &str) -> Result<GeometryDataset, DatasetError> {
    let mut archive = open(path)?;

    let geoms_entry = require_entry(&mut archive, path, GEOMS_ARRAY)?;
    let labels_entry = require_entry(&mut archive, path, label_field)?;
    let lengths_entry = entry_name(&mut archive, path, LENGTHS_ARRAY)?;

    let block = read_geoms(&mut archive, path, &geoms_entry)?;
    let labels = read_indices(&mut archive, path, &labels_entry)?;
    let lengths = match lengths_entry {
        Some(entry) => Some(read_indices(&mut archive, path, &entry)?),
        None => None,
    };

    let geoms = split_geometries(&block, lengths.as_deref())?;
    debug!(
        path = %path.display(),
        samples = geoms.len(),
        max_points = block.dim().1,
        "loaded geometry archive"
    );
    GeometryDataset::new(geoms, labels)
}

/// Archives in `folder` whose file name starts with `prefix` and ends in `.npz`, sorted.
pub fn matching_archives(folder: &Path, prefix: &str) -> Result<Vec<PathBuf>, DatasetError> {
    let entries = fs::read_dir(folder).map_err(|source| DatasetError::Io {
        path: folder.display().to_string(),
        source,
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map_or(false, |name| name.starts_with(prefix) && name.ends_with(".npz"))
        })
        .collect();
    paths.sort();

    if paths.is_empty() {
        return Err(DatasetError::NoMatchingFiles {
            folder: folder.display().to_string(),
            prefix: prefix.to_string(),
        });
    }
    Ok(paths)
}

/// Load and concatenate every `<prefix>*.npz` archive in `folder`.
pub fn load_geometry_datasets(
    folder: &Path,
    prefix: &str,
    label_field: &str,
) -> Result<GeometryDataset, DatasetError> {
    let mut combined = GeometryDataset::default();
    for path in matching_archives(folder, prefix)? {
        info!(path = %path.display(), "loading training archive");
        combined.extend(load_geometry_dataset(&path, label_field)?);
    }
    Ok(combined)
}

/// Load Fourier descriptors plus the label array `label_field`.
pub fn load_descriptor_dataset(
    path: &Path,
    label_field: &str,
) -> Result<DescriptorDataset, DatasetError> {
    let mut archive = open(path)?;
    let features_entry = require_entry(&mut archive, path, DESCRIPTORS_ARRAY)?;
    let labels_entry = require_entry(&mut archive, path, label_field)?;

    let features = read_floats2_f64(&mut archive, path, &features_entry)?;
    let labels = read_indices(&mut archive, path, &labels_entry)?;
    DescriptorDataset::new(features, labels)
}

/// Load and concatenate descriptor archives matching `prefix` in `folder`.
pub fn load_descriptor_datasets(
    folder: &Path,
    prefix: &str,
    label_field: &str,
) -> Result<DescriptorDataset, DatasetError> {
    let mut parts = Vec::new();
    for path in matching_archives(folder, prefix)? {
        parts.push(load_descriptor_dataset(&path, label_field)?);
    }
    DescriptorDataset::concatenate(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_geometries_by_trailing_zeros() {
        let block = Array3::from_shape_vec(
            (2, 3, 2),
            vec![1.0, 1.0, 2.0, 2.0, 0.0, 0.0, 5.0, 5.0, 0.0, 0.0, 0.0, 0.0],
        )
        .unwrap();
        let geoms = split_geometries(&block, None).unwrap();
        assert_eq!(geoms[0].len(), 2);
        assert_eq!(geoms[1].len(), 1);
    }

    #[test]
    fn test_split_geometries_with_lengths() {
        let block = Array3::<f32>::zeros((2, 4, 3));
        let geoms = split_geometries(&block, Some(&[4, 2])).unwrap();
        assert_eq!(geoms[0].len(), 4);
        assert_eq!(geoms[1].len(), 2);
        assert_eq!(geoms[1].points().to_owned(), Array2::<f32>::zeros((2, 3)));
    }

    #[test]
    fn test_split_geometries_rejects_long_lengths() {
        let block = Array3::<f32>::zeros((1, 2, 3));
        assert!(split_geometries(&block, Some(&[3])).is_err());
    }

    #[test]
    fn test_missing_folder_is_io_error() {
        let result = matching_archives(Path::new("/nonexistent/topoml"), "train");
        assert!(matches!(result, Err(DatasetError::Io { .. })));
    }
}
