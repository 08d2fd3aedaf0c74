use std::fs::File;
use std::path::Path;

use ndarray::{array, Array1, Array2, Array3};
use ndarray_npy::NpzWriter;
use topoml_core::{
    load_descriptor_datasets, load_geometry_dataset, load_geometry_datasets, DatasetError,
};

fn write_geometry_archive(path: &Path, lengths: Option<Array1<i64>>) {
    let mut npz = NpzWriter::new(File::create(path).unwrap());
    let geoms = Array3::<f64>::from_shape_fn((3, 4, 3), |(s, p, c)| {
        if p <= s {
            (s * 10 + p * 3 + c + 1) as f64
        } else {
            0.0
        }
    });
    npz.add_array("geoms", &geoms).unwrap();
    npz.add_array("feature_type", &array![2i64, 0, 1]).unwrap();
    if let Some(lengths) = lengths {
        npz.add_array("geom_lengths", &lengths).unwrap();
    }
    npz.finish().unwrap();
}

#[test]
fn geometry_archive_strips_trailing_padding() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("archaeology_train.npz");
    write_geometry_archive(&path, None);

    let dataset = load_geometry_dataset(&path, "feature_type").unwrap();
    assert_eq!(dataset.labels, vec![2, 0, 1]);
    let lengths: Vec<usize> = dataset.geoms.iter().map(|g| g.len()).collect();
    assert_eq!(lengths, vec![1, 2, 3]);
    assert_eq!(dataset.geoms[1].points().row(1).to_vec(), vec![14.0, 15.0, 16.0]);
}

#[test]
fn geometry_archive_honours_explicit_lengths() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("archaeology_train.npz");
    write_geometry_archive(&path, Some(array![4i64, 4, 4]));

    let dataset = load_geometry_dataset(&path, "feature_type").unwrap();
    assert!(dataset.geoms.iter().all(|g| g.len() == 4));
}

#[test]
fn missing_label_array_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("train.npz");
    write_geometry_archive(&path, None);

    match load_geometry_dataset(&path, "building_type") {
        Err(DatasetError::MissingArray { name, .. }) => assert_eq!(name, "building_type"),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn prefixed_archives_are_concatenated_in_name_order() {
    let dir = tempfile::tempdir().unwrap();
    for (name, label) in [("buildings_train_b.npz", 1i64), ("buildings_train_a.npz", 0)] {
        let mut npz = NpzWriter::new(File::create(dir.path().join(name)).unwrap());
        npz.add_array("geoms", &Array3::<f32>::ones((2, 2, 3))).unwrap();
        npz.add_array("building_type", &array![label, label]).unwrap();
        npz.add_array("fourier_descriptors", &Array2::<f64>::from_elem((2, 5), label as f64))
            .unwrap();
        npz.finish().unwrap();
    }
    std::fs::write(dir.path().join("buildings_test.npz"), b"not an archive").unwrap();

    let geoms = load_geometry_datasets(dir.path(), "buildings_train", "building_type").unwrap();
    assert_eq!(geoms.labels, vec![0, 0, 1, 1]);

    let descriptors =
        load_descriptor_datasets(dir.path(), "buildings_train", "building_type").unwrap();
    assert_eq!(descriptors.features.dim(), (4, 5));
    assert_eq!(descriptors.features[[3, 0]], 1.0);

    assert!(matches!(
        load_geometry_datasets(dir.path(), "nothing_here", "building_type"),
        Err(DatasetError::NoMatchingFiles { .. })
    ));
}

#[test]
fn object_dtype_geometries_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ragged.npz");
    write_geometry_archive(&path, None);

    // rewrite the stored header of `geoms` to the descriptor NumPy uses for
    // ragged arrays; same byte length so the archive stays readable
    let mut bytes = std::fs::read(&path).unwrap();
    let needle = b"'descr': '<f8',";
    let at = bytes
        .windows(needle.len())
        .position(|w| w == needle)
        .unwrap();
    bytes[at..at + needle.len()].copy_from_slice(b"'descr': '|O', ");
    std::fs::write(&path, bytes).unwrap();

    match load_geometry_dataset(&path, "feature_type") {
        Err(DatasetError::InvalidArray { name, reason }) => {
            assert_eq!(name, "geoms");
            assert!(reason.contains("ragged"), "{reason}");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}
