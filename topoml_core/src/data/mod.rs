//! Datasets: vectorized geometries, Fourier descriptors and their archives.

pub mod descriptors;
pub mod fetch;
pub mod geometry;
pub mod npz;

pub use descriptors::DescriptorDataset;
pub use fetch::ensure_local;
pub use geometry::{Geometry, GeometryDataset, COORDINATE_CHANNELS};
pub use npz::{
    load_descriptor_dataset, load_descriptor_datasets, load_geometry_dataset,
    load_geometry_datasets,
};
