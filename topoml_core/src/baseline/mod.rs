//! Classical baselines on Fourier descriptors.
//!
//! Standardisation, k-nearest-neighbours, a one-vs-rest linear SVM and the
//! stratified splitting / grid selection used to tune them.

pub mod knn;
pub mod model_selection;
pub mod standard_scaler;
pub mod svm;

pub use knn::KnnClassifier;
pub use model_selection::{
    cross_val_scores, grid_search, stratified_k_fold, stratified_shuffle_split, GridSearchResult,
    Split,
};
pub use standard_scaler::StandardScaler;
pub use svm::LinearSvm;
