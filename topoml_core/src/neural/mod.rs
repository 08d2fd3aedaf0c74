//! Numerical building blocks shared by the classifiers: named gradients,
//! the Adam optimizer and loss functions.

pub mod gradient;
pub mod loss;
pub mod optimizer;

pub use gradient::{Gradients, Parameterized};
pub use loss::{categorical_cross_entropy, relu, relu_derivative, softmax, GaussianMixtureLoss};
pub use optimizer::AdamOptimizer;
