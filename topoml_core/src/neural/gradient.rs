//! Named parameter gradients.

use std::collections::BTreeMap;

use ndarray::{ArrayD, ArrayViewMutD};

/// Models exposing their trainable parameters by name.
///
/// Names must be stable for the lifetime of a model so optimizer state keyed
/// by name stays attached to the same tensor across steps.
pub trait Parameterized {
    /// Mutable views of every trainable tensor, paired with its name.
    fn parameters_mut(&mut self) -> Vec<(String, ArrayViewMutD<'_, f32>)>;

    /// Total number of scalar parameters.
    fn num_parameters(&self) -> usize;
}

/// Gradient tensors keyed by parameter name.
#[derive(Debug, Clone, Default)]
pub struct Gradients {
    grads: BTreeMap<String, ArrayD<f32>>,
}

impl Gradients {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, grad: ArrayD<f32>) {
        self.grads.insert(name.into(), grad);
    }

    pub fn get(&self, name: &str) -> Option<&ArrayD<f32>> {
        self.grads.get(name)
    }

    pub fn len(&self) -> usize {
        self.grads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grads.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArrayD<f32>)> {
        self.grads.iter().map(|(name, grad)| (name.as_str(), grad))
    }

    /// L2 norm over all gradient tensors together.
    pub fn global_norm(&self) -> f32 {
        self.grads
            .values()
            .flat_map(|g| g.iter())
            .map(|v| v * v)
            .sum::<f32>()
            .sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, IxDyn};

    #[test]
    fn test_global_norm() {
        let mut grads = Gradients::new();
        grads.insert("a", arr1(&[3.0f32]).into_dyn());
        grads.insert("b", ArrayD::from_elem(IxDyn(&[1, 1]), 4.0f32));
        assert!((grads.global_norm() - 5.0).abs() < 1e-6);
        assert!(!grads.is_empty());
        assert_eq!(grads.len(), 2);
    }
}
