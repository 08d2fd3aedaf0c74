//! Adam optimizer over named parameters.

use std::collections::HashMap;

use ndarray::{ArrayD, Zip};

use crate::neural::gradient::{Gradients, Parameterized};

/// Running first and second moment estimates of one parameter tensor.
#[derive(Debug, Clone)]
struct Moments {
    mean: ArrayD<f32>,
    uncentered_var: ArrayD<f32>,
}

/// Adam with bias-corrected moment estimates.
///
/// Moments are keyed by parameter name and survive across steps, so one
/// optimizer instance carries its state over every batch, bucket and epoch
/// of a run. A parameter without a gradient in a step is left untouched.
#[derive(Debug, Clone)]
pub struct AdamOptimizer {
    pub learning_rate: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    /// Rescale all gradients of a step together when their combined L2 norm
    /// exceeds this value
    pub clip_norm: Option<f32>,
    moments: HashMap<String, Moments>,
    steps: usize,
}

impl AdamOptimizer {
    pub fn new(learning_rate: f32) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            clip_norm: None,
            moments: HashMap::new(),
            steps: 0,
        }
    }

    pub fn with_clip_norm(mut self, max_norm: f32) -> Self {
        self.clip_norm = Some(max_norm);
        self
    }

    /// Number of update steps taken so far.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Factor applied to every gradient of a step: `clip_norm / global norm`
    /// when the global norm is larger, 1 otherwise.
    fn clip_factor(&self, gradients: &Gradients) -> f32 {
        let Some(max_norm) = self.clip_norm else {
            return 1.0;
        };
        let norm = gradients.global_norm();
        if norm > max_norm {
            max_norm / norm
        } else {
            1.0
        }
    }

    /// Apply one update to every parameter of `model` that has a gradient.
    pub fn step<M: Parameterized + ?Sized>(&mut self, model: &mut M, gradients: &Gradients) {
        self.steps += 1;
        let (beta1, beta2, eps, lr) = (self.beta1, self.beta2, self.epsilon, self.learning_rate);
        let correction1 = 1.0 - beta1.powi(self.steps as i32);
        let correction2 = 1.0 - beta2.powi(self.steps as i32);
        let factor = self.clip_factor(gradients);

        for (name, mut param) in model.parameters_mut() {
            let Some(grad) = gradients.get(&name) else {
                continue;
            };
            let moments = self.moments.entry(name).or_insert_with(|| Moments {
                mean: ArrayD::zeros(param.raw_dim()),
                uncentered_var: ArrayD::zeros(param.raw_dim()),
            });

            Zip::from(&mut param)
                .and(&mut moments.mean)
                .and(&mut moments.uncentered_var)
                .and(grad)
                .for_each(|p, m, v, &g| {
                    let g = g * factor;
                    *m = beta1 * *m + (1.0 - beta1) * g;
                    *v = beta2 * *v + (1.0 - beta2) * g * g;
                    *p -= lr * (*m / correction1) / ((*v / correction2).sqrt() + eps);
                });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, Array1, ArrayViewMutD};

    struct Quadratic {
        w: Array1<f32>,
    }

    impl Parameterized for Quadratic {
        fn parameters_mut(&mut self) -> Vec<(String, ArrayViewMutD<'_, f32>)> {
            vec![("w".to_string(), self.w.view_mut().into_dyn())]
        }

        fn num_parameters(&self) -> usize {
            self.w.len()
        }
    }

    fn gradient_of(model: &Quadratic) -> Gradients {
        // d/dw of sum(w^2)
        let mut grads = Gradients::new();
        grads.insert("w", (&model.w * 2.0).into_dyn());
        grads
    }

    #[test]
    fn test_adam_minimises_quadratic() {
        let mut model = Quadratic {
            w: arr1(&[3.0, -2.0]),
        };
        let mut optimizer = AdamOptimizer::new(0.1);
        for _ in 0..300 {
            let grads = gradient_of(&model);
            optimizer.step(&mut model, &grads);
        }
        assert!(model.w.iter().all(|w| w.abs() < 0.1), "{:?}", model.w);
        assert_eq!(optimizer.steps(), 300);
    }

    #[test]
    fn test_first_step_moves_by_learning_rate() {
        let mut model = Quadratic { w: arr1(&[5.0]) };
        let mut optimizer = AdamOptimizer::new(0.01);
        let grads = gradient_of(&model);
        optimizer.step(&mut model, &grads);
        // bias-corrected first step has magnitude ~lr regardless of gradient size
        assert!((model.w[0] - 4.99).abs() < 1e-4);
    }

    #[test]
    fn test_moments_persist_between_steps() {
        let mut model = Quadratic { w: arr1(&[1.0, 2.0]) };
        let mut optimizer = AdamOptimizer::new(0.05);
        let grads = gradient_of(&model);
        optimizer.step(&mut model, &grads);
        let after_one = model.w.clone();

        // a fresh optimizer would move by ~lr again; the warm one keeps momentum
        let mut fresh = AdamOptimizer::new(0.05);
        let mut other = Quadratic { w: after_one.clone() };
        let grads = gradient_of(&model);
        optimizer.step(&mut model, &grads);
        fresh.step(&mut other, &grads);
        assert_ne!(model.w, other.w);
        assert_eq!(optimizer.steps(), 2);
    }

    #[test]
    fn test_clip_norm_uses_global_norm() {
        let optimizer = AdamOptimizer::new(0.1).with_clip_norm(1.0);
        let mut grads = Gradients::new();
        grads.insert("a", arr1(&[0.8f32]).into_dyn());
        grads.insert("b", arr1(&[0.8f32]).into_dyn());

        // each tensor alone is under the limit, together they are not
        let factor = optimizer.clip_factor(&grads);
        let mut scaled = Gradients::new();
        for (name, grad) in grads.iter() {
            scaled.insert(name, grad * factor);
        }
        assert!((grads.global_norm() - 1.1313709).abs() < 1e-5);
        assert!((scaled.global_norm() - 1.0).abs() < 1e-5);

        let mut small = Gradients::new();
        small.insert("a", arr1(&[0.3f32, 0.4]).into_dyn());
        assert_eq!(optimizer.clip_factor(&small), 1.0);
        assert_eq!(AdamOptimizer::new(0.1).clip_factor(&grads), 1.0);
    }

    #[test]
    fn test_parameter_without_gradient_is_untouched() {
        let mut model = Quadratic { w: arr1(&[1.0]) };
        let mut optimizer = AdamOptimizer::new(0.1);
        optimizer.step(&mut model, &Gradients::new());
        assert_eq!(model.w, arr1(&[1.0]));
    }
}
