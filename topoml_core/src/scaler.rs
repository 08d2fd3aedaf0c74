//! Geometry scaling.
//!
//! A single scale factor is derived from the training geometries and used to
//! divide the coordinate channels of every geometry, training and test alike.
//! Test statistics never feed into the factor.

use ndarray::Axis;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::Geometry;
use crate::error::ScalerError;

/// Positive, finite divisor applied to all coordinates of a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleFactor(f32);

impl ScaleFactor {
    pub fn new(value: f32) -> Result<Self, ScalerError> {
        if value.is_finite() && value > 0.0 {
            Ok(Self(value))
        } else {
            Err(ScalerError::InvalidScale(value))
        }
    }

    pub fn value(self) -> f32 {
        self.0
    }
}

/// Derive the scale factor from training geometries.
///
/// Every geometry is centred on the mean of its own points; the minimum and
/// maximum centred coordinate of each geometry are collected and the factor is
/// the standard deviation of those extremes. Translation does not affect it,
/// shape extent dominates it.
pub fn compute_scale(training_geometries: &[Geometry]) -> Result<ScaleFactor, ScalerError> {
    let mut extremes: Vec<f64> = Vec::with_capacity(training_geometries.len() * 2);

    for geom in training_geometries {
        let coords = geom.coordinates();
        let Some(mean) = coords.mean_axis(Axis(0)) else {
            continue;
        };
        if coords.is_empty() {
            continue;
        }

        let centred = &coords - &mean;
        let (min, max) = centred
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        extremes.push(f64::from(min));
        extremes.push(f64::from(max));
    }

    if extremes.is_empty() {
        return Err(ScalerError::EmptyDataset);
    }

    let n = extremes.len() as f64;
    let mean = extremes.iter().sum::<f64>() / n;
    let variance = extremes.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let scale = variance.sqrt() as f32;

    debug!(
        samples = training_geometries.len(),
        scale, "computed geometry scale"
    );
    ScaleFactor::new(scale)
}

/// Use a configured scale when one is given (non-zero), otherwise derive it.
pub fn resolve_scale(
    configured: f32,
    training_geometries: &[Geometry],
) -> Result<ScaleFactor, ScalerError> {
    if configured != 0.0 {
        ScaleFactor::new(configured)
    } else {
        compute_scale(training_geometries)
    }
}

/// Divide every coordinate value by `scale`; shapes and flags are unchanged.
pub fn apply_scale(geometries: &[Geometry], scale: ScaleFactor) -> Vec<Geometry> {
    let divisor = scale.value();
    geometries
        .iter()
        .map(|geom| geom.map_coordinates(|v| v / divisor))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn rectangle(offset: f32, width: f32, height: f32) -> Geometry {
        Geometry::new(array![
            [offset, offset, 1.0, 0.0],
            [offset + width, offset, 1.0, 0.0],
            [offset + width, offset + height, 1.0, 0.0],
            [offset, offset + height, 0.0, 1.0],
        ])
    }

    fn corpus() -> Vec<Geometry> {
        vec![
            rectangle(1000.0, 40.0, 20.0),
            rectangle(-250.0, 120.0, 80.0),
            rectangle(0.0, 10.0, 300.0),
            rectangle(50.0, 5.0, 5.0),
        ]
    }

    fn coordinate_spread(geoms: &[Geometry]) -> f32 {
        let values: Vec<f32> = geoms
            .iter()
            .flat_map(|g| g.coordinates().iter().copied().collect::<Vec<_>>())
            .collect();
        let n = values.len() as f32;
        let mean = values.iter().sum::<f32>() / n;
        (values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n).sqrt()
    }

    #[test]
    fn test_empty_dataset_is_rejected() {
        assert_eq!(compute_scale(&[]), Err(ScalerError::EmptyDataset));
    }

    #[test]
    fn test_pointless_geometries_are_rejected() {
        let empty = Geometry::new(Array2::zeros((0, 4)));
        assert_eq!(compute_scale(&[empty]), Err(ScalerError::EmptyDataset));
    }

    #[test]
    fn test_degenerate_spread_is_rejected() {
        let dot = Geometry::new(array![[3.0, 3.0, 1.0]]);
        assert!(matches!(
            compute_scale(&[dot.clone(), dot]),
            Err(ScalerError::InvalidScale(_))
        ));
    }

    #[test]
    fn test_scale_is_translation_invariant() {
        let a = compute_scale(&[rectangle(0.0, 10.0, 4.0), rectangle(0.0, 2.0, 2.0)]).unwrap();
        let b = compute_scale(&[rectangle(5e4, 10.0, 4.0), rectangle(-7.0, 2.0, 2.0)]).unwrap();
        assert!((a.value() - b.value()).abs() < 1e-3);
    }

    #[test]
    fn test_scaling_reduces_spread() {
        let geoms = corpus();
        let scale = compute_scale(&geoms).unwrap();
        let scaled = apply_scale(&geoms, scale);
        assert!(coordinate_spread(&scaled) < coordinate_spread(&geoms));
    }

    #[test]
    fn test_scaling_preserves_ratios_and_flags() {
        let geoms = corpus();
        let scale = compute_scale(&geoms).unwrap();
        let scaled = apply_scale(&geoms, scale);

        for (orig, new) in geoms.iter().zip(&scaled) {
            assert_eq!(orig.points().dim(), new.points().dim());
            let (ox, oy) = (orig.points()[[1, 0]], orig.points()[[2, 1]]);
            let (nx, ny) = (new.points()[[1, 0]], new.points()[[2, 1]]);
            assert!((ox / oy - nx / ny).abs() < 1e-4);
            for row in 0..orig.len() {
                assert_eq!(orig.points()[[row, 2]], new.points()[[row, 2]]);
                assert_eq!(orig.points()[[row, 3]], new.points()[[row, 3]]);
            }
        }
    }

    #[test]
    fn test_training_scale_is_reused_for_test_data() {
        let train = corpus();
        let test = vec![rectangle(9.0, 900.0, 900.0)];
        let scale = compute_scale(&train).unwrap();

        let scaled_test = apply_scale(&test, scale);
        let own_scale = compute_scale(&test).unwrap();
        assert!((own_scale.value() - scale.value()).abs() > 1.0);
        assert!(
            (scaled_test[0].points()[[1, 0]] - test[0].points()[[1, 0]] / scale.value()).abs()
                < 1e-4
        );
    }

    #[test]
    fn test_resolve_scale_prefers_configuration() {
        let scale = resolve_scale(0.5, &corpus()).unwrap();
        assert_eq!(scale.value(), 0.5);
        assert!(resolve_scale(-1.0, &corpus()).is_err());
        assert_eq!(
            resolve_scale(0.0, &corpus()).unwrap(),
            compute_scale(&corpus()).unwrap()
        );
    }
}
