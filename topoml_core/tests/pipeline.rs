use ndarray::Array2;
use topoml_core::{
    apply_scale, compute_scale, evaluate, train_bucketed, AdamOptimizer, BucketBuilder,
    Checkpointable, ClassifierConfig, ConvClassifier, Geometry, GeometryDataset, ScalerError,
    TrainOptions, TrainingLogger,
};

/// Regular polygon with `points` corners, radius `radius`, centred on `offset`.
fn polygon(points: usize, radius: f32, offset: f32) -> Geometry {
    Geometry::new(Array2::from_shape_fn((points, 3), |(i, c)| {
        let angle = i as f32 / points as f32 * std::f32::consts::TAU;
        match c {
            0 => offset + radius * angle.cos(),
            1 => offset + radius * angle.sin(),
            _ => if i + 1 == points { 1.0 } else { 0.0 },
        }
    }))
}

/// Class 0: small triangles and squares; class 1: large many-sided polygons.
fn synthetic(count: usize, seed_offset: f32) -> GeometryDataset {
    let mut geoms = Vec::with_capacity(count);
    let mut labels = Vec::with_capacity(count);
    for i in 0..count {
        let offset = seed_offset + (i as f32 * 37.0) % 500.0;
        if i % 2 == 0 {
            geoms.push(polygon(3 + i % 2 * 2, 10.0 + (i % 5) as f32, offset));
            labels.push(0);
        } else {
            geoms.push(polygon(9 + i % 4, 60.0 + (i % 7) as f32, offset));
            labels.push(1);
        }
    }
    GeometryDataset::new(geoms, labels).unwrap()
}

#[test]
fn empty_training_set_fails_before_model_construction() {
    assert_eq!(compute_scale(&[]), Err(ScalerError::EmptyDataset));
}

#[test]
fn convnet_pipeline_learns_synthetic_shapes() {
    let train = synthetic(64, 0.0);
    let test = synthetic(16, 1000.0);

    let scale = compute_scale(&train.geoms).unwrap();
    let train = GeometryDataset::new(apply_scale(&train.geoms, scale), train.labels).unwrap();
    let test = GeometryDataset::new(apply_scale(&test.geoms, scale), test.labels).unwrap();

    let buckets = BucketBuilder::new(8).unwrap().build(&train).unwrap();
    assert_eq!(buckets.total_entries(), 64);
    assert_eq!(buckets.num_classes(), 2);

    let dir = tempfile::tempdir().unwrap();
    let logger = TrainingLogger::create(dir.path(), "pipeline").unwrap();
    let mut model = ConvClassifier::new(ClassifierConfig {
        filters: 8,
        dense_size: 8,
        ..ClassifierConfig::new(3, 2)
    })
    .unwrap();
    let mut optimizer = AdamOptimizer::new(5e-3);
    let options = TrainOptions::new(15, 8);

    let result = train_bucketed(&mut model, &mut optimizer, &buckets, &options, &logger).unwrap();
    assert_eq!(result.epochs_run(), 15);
    let first = result.epoch_metrics.first().unwrap().train_loss;
    let last = result.final_metrics().unwrap().train_loss;
    assert!(last < first, "loss did not decrease: {first} -> {last}");

    let accuracy = evaluate(&model, &test).unwrap();
    assert!((0.0..=1.0).contains(&accuracy));

    let log = std::fs::read_to_string(logger.path().unwrap()).unwrap();
    assert_eq!(log.lines().count(), 15 * buckets.len());

    let checkpoint = dir.path().join("model.bin");
    model.save_checkpoint(&checkpoint).unwrap();
    let restored = ConvClassifier::load_checkpoint(&checkpoint).unwrap();
    assert_eq!(evaluate(&restored, &test).unwrap(), accuracy);
}

#[test]
fn test_data_reuses_training_scale() {
    let train = synthetic(10, 0.0);
    let test = synthetic(4, 0.0);
    let scale = compute_scale(&train.geoms).unwrap();
    let scaled = apply_scale(&test.geoms, scale);

    for (orig, new) in test.geoms.iter().zip(&scaled) {
        let expected = orig.points()[[0, 0]] / scale.value();
        assert!((new.points()[[0, 0]] - expected).abs() < 1e-4);
    }
}
