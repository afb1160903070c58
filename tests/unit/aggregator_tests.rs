/*!
 * Tests for report aggregation
 */

use rand::Rng;
use resub::errors::SyncError;
use resub::sync::aggregator::{aggregate, classify, confidence_for};
use resub::sync::estimator::SampleResult;
use resub::sync::sampler::SamplePoint;
use resub::sync::SyncQuality;

fn result(index: usize, offset: Option<f64>) -> SampleResult {
    SampleResult {
        point: SamplePoint { index, timestamp_secs: index as f64 * 600.0 },
        matched_deltas: offset.into_iter().collect(),
        median_offset: offset,
        failure: None,
    }
}

#[test]
fn test_aggregate_withSmallSpread_shouldBePerfect() {
    let results = vec![result(1, Some(0.25)), result(2, Some(0.30)), result(3, Some(0.28))];
    let report = aggregate(&results, 3).unwrap();

    assert!((report.mean - 0.27667).abs() < 1e-4);
    assert!((report.stdev - 0.02517).abs() < 1e-4);
    assert_eq!(report.quality, SyncQuality::Perfect);
    assert_eq!(report.confidence, 0.95);
    assert_eq!(report.per_point_offsets, vec![(1, 0.25), (2, 0.30), (3, 0.28)]);
}

#[test]
fn test_aggregate_withDroppedPoints_shouldCountOnlyValidOnes() {
    let results = vec![
        result(1, Some(-1.0)),
        result(2, None),
        result(3, Some(-1.2)),
        result(4, Some(-0.8)),
        result(5, None),
    ];
    let report = aggregate(&results, 3).unwrap();

    assert_eq!(report.valid_points, 3);
    assert_eq!(report.total_points, 5);
    assert!((report.mean + 1.0).abs() < 1e-9);
    assert_eq!(report.quality, SyncQuality::Acceptable);
    assert_eq!(report.per_point_offsets.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![1, 3, 4]);
}

#[test]
fn test_aggregate_withTooFewValidPoints_shouldReportInsufficientData() {
    let results = vec![result(1, Some(0.1)), result(2, None), result(3, Some(0.2))];
    assert_eq!(
        aggregate(&results, 3),
        Err(SyncError::InsufficientData { valid: 2, total: 3, required: 3 })
    );
}

#[test]
fn test_aggregate_withSingleValidPoint_shouldReportInsufficientData() {
    assert_eq!(
        aggregate(&[result(1, Some(4.0))], 1),
        Err(SyncError::InsufficientData { valid: 1, total: 1, required: 3 })
    );
}

#[test]
fn test_aggregate_withLoweredMinimum_shouldStillRequireThreePoints() {
    let results = vec![result(1, Some(0.5)), result(2, Some(0.6)), result(3, None)];
    assert_eq!(
        aggregate(&results, 0),
        Err(SyncError::InsufficientData { valid: 2, total: 3, required: 3 })
    );
}

#[test]
fn test_aggregate_withRaisedMinimum_shouldUseConfiguredValue() {
    let results = vec![result(1, Some(0.5)), result(2, Some(0.6)), result(3, Some(0.4))];
    assert_eq!(
        aggregate(&results, 4),
        Err(SyncError::InsufficientData { valid: 3, total: 3, required: 4 })
    );
}

#[test]
fn test_classify_withNegativeMean_shouldUseMagnitude() {
    assert_eq!(classify(-0.1, 0.1), classify(0.1, 0.1));
    assert_eq!(classify(-1.5, 0.1), SyncQuality::Acceptable);
    assert_eq!(classify(-2.5, 0.1), SyncQuality::Poor);
}

#[test]
fn test_classify_withLargerOffsetsOrSpread_shouldNeverImprove() {
    let mut rng = rand::rng();
    for _ in 0..500 {
        let mean: f64 = rng.random_range(-3.0..3.0);
        let stdev: f64 = rng.random_range(0.0..3.0);
        let worse_mean = mean + mean.signum() * rng.random_range(0.0..1.0);
        let worse_stdev = stdev + rng.random_range(0.0..1.0);

        let base = classify(mean, stdev);
        assert!(classify(worse_mean, stdev) >= base);
        assert!(classify(mean, worse_stdev) >= base);
        assert!(confidence_for(worse_stdev) <= confidence_for(stdev));
    }
}
