use std::fmt;

use crate::errors::SyncError;
use crate::sync::estimator::SampleResult;

// @module: Turns per-point offsets into one report with a quality label

/// How well the subtitle lines up, best first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SyncQuality {
    Perfect,
    Good,
    Acceptable,
    Poor,
}

impl fmt::Display for SyncQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Perfect => "PERFECT",
            Self::Good => "GOOD",
            Self::Acceptable => "ACCEPTABLE",
            Self::Poor => "POOR",
        };
        f.write_str(label)
    }
}

/// Upper bounds (exclusive) for one quality label
#[derive(Debug, Clone, Copy)]
pub struct QualityThreshold {
    pub max_abs_mean: f64,
    pub max_stdev: f64,
    pub quality: SyncQuality,
}

// @const: Evaluated in order; anything past the last row is POOR
pub const QUALITY_TABLE: [QualityThreshold; 3] = [
    QualityThreshold { max_abs_mean: 0.3, max_stdev: 0.5, quality: SyncQuality::Perfect },
    QualityThreshold { max_abs_mean: 0.8, max_stdev: 1.0, quality: SyncQuality::Good },
    QualityThreshold { max_abs_mean: 2.0, max_stdev: 2.0, quality: SyncQuality::Acceptable },
];

/// Confidence for a spread of offsets below `max_stdev`
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceBucket {
    pub max_stdev: f64,
    pub confidence: f64,
}

pub const CONFIDENCE_TABLE: [ConfidenceBucket; 3] = [
    ConfidenceBucket { max_stdev: 0.5, confidence: 0.95 },
    ConfidenceBucket { max_stdev: 1.0, confidence: 0.80 },
    ConfidenceBucket { max_stdev: 2.0, confidence: 0.60 },
];

pub const FALLBACK_CONFIDENCE: f64 = 0.40;

// @const: Floor on valid points; configuration can only raise it
pub const MIN_VALID_POINTS: usize = 3;

/// Result of one analysis pass
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    /// (sample point index, median offset) for every valid point
    pub per_point_offsets: Vec<(usize, f64)>,
    /// Mean offset in seconds (positive: speech comes after the subtitle)
    pub mean: f64,
    /// Sample standard deviation of the offsets
    pub stdev: f64,
    pub confidence: f64,
    pub quality: SyncQuality,
    pub valid_points: usize,
    pub total_points: usize,
}

pub fn classify(mean: f64, stdev: f64) -> SyncQuality {
    QUALITY_TABLE.iter()
        .find(|row| mean.abs() < row.max_abs_mean && stdev < row.max_stdev)
        .map(|row| row.quality)
        .unwrap_or(SyncQuality::Poor)
}

pub fn confidence_for(stdev: f64) -> f64 {
    CONFIDENCE_TABLE.iter()
        .find(|bucket| stdev < bucket.max_stdev)
        .map(|bucket| bucket.confidence)
        .unwrap_or(FALLBACK_CONFIDENCE)
}

/// Mean and sample standard deviation (n - 1); a single value has no spread
fn mean_and_stdev(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, variance.sqrt())
}

/// Build a report from sample results, requiring `min_valid` points with an offset
/// (never fewer than `MIN_VALID_POINTS`)
pub fn aggregate(results: &[SampleResult], min_valid: usize) -> Result<SyncReport, SyncError> {
    let per_point_offsets: Vec<(usize, f64)> = results.iter()
        .filter_map(|result| result.median_offset.map(|offset| (result.point.index, offset)))
        .collect();

    let valid_points = per_point_offsets.len();
    let total_points = results.len();
    let required = min_valid.max(MIN_VALID_POINTS);
    if valid_points < required {
        return Err(SyncError::InsufficientData {
            valid: valid_points,
            total: total_points,
            required,
        });
    }

    let offsets: Vec<f64> = per_point_offsets.iter().map(|(_, offset)| *offset).collect();
    let (mean, stdev) = mean_and_stdev(&offsets);

    Ok(SyncReport {
        per_point_offsets,
        mean,
        stdev,
        confidence: confidence_for(stdev),
        quality: classify(mean, stdev),
        valid_points,
        total_points,
    })
}
