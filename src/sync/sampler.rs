// @module: Sample point planning

/// A position in the video where dialogue is sampled
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplePoint {
    /// 1-based index
    pub index: usize,
    /// Position in the video, in seconds
    pub timestamp_secs: f64,
}

/// Spread `count` points evenly over the interior of `duration_secs`
///
/// Point `i` sits at `i * duration / (count + 1)`, so neither end of the video
/// is sampled.
pub fn plan_sample_points(duration_secs: f64, count: usize) -> Vec<SamplePoint> {
    if count == 0 || !(duration_secs.is_finite() && duration_secs > 0.0) {
        return Vec::new();
    }

    let step = duration_secs / (count + 1) as f64;
    (1..=count)
        .map(|index| SamplePoint {
            index,
            timestamp_secs: step * index as f64,
        })
        .collect()
}
