/*!
 * Offset estimation at sample points.
 *
 * Every sample point extracts an audio window, transcribes it and pairs each
 * recognized segment with the subtitle entry starting closest to it. The
 * point offset is the median of those pairings.
 *
 * Points run through a bounded pool; transcriptions are additionally gated by
 * a semaphore shared by everything that uses the same transcriber. Each point
 * has a time budget for its own work; waiting for a transcriber permit is not
 * charged to it. A point that fails, runs out of budget or is still running at
 * the pass deadline is dropped, never fatal.
 */

use futures::stream::{self, StreamExt};
use log::{debug, warn};
use std::collections::HashSet;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::app_config::SyncConfig;
use crate::errors::SyncError;
use crate::providers::{AudioExtractor, TranscribedSegment, Transcriber};
use crate::subtitle_processor::{SubtitleEntry, SubtitleTrack};
use crate::sync::progress::ProgressLog;
use crate::sync::sampler::SamplePoint;

/// Outcome of one sample point
#[derive(Debug, Clone, PartialEq)]
pub struct SampleResult {
    pub point: SamplePoint,
    /// speech time minus subtitle start, per matched segment
    pub matched_deltas: Vec<f64>,
    /// `None` when nothing matched or the point was dropped
    pub median_offset: Option<f64>,
    /// Why the point was dropped
    pub failure: Option<String>,
}

impl SampleResult {
    fn matched(point: SamplePoint, matched_deltas: Vec<f64>) -> Self {
        let median_offset = median(&matched_deltas);
        Self {
            point,
            matched_deltas,
            median_offset,
            failure: None,
        }
    }

    fn dropped(point: SamplePoint, reason: impl Into<String>) -> Self {
        Self {
            point,
            matched_deltas: Vec::new(),
            median_offset: None,
            failure: Some(reason.into()),
        }
    }

    /// Whether the point produced an offset
    pub fn is_valid(&self) -> bool {
        self.median_offset.is_some()
    }
}

/// Median; the mean of the two middle values for even counts
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Start (seconds) of the entry nearest to `absolute_secs`, strictly within `tolerance_secs`
///
/// Ties go to the entry that comes first in the track.
fn nearest_entry_start(track: &SubtitleTrack, absolute_secs: f64, tolerance_secs: f64) -> Option<f64> {
    let mut best: Option<(f64, f64)> = None;
    for entry in &track.entries {
        let start = entry.start_secs();
        let distance = (absolute_secs - start).abs();
        if distance < tolerance_secs && best.is_none_or(|(best_distance, _)| distance < best_distance) {
            best = Some((distance, start));
        }
    }
    best.map(|(_, start)| start)
}

/// Pair the first `max_segments` segments of a window at `point_secs` with subtitle entries
pub fn match_deltas(
    point_secs: f64,
    segments: &[TranscribedSegment],
    track: &SubtitleTrack,
    max_segments: usize,
    tolerance_secs: f64,
) -> Vec<f64> {
    segments.iter()
        .take(max_segments)
        .filter_map(|segment| {
            let absolute = point_secs + segment.start_secs;
            nearest_entry_start(track, absolute, tolerance_secs).map(|start| absolute - start)
        })
        .collect()
}

/// Tuning of one estimation pass
#[derive(Debug, Clone)]
pub struct EstimatorSettings {
    pub window_secs: f64,
    pub max_segments: usize,
    pub match_tolerance_secs: f64,
    pub point_timeout: Duration,
    pub analysis_deadline: Duration,
    pub retry_count: u32,
    pub retry_backoff: Duration,
    pub max_concurrent_points: usize,
}

impl From<&SyncConfig> for EstimatorSettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            window_secs: config.window_secs,
            max_segments: config.max_segments_per_point,
            match_tolerance_secs: config.match_tolerance_secs,
            point_timeout: Duration::from_secs(config.point_timeout_secs),
            analysis_deadline: Duration::from_secs(config.analysis_deadline_secs),
            retry_count: config.retry_count,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            max_concurrent_points: config.max_concurrent_points.max(1),
        }
    }
}

/// Inputs shared by every point of one pass
#[derive(Debug, Clone, Copy)]
pub struct PassContext<'a> {
    pub video: &'a Path,
    pub track: &'a SubtitleTrack,
    pub language: Option<&'a str>,
    /// Directory for audio windows; removed by the caller
    pub work_dir: &'a Path,
    /// 1-based pass number, used to keep file names apart
    pub pass: usize,
    pub progress: &'a ProgressLog,
}

// @enum: Why a point produced no deltas
enum PointFailure {
    Failed { error: SyncError, transient: bool },
    OutOfTime,
}

// @struct: Time a point may still spend extracting, transcribing or backing off
struct PointBudget {
    remaining: Duration,
}

impl PointBudget {
    fn new(limit: Duration) -> Self {
        Self { remaining: limit }
    }

    /// Run `future` against the remaining budget; `None` once it is used up
    async fn spend<F: Future>(&mut self, future: F) -> Option<F::Output> {
        let started = Instant::now();
        let output = tokio::time::timeout(self.remaining, future).await.ok();
        self.remaining = self.remaining.saturating_sub(started.elapsed());
        output
    }
}

/// Runs sample points through extraction, transcription and matching
#[derive(Debug, Clone)]
pub struct OffsetEstimator {
    settings: EstimatorSettings,
    extractor: Arc<dyn AudioExtractor>,
    transcriber: Arc<dyn Transcriber>,
    transcriber_gate: Arc<Semaphore>,
}

impl OffsetEstimator {
    pub fn new(
        settings: EstimatorSettings,
        extractor: Arc<dyn AudioExtractor>,
        transcriber: Arc<dyn Transcriber>,
        transcriber_gate: Arc<Semaphore>,
    ) -> Self {
        Self {
            settings,
            extractor,
            transcriber,
            transcriber_gate,
        }
    }

    pub fn settings(&self) -> &EstimatorSettings {
        &self.settings
    }

    /// Analyze every point; results come back in point order
    ///
    /// Only cancellation is an error. Dropped points are reported through
    /// `SampleResult::failure`.
    pub async fn estimate(
        &self,
        ctx: &PassContext<'_>,
        points: &[SamplePoint],
        cancel: &CancellationToken,
    ) -> Result<Vec<SampleResult>, SyncError> {
        let total = points.len();
        let mut pending = stream::iter(points.iter().copied())
            .map(|point| self.process_point(ctx, point, total))
            .buffer_unordered(self.settings.max_concurrent_points.max(1));

        let deadline = tokio::time::sleep_until(Instant::now() + self.settings.analysis_deadline);
        tokio::pin!(deadline);

        let mut results: Vec<SampleResult> = Vec::with_capacity(total);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(SyncError::Cancelled);
                }
                _ = &mut deadline => {
                    warn!("Analysis deadline of {}s reached with {} of {} points finished",
                          self.settings.analysis_deadline.as_secs(), results.len(), total);
                    break;
                }
                next = pending.next() => {
                    match next {
                        Some(result) => results.push(result),
                        None => break,
                    }
                }
            }
        }
        // Unfinished points are dropped with the stream
        drop(pending);

        let finished: HashSet<usize> = results.iter().map(|result| result.point.index).collect();
        for point in points.iter().filter(|point| !finished.contains(&point.index)) {
            ctx.progress.push(format!(
                "Sample point {}/{} at {}: dropped (analysis deadline reached)",
                point.index, total, format_position(point.timestamp_secs)
            ));
            results.push(SampleResult::dropped(*point, "analysis deadline reached"));
        }

        results.sort_by_key(|result| result.point.index);
        Ok(results)
    }

    async fn process_point(&self, ctx: &PassContext<'_>, point: SamplePoint, total: usize) -> SampleResult {
        let position = format_position(point.timestamp_secs);
        let mut budget = PointBudget::new(self.settings.point_timeout);

        let result = match self.analyze_with_retry(ctx, point, &mut budget).await {
            Ok(deltas) => SampleResult::matched(point, deltas),
            Err(PointFailure::Failed { error, .. }) => SampleResult::dropped(point, error.to_string()),
            Err(PointFailure::OutOfTime) => SampleResult::dropped(
                point,
                format!("timed out after {:.1}s", self.settings.point_timeout.as_secs_f64()),
            ),
        };

        match (&result.median_offset, &result.failure) {
            (Some(offset), _) => ctx.progress.push(format!(
                "Sample point {}/{} at {}: offset {:+.3}s from {} matches",
                point.index, total, position, offset, result.matched_deltas.len()
            )),
            (None, Some(reason)) => ctx.progress.push(format!(
                "Sample point {}/{} at {}: dropped ({})",
                point.index, total, position, reason
            )),
            (None, None) => ctx.progress.push(format!(
                "Sample point {}/{} at {}: no dialogue matched a subtitle",
                point.index, total, position
            )),
        }

        result
    }

    async fn analyze_with_retry(
        &self,
        ctx: &PassContext<'_>,
        point: SamplePoint,
        budget: &mut PointBudget,
    ) -> Result<Vec<f64>, PointFailure> {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            match self.analyze_once(ctx, point, attempt, budget).await {
                Ok(deltas) => return Ok(deltas),
                Err(PointFailure::Failed { error, transient: true }) if attempt <= self.settings.retry_count => {
                    let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
                    let backoff = self.settings.retry_backoff.saturating_mul(factor);
                    warn!("Sample point {} attempt {} failed: {}; retrying in {}ms",
                          point.index, attempt, error, backoff.as_millis());
                    budget.spend(tokio::time::sleep(backoff)).await.ok_or(PointFailure::OutOfTime)?;
                }
                Err(failure) => return Err(failure),
            }
        }
    }

    async fn analyze_once(
        &self,
        ctx: &PassContext<'_>,
        point: SamplePoint,
        attempt: u32,
        budget: &mut PointBudget,
    ) -> Result<Vec<f64>, PointFailure> {
        let output = ctx.work_dir.join(format!("pass{}_point{}_try{}.wav", ctx.pass, point.index, attempt));

        let segment = budget
            .spend(self.extractor.extract_audio_segment(ctx.video, point.timestamp_secs, self.settings.window_secs, &output))
            .await
            .ok_or(PointFailure::OutOfTime)?
            .map_err(|e| PointFailure::Failed {
                transient: e.is_transient(),
                error: SyncError::Extraction { point: point.index, message: e.to_string() },
            })?;

        let transcription = {
            // Queueing for a permit is not charged to the point
            let _permit = self.transcriber_gate.acquire().await.map_err(|e| PointFailure::Failed {
                transient: false,
                error: SyncError::Transcription { point: point.index, message: e.to_string() },
            })?;
            budget.spend(self.transcriber.transcribe(&segment, ctx.language)).await
        };
        let _ = tokio::fs::remove_file(&segment.path).await;

        let transcription = transcription
            .ok_or(PointFailure::OutOfTime)?
            .map_err(|e| PointFailure::Failed {
                transient: e.is_transient(),
                error: SyncError::Transcription { point: point.index, message: e.to_string() },
            })?;

        let deltas = match_deltas(
            point.timestamp_secs,
            &transcription.segments,
            ctx.track,
            self.settings.max_segments,
            self.settings.match_tolerance_secs,
        );
        debug!("Sample point {}: {} segments, {} matched", point.index, transcription.segments.len(), deltas.len());
        Ok(deltas)
    }
}

/// "HH:MM:SS,mmm" for a position in seconds
pub(crate) fn format_position(secs: f64) -> String {
    SubtitleEntry::format_timestamp((secs.max(0.0) * 1000.0).round() as u64)
}
