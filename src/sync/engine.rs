/*!
 * Synchronization engine.
 *
 * `SyncEngine::synchronize` runs the whole pipeline for one video/subtitle
 * pair: input checks, version advisories, probing, framerate conversion,
 * language resolution and the refinement loop that alternates analysis passes
 * with corrective shifts until the subtitle lines up or the pass budget runs
 * out.
 */

use log::{debug, warn};
use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::app_config::{Config, SyncConfig};
use crate::errors::{SyncError, ToolError};
use crate::file_utils::{FileManager, FileType};
use crate::language_utils;
use crate::providers::ffmpeg::FfmpegToolkit;
use crate::providers::whisper::WhisperCli;
use crate::providers::{AudioExtractor, MediaInfo, MediaProbe, Transcriber};
use crate::subtitle_processor::SubtitleTrack;
use crate::sync::aggregator::{aggregate, SyncQuality, SyncReport, MIN_VALID_POINTS};
use crate::sync::estimator::{format_position, EstimatorSettings, OffsetEstimator, PassContext};
use crate::sync::framerate::{self, FramerateAdjustment};
use crate::sync::progress::ProgressLog;
use crate::sync::sampler::plan_sample_points;
use crate::sync::version::{compare_versions, detect_version_info, VersionInfo};

/// Per-call knobs of `synchronize`
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOptions {
    /// Sample points per analysis pass
    pub num_samples: usize,
    /// Analysis passes allowed
    pub max_iterations: usize,
    /// Mean offset (seconds) treated as already in sync
    pub negligible_threshold: f64,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            num_samples: 5,
            max_iterations: 5,
            negligible_threshold: 0.1,
        }
    }
}

impl From<&SyncConfig> for SyncOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            num_samples: config.num_samples,
            max_iterations: config.max_iterations,
            negligible_threshold: config.negligible_threshold,
        }
    }
}

impl SyncOptions {
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.num_samples == 0 {
            return Err(SyncError::Configuration("num_samples must be at least 1".to_string()));
        }
        if self.max_iterations == 0 {
            return Err(SyncError::Configuration("max_iterations must be at least 1".to_string()));
        }
        if !(self.negligible_threshold >= 0.0) {
            return Err(SyncError::Configuration(format!(
                "negligible_threshold must not be negative (got {})",
                self.negligible_threshold
            )));
        }
        Ok(())
    }
}

/// How a successful run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// The subtitle lines up with the dialogue
    Converged,
    /// The pass budget ran out; the output is the best effort
    Exhausted,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Converged => f.write_str("converged"),
            Self::Exhausted => f.write_str("exhausted"),
        }
    }
}

/// Result of a successful run
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub status: SyncStatus,
    /// Report of the last analysis pass
    pub report: SyncReport,
    /// Corrected subtitle, SRT encoded
    pub corrected_srt: Vec<u8>,
    /// Sum of all shifts applied, in seconds
    pub total_correction_secs: f64,
    /// Analysis passes run
    pub iterations: usize,
    /// Report of every pass, oldest first
    pub history: Vec<SyncReport>,
    pub video_fps: f64,
    /// Framerate the subtitle appears to be authored for
    pub subtitle_fps: Option<f64>,
    pub framerate_adjustment: Option<FramerateAdjustment>,
    /// Language hint used for transcription
    pub language: Option<String>,
    pub video_version: VersionInfo,
    pub subtitle_version: VersionInfo,
    /// Release mismatch notes, attached when the result is POOR
    pub advisories: Vec<String>,
    pub warnings: Vec<String>,
}

impl SyncOutcome {
    /// Write the corrected subtitle to `path`
    ///
    /// A failed write is reported like any other fatal error of the run, with
    /// every release advisory attached.
    pub fn write_corrected(&self, path: &Path) -> Result<(), FailureDiagnostic> {
        FileManager::write_bytes(path, &self.corrected_srt).map_err(|e| {
            let error = SyncError::Serialization(format!("{:#}", e));
            FailureDiagnostic {
                hints: failure_hints(&error),
                error,
                advisories: compare_versions(&self.video_version, &self.subtitle_version),
                video_version: self.video_version.clone(),
                subtitle_version: self.subtitle_version.clone(),
                language: self.language.clone(),
                iterations: self.iterations,
            }
        })
    }
}

/// Why a run failed, with whatever context was gathered
#[derive(Debug, Clone)]
pub struct FailureDiagnostic {
    pub error: SyncError,
    pub advisories: Vec<String>,
    /// Likely causes worth checking
    pub hints: Vec<String>,
    pub video_version: VersionInfo,
    pub subtitle_version: VersionInfo,
    pub language: Option<String>,
    /// Analysis passes started before the failure
    pub iterations: usize,
}

impl fmt::Display for FailureDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;
        for advisory in &self.advisories {
            write!(f, "\n  advisory: {}", advisory)?;
        }
        Ok(())
    }
}

impl std::error::Error for FailureDiagnostic {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Framerate facts gathered before analysis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FramerateCheck {
    pub video_fps: f64,
    pub subtitle_fps: Option<f64>,
    pub adjustment: Option<FramerateAdjustment>,
}

/// Likely causes for a failure, shown to the user
pub fn failure_hints(error: &SyncError) -> Vec<String> {
    let hints: &[&str] = match error {
        SyncError::InsufficientData { .. } => &[
            "The subtitle may belong to a different release or cut of the video",
            "The subtitle language may differ from the spoken language",
            "The sampled windows may contain music or little dialogue; try more samples",
        ],
        SyncError::Probe(_) => &["The video file may be damaged or ffprobe may be missing"],
        SyncError::Configuration(_) => &["Check that both files exist and the subtitle is a valid SRT file"],
        SyncError::Serialization(_) => &["Check that the output location is writable"],
        _ => &[],
    };
    hints.iter().map(|hint| hint.to_string()).collect()
}

// @struct: Context gathered while a run progresses, kept for diagnostics
#[derive(Debug, Default)]
struct RunState {
    language: Option<String>,
    iterations: usize,
}

/// Aligns subtitle tracks to the dialogue of a video
#[derive(Debug, Clone)]
pub struct SyncEngine {
    config: SyncConfig,
    probe: Arc<dyn MediaProbe>,
    extractor: Arc<dyn AudioExtractor>,
    transcriber: Arc<dyn Transcriber>,
    transcriber_gate: Arc<Semaphore>,
    estimator: OffsetEstimator,
}

impl SyncEngine {
    pub fn new(
        config: SyncConfig,
        probe: Arc<dyn MediaProbe>,
        extractor: Arc<dyn AudioExtractor>,
        transcriber: Arc<dyn Transcriber>,
    ) -> Self {
        let transcriber_gate = Arc::new(Semaphore::new(config.transcriber_capacity.max(1)));
        let estimator = OffsetEstimator::new(
            EstimatorSettings::from(&config),
            extractor.clone(),
            transcriber.clone(),
            transcriber_gate.clone(),
        );

        Self {
            config,
            probe,
            extractor,
            transcriber,
            transcriber_gate,
            estimator,
        }
    }

    /// Engine backed by ffmpeg/ffprobe and whisper.cpp
    pub fn from_config(config: &Config) -> Self {
        let toolkit = Arc::new(FfmpegToolkit::from_config(&config.tools));
        let transcriber = Arc::new(WhisperCli::from_config(&config.tools));
        Self::new(config.sync.clone(), toolkit.clone(), toolkit, transcriber)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Synchronize `subtitle` against `video` without observers
    pub async fn synchronize(
        &self,
        video: &Path,
        subtitle: &Path,
        options: &SyncOptions,
    ) -> Result<SyncOutcome, FailureDiagnostic> {
        let progress = ProgressLog::new();
        let cancel = CancellationToken::new();
        self.synchronize_with(video, subtitle, options, &progress, &cancel).await
    }

    /// Synchronize while reporting to `progress` and honoring `cancel`
    ///
    /// The progress log is completed on success and on failure.
    pub async fn synchronize_with(
        &self,
        video: &Path,
        subtitle: &Path,
        options: &SyncOptions,
        progress: &ProgressLog,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome, FailureDiagnostic> {
        let video_version = detect_version_info(&video.to_string_lossy());
        let subtitle_version = detect_version_info(&subtitle.to_string_lossy());
        let advisories = compare_versions(&video_version, &subtitle_version);

        let mut state = RunState::default();
        let result = self
            .run(video, subtitle, options, progress, cancel, &video_version, &subtitle_version, &advisories, &mut state)
            .await;

        match result {
            Ok(outcome) => {
                progress.push(format!(
                    "Synchronization {} after {} pass(es): total correction {:+.3}s, quality {}",
                    outcome.status, outcome.iterations, outcome.total_correction_secs, outcome.report.quality
                ));
                progress.complete();
                Ok(outcome)
            }
            Err(error) => {
                progress.push(format!("Synchronization failed: {}", error));
                let hints = failure_hints(&error);
                for hint in &hints {
                    progress.push(format!("Hint: {}", hint));
                }
                progress.complete();
                Err(FailureDiagnostic {
                    error,
                    advisories,
                    hints,
                    video_version,
                    subtitle_version,
                    language: state.language,
                    iterations: state.iterations,
                })
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run(
        &self,
        video: &Path,
        subtitle: &Path,
        options: &SyncOptions,
        progress: &ProgressLog,
        cancel: &CancellationToken,
        video_version: &VersionInfo,
        subtitle_version: &VersionInfo,
        advisories: &[String],
        state: &mut RunState,
    ) -> Result<SyncOutcome, SyncError> {
        options.validate()?;

        progress.push("Checking input files");
        FileManager::ensure_readable(video)
            .map_err(|e| SyncError::Configuration(format!("video: {:#}", e)))?;
        FileManager::ensure_readable(subtitle)
            .map_err(|e| SyncError::Configuration(format!("subtitle: {:#}", e)))?;
        check_input_types(video, subtitle)?;
        let mut track = SubtitleTrack::from_file(subtitle)?;
        progress.push(format!("Loaded {} subtitle entries", track.len()));

        progress.push(format!("Video release: {}", video_version));
        progress.push(format!("Subtitle release: {}", subtitle_version));
        for advisory in advisories {
            warn!("{}", advisory);
            progress.push(format!("Advisory: {}", advisory));
        }

        progress.push("Probing video");
        let media = cancellable(cancel, self.probe.probe(video)).await?
            .map_err(|e| SyncError::Probe(e.to_string()))?;
        if !(media.duration_secs.is_finite() && media.duration_secs > 0.0) {
            return Err(SyncError::Probe(format!("invalid video duration {}", media.duration_secs)));
        }
        progress.push(format!("Video duration {}", format_position(media.duration_secs)));

        let framerate = self.prepare_track(&mut track, &media, progress)?;

        let work_dir = tempfile::Builder::new()
            .prefix("resub-")
            .tempdir()
            .map_err(|e| SyncError::Configuration(format!("cannot create work directory: {}", e)))?;

        let mut warnings = Vec::new();
        let language = self.resolve_language(video, &media, work_dir.path(), progress, cancel, &mut warnings).await?;
        state.language = language.clone();

        let points = plan_sample_points(media.duration_secs, options.num_samples);
        let mut history: Vec<SyncReport> = Vec::new();
        let mut total_correction_secs = 0.0;

        let status = loop {
            state.iterations += 1;
            let pass = state.iterations;
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            progress.push(format!(
                "Analysis pass {}/{}: sampling {} points",
                pass, options.max_iterations, points.len()
            ));
            let ctx = PassContext {
                video,
                track: &track,
                language: language.as_deref(),
                work_dir: work_dir.path(),
                pass,
                progress,
            };
            let results = self.estimator.estimate(&ctx, &points, cancel).await?;
            let report = aggregate(&results, self.config.min_valid_points)?;
            progress.push(format!(
                "Pass {}: mean offset {:+.3}s, stdev {:.3}s, quality {}, confidence {:.0}%, {}/{} points",
                pass, report.mean, report.stdev, report.quality, report.confidence * 100.0,
                report.valid_points, report.total_points
            ));
            let mean = report.mean;
            let quality = report.quality;
            history.push(report);

            if quality == SyncQuality::Perfect {
                break SyncStatus::Converged;
            }
            if mean.abs() <= options.negligible_threshold {
                progress.push(format!("Offset {:+.3}s is negligible; no correction needed", mean));
                break SyncStatus::Converged;
            }
            if pass >= options.max_iterations {
                let warning = format!(
                    "Stopped after {} passes with a remaining offset of {:+.3}s",
                    pass, mean
                );
                warn!("{}", warning);
                warnings.push(warning);
                break SyncStatus::Exhausted;
            }

            let clamped = track.shift(mean);
            total_correction_secs += (mean * 1000.0).round() / 1000.0;
            progress.push(format!("Shifting subtitles by {:+.3}s", mean));
            if clamped > 0 {
                let warning = format!(
                    "Pass {}: {} subtitle entries were clamped at 00:00:00,000; they moved less than {:+.3}s",
                    pass, clamped, mean
                );
                progress.push(warning.clone());
                warnings.push(warning);
            }
        };

        let report = history.last().cloned().ok_or_else(|| {
            SyncError::InsufficientData {
                valid: 0,
                total: 0,
                required: self.config.min_valid_points.max(MIN_VALID_POINTS),
            }
        })?;

        if report.valid_points < report.total_points {
            warnings.push(format!(
                "{} of {} sample points were dropped",
                report.total_points - report.valid_points,
                report.total_points
            ));
        }

        progress.push("Writing corrected subtitles");
        let corrected_srt = track.to_srt_bytes()
            .map_err(|e| SyncError::Serialization(e.to_string()))?;

        let advisories = if report.quality == SyncQuality::Poor {
            advisories.to_vec()
        } else {
            Vec::new()
        };

        Ok(SyncOutcome {
            status,
            report,
            corrected_srt,
            total_correction_secs,
            iterations: state.iterations,
            history,
            video_fps: framerate.video_fps,
            subtitle_fps: framerate.subtitle_fps,
            framerate_adjustment: framerate.adjustment,
            language,
            video_version: video_version.clone(),
            subtitle_version: subtitle_version.clone(),
            advisories,
            warnings,
        })
    }

    /// Detect the subtitle framerate and rescale the track to the video when they differ
    pub fn prepare_track(
        &self,
        track: &mut SubtitleTrack,
        media: &MediaInfo,
        progress: &ProgressLog,
    ) -> Result<FramerateCheck, SyncError> {
        let video_fps = framerate::video_framerate(media)?;
        let subtitle_fps = framerate::detect_subtitle_framerate(track);

        match subtitle_fps {
            Some(fps) => progress.push(format!("Video framerate {:.3} fps, subtitle framerate {:.3} fps", video_fps, fps)),
            None => progress.push(format!("Video framerate {:.3} fps, subtitle framerate unknown", video_fps)),
        }

        let adjustment = match subtitle_fps {
            Some(fps) if self.config.convert_framerate
                && framerate::needs_conversion(video_fps, fps, self.config.framerate_tolerance) =>
            {
                let adjustment = framerate::convert_framerate(track, fps, video_fps)?;
                progress.push(format!(
                    "Converted subtitle timing from {:.3} to {:.3} fps (x{:.5})",
                    adjustment.from_fps, adjustment.to_fps, adjustment.ratio
                ));
                Some(adjustment)
            }
            Some(fps) if framerate::needs_conversion(video_fps, fps, self.config.framerate_tolerance) => {
                warn!("Subtitle framerate {:.3} differs from video {:.3} but conversion is disabled", fps, video_fps);
                None
            }
            _ => None,
        };

        Ok(FramerateCheck {
            video_fps,
            subtitle_fps,
            adjustment,
        })
    }

    async fn resolve_language(
        &self,
        video: &Path,
        media: &MediaInfo,
        work_dir: &Path,
        progress: &ProgressLog,
        cancel: &CancellationToken,
        warnings: &mut Vec<String>,
    ) -> Result<Option<String>, SyncError> {
        if let Some(configured) = &self.config.language {
            let language = language_utils::normalize_language_hint(configured)
                .map_err(|e| SyncError::Configuration(e.to_string()))?;
            progress.push(format!("Using configured language {}", describe_language(&language)));
            return Ok(Some(language));
        }

        if !self.config.detect_language {
            progress.push("Language detection disabled; transcribing without a language hint");
            return Ok(None);
        }

        let (start, length) = language_sample_window(
            media.duration_secs,
            self.config.language_sample_start_secs,
            self.config.language_sample_secs,
        );
        progress.push(format!("Detecting spoken language from {:.0}s of audio at {}", length, format_position(start)));

        let output = work_dir.join("language_sample.wav");
        let detection = async {
            let segment = self.extractor.extract_audio_segment(video, start, length, &output).await?;
            let _permit = self.transcriber_gate.acquire().await.map_err(|e| ToolError::Launch {
                tool: "transcriber".to_string(),
                message: e.to_string(),
            })?;
            let transcription = self.transcriber.transcribe(&segment, None).await;
            let _ = tokio::fs::remove_file(&segment.path).await;
            transcription
        };
        let timed = tokio::time::timeout(self.estimator.settings().point_timeout, detection);

        let detected = match cancellable(cancel, timed).await? {
            Ok(Ok(transcription)) => transcription.language
                .filter(|language| !language.trim().is_empty() && language != "auto"),
            Ok(Err(e)) => {
                debug!("Language detection error: {}", e);
                None
            }
            Err(_) => None,
        };

        match detected {
            Some(language) => {
                let language = language_utils::normalize_language_hint(&language).unwrap_or(language);
                progress.push(format!("Detected language {}", describe_language(&language)));
                Ok(Some(language))
            }
            None => {
                let warning = "Language detection failed; transcribing without a language hint".to_string();
                warn!("{}", warning);
                progress.push(warning.clone());
                warnings.push(warning);
                Ok(None)
            }
        }
    }
}

/// Reject a video that is an SRT file or a subtitle that is a video
fn check_input_types(video: &Path, subtitle: &Path) -> Result<(), SyncError> {
    let detect = |label: &str, path: &Path| {
        FileManager::detect_file_type(path)
            .map_err(|e| SyncError::Configuration(format!("{}: {:#}", label, e)))
    };

    if detect("video", video)? == FileType::Subtitle {
        return Err(SyncError::Configuration(format!(
            "video {:?} is a subtitle file; are the arguments swapped?", video
        )));
    }
    if detect("subtitle", subtitle)? == FileType::Video {
        return Err(SyncError::Configuration(format!(
            "subtitle {:?} is a video file; are the arguments swapped?", subtitle
        )));
    }
    Ok(())
}

/// Start and length of the language sample, kept inside the video
pub fn language_sample_window(duration_secs: f64, start_secs: f64, length_secs: f64) -> (f64, f64) {
    if duration_secs <= length_secs {
        return (0.0, duration_secs);
    }
    (start_secs.min(duration_secs - length_secs).max(0.0), length_secs)
}

fn describe_language(code: &str) -> String {
    match language_utils::get_language_name(code) {
        Ok(name) => format!("{} ({})", name, code),
        Err(_) => code.to_string(),
    }
}

/// Await `future` unless `cancel` fires first
async fn cancellable<F: Future>(cancel: &CancellationToken, future: F) -> Result<F::Output, SyncError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SyncError::Cancelled),
        output = future => Ok(output),
    }
}
