/*!
 * End-to-end synchronization over mock media and transcription
 */

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use anyhow::Result;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use resub::app_config::SyncConfig;
use resub::errors::SyncError;
use resub::providers::mock::{MockBehavior, MockMedia, ScriptedTranscriber};
use resub::subtitle_processor::{SubtitleEntry, SubtitleTrack};
use resub::sync::{ProgressLog, SyncOptions, SyncQuality, SyncStatus, COMPLETION_MARKER};
use crate::common;

// @struct: Video placeholder and synthetic subtitle in a temp dir
struct Fixture {
    _dir: TempDir,
    video: PathBuf,
    subtitle: PathBuf,
}

fn fixture(video_name: &str, subtitle_name: &str) -> Result<Fixture> {
    common::init_test_logging();
    let dir = common::create_temp_dir()?;
    let video = common::create_video_placeholder(dir.path(), video_name)?;
    let subtitle = common::write_synthetic_subtitle(dir.path(), subtitle_name)?;
    Ok(Fixture { _dir: dir, video, subtitle })
}

fn default_fixture() -> Result<Fixture> {
    fixture("movie.mkv", "movie.srt")
}

fn options(config: &SyncConfig) -> SyncOptions {
    SyncOptions::from(config)
}

fn corrected_track(bytes: &[u8]) -> Result<SubtitleTrack> {
    Ok(SubtitleTrack::from_bytes(PathBuf::from("corrected.srt"), bytes)?)
}

#[tokio::test]
async fn test_synchronize_withConstantDelay_shouldConvergeInTwoPasses() -> Result<()> {
    let files = default_fixture()?;
    let config = common::test_sync_config();
    let transcriber = Arc::new(ScriptedTranscriber::working(common::dialogue_with_offset(1.5)));
    let engine = common::mock_engine(config.clone(), &common::synthetic_media(), transcriber);

    let outcome = engine.synchronize(&files.video, &files.subtitle, &options(&config)).await?;

    assert_eq!(outcome.status, SyncStatus::Converged);
    assert_eq!(outcome.iterations, 2);
    assert!((outcome.total_correction_secs - 1.5).abs() < 1e-9);
    assert_eq!(outcome.history[0].quality, SyncQuality::Acceptable);
    assert_eq!(outcome.report.quality, SyncQuality::Perfect);
    assert_eq!(outcome.report.valid_points, 5);
    assert_eq!(outcome.language.as_deref(), Some("en"));
    assert!(outcome.advisories.is_empty());

    let corrected = corrected_track(&outcome.corrected_srt)?;
    assert_eq!(corrected.len(), common::synthetic_entries().len());
    assert_eq!(corrected.entries[0].format_start_time(), "00:00:11,500");
    assert_eq!(corrected.entries[0].format_end_time(), "00:00:14,500");
    Ok(())
}

#[tokio::test]
async fn test_synchronize_withEarlySpeech_shouldShiftBackwards() -> Result<()> {
    let files = default_fixture()?;
    let config = common::test_sync_config();
    let transcriber = Arc::new(ScriptedTranscriber::working(common::dialogue_with_offset(-2.0)));
    let engine = common::mock_engine(config.clone(), &common::synthetic_media(), transcriber);

    let outcome = engine.synchronize(&files.video, &files.subtitle, &options(&config)).await?;

    assert_eq!(outcome.status, SyncStatus::Converged);
    assert_eq!(outcome.history[0].quality, SyncQuality::Poor);
    assert!((outcome.total_correction_secs + 2.0).abs() < 1e-9);

    let corrected = corrected_track(&outcome.corrected_srt)?;
    assert_eq!(corrected.entries[0].start_time_ms, 8_000);
    Ok(())
}

#[tokio::test]
async fn test_synchronize_withAlignedSubtitle_shouldStopAfterOnePass() -> Result<()> {
    let files = default_fixture()?;
    let config = common::test_sync_config();
    let transcriber = Arc::new(ScriptedTranscriber::working(common::dialogue_with_offset(0.05)));
    let engine = common::mock_engine(config.clone(), &common::synthetic_media(), transcriber);

    let outcome = engine.synchronize(&files.video, &files.subtitle, &options(&config)).await?;

    assert_eq!(outcome.status, SyncStatus::Converged);
    assert_eq!(outcome.iterations, 1);
    assert_eq!(outcome.total_correction_secs, 0.0);
    assert_eq!(outcome.corrected_srt, std::fs::read(&files.subtitle)?);
    Ok(())
}

#[tokio::test]
async fn test_synchronize_withOffsetBelowThreshold_shouldNotShift() -> Result<()> {
    let files = default_fixture()?;
    let config = SyncConfig { negligible_threshold: 2.0, ..common::test_sync_config() };
    let transcriber = Arc::new(ScriptedTranscriber::working(common::dialogue_with_offset(1.5)));
    let engine = common::mock_engine(config.clone(), &common::synthetic_media(), transcriber);

    let outcome = engine.synchronize(&files.video, &files.subtitle, &options(&config)).await?;

    assert_eq!(outcome.status, SyncStatus::Converged);
    assert_eq!(outcome.iterations, 1);
    assert_eq!(outcome.report.quality, SyncQuality::Acceptable);
    assert_eq!(outcome.total_correction_secs, 0.0);
    Ok(())
}

#[tokio::test]
async fn test_synchronize_withSinglePassBudget_shouldReturnBestEffort() -> Result<()> {
    let files = default_fixture()?;
    let config = SyncConfig { max_iterations: 1, ..common::test_sync_config() };
    let transcriber = Arc::new(ScriptedTranscriber::working(common::dialogue_with_offset(1.5)));
    let engine = common::mock_engine(config.clone(), &common::synthetic_media(), transcriber);

    let outcome = engine.synchronize(&files.video, &files.subtitle, &options(&config)).await?;

    assert_eq!(outcome.status, SyncStatus::Exhausted);
    assert_eq!(outcome.iterations, 1);
    assert_eq!(outcome.total_correction_secs, 0.0);
    assert!(outcome.warnings.iter().any(|w| w.contains("Stopped after 1 passes")));
    let corrected = corrected_track(&outcome.corrected_srt)?;
    assert_eq!(corrected.entries[0].start_time_ms, common::FIRST_ENTRY_MS);
    Ok(())
}

#[tokio::test]
async fn test_synchronize_withMismatchedReleaseAndPoorResult_shouldAttachAdvisories() -> Result<()> {
    let files = fixture("Film.2018.1080p.BluRay.x264-GROUPA.mkv", "Film.2018.720p.WEBRip.x264-GROUPB.srt")?;
    let config = SyncConfig { max_iterations: 1, ..common::test_sync_config() };
    let transcriber = Arc::new(ScriptedTranscriber::working(common::dialogue_with_offset(-2.5)));
    let engine = common::mock_engine(config.clone(), &common::synthetic_media(), transcriber);

    let outcome = engine.synchronize(&files.video, &files.subtitle, &options(&config)).await?;

    assert_eq!(outcome.report.quality, SyncQuality::Poor);
    assert_eq!(outcome.advisories.len(), 2);
    assert_eq!(outcome.subtitle_version.release_group.as_deref(), Some("GROUPB"));
    Ok(())
}

#[tokio::test]
async fn test_synchronize_withMismatchedReleaseAndGoodResult_shouldOnlyLogAdvisories() -> Result<()> {
    let files = fixture("Film.2018.1080p.BluRay.x264-GROUPA.mkv", "Film.2018.720p.WEBRip.x264-GROUPB.srt")?;
    let config = common::test_sync_config();
    let transcriber = Arc::new(ScriptedTranscriber::working(common::dialogue_with_offset(0.0)));
    let engine = common::mock_engine(config.clone(), &common::synthetic_media(), transcriber);
    let progress = ProgressLog::new();

    let outcome = engine
        .synchronize_with(&files.video, &files.subtitle, &options(&config), &progress, &CancellationToken::new())
        .await?;

    assert!(outcome.advisories.is_empty());
    assert!(progress.lines().iter().any(|line| line.starts_with("Advisory: Source mismatch")));
    Ok(())
}

#[tokio::test]
async fn test_synchronize_withDialogueInTwoWindows_shouldReportInsufficientData() -> Result<()> {
    let files = default_fixture()?;
    let config = common::test_sync_config();
    let dialogue: Vec<f64> = common::dialogue_with_offset(1.0)
        .into_iter()
        .filter(|t| (600.0..645.0).contains(t) || (1200.0..1245.0).contains(t))
        .collect();
    let transcriber = Arc::new(ScriptedTranscriber::working(dialogue));
    let engine = common::mock_engine(config.clone(), &common::synthetic_media(), transcriber);
    let progress = ProgressLog::new();

    let failure = engine
        .synchronize_with(&files.video, &files.subtitle, &options(&config), &progress, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(failure.error, SyncError::InsufficientData { valid: 2, total: 5, required: 3 });
    assert_eq!(failure.iterations, 1);
    assert!(!failure.hints.is_empty());
    assert!(progress.is_complete());
    assert_eq!(progress.lines().last().map(String::as_str), Some(COMPLETION_MARKER));
    Ok(())
}

#[tokio::test]
async fn test_synchronize_withLoweredMinimum_shouldStillRequireThreePoints() -> Result<()> {
    let files = default_fixture()?;
    let config = SyncConfig { min_valid_points: 1, ..common::test_sync_config() };
    let dialogue: Vec<f64> = common::dialogue_with_offset(1.0)
        .into_iter()
        .filter(|t| (600.0..645.0).contains(t) || (1200.0..1245.0).contains(t))
        .collect();
    let transcriber = Arc::new(ScriptedTranscriber::working(dialogue));
    let engine = common::mock_engine(config.clone(), &common::synthetic_media(), transcriber);

    let failure = engine.synchronize(&files.video, &files.subtitle, &options(&config)).await.unwrap_err();

    assert_eq!(failure.error, SyncError::InsufficientData { valid: 2, total: 5, required: 3 });
    Ok(())
}

#[tokio::test]
async fn test_synchronize_withDefaultConcurrencyAndSlowTranscriber_shouldKeepQueuedPoints() -> Result<()> {
    let files = default_fixture()?;
    let config = SyncConfig { point_timeout_secs: 1, ..common::test_sync_config() };
    assert_eq!((config.max_concurrent_points, config.transcriber_capacity), (2, 1));
    let transcriber = Arc::new(ScriptedTranscriber::new(
        common::dialogue_with_offset(0.0),
        MockBehavior::Slow { delay_ms: 600 },
    ));
    let engine = common::mock_engine(config.clone(), &common::synthetic_media(), transcriber);

    let outcome = engine.synchronize(&files.video, &files.subtitle, &options(&config)).await?;

    assert_eq!(outcome.report.valid_points, 5);
    assert!(outcome.warnings.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_synchronize_withEntriesNearStart_shouldWarnAboutClamping() -> Result<()> {
    let files = default_fixture()?;
    let mut entries = vec![SubtitleEntry::new(1, 500, 1_500, "Opening".to_string())];
    entries.extend(common::synthetic_entries().into_iter().map(|mut entry| {
        entry.seq_num += 1;
        entry
    }));
    SubtitleTrack::with_entries(files.subtitle.clone(), entries).write_to_srt(&files.subtitle)?;

    let config = SyncConfig { convert_framerate: false, ..common::test_sync_config() };
    let transcriber = Arc::new(ScriptedTranscriber::working(common::dialogue_with_offset(-2.0)));
    let engine = common::mock_engine(config.clone(), &common::synthetic_media(), transcriber);

    let outcome = engine.synchronize(&files.video, &files.subtitle, &options(&config)).await?;

    assert_eq!(outcome.status, SyncStatus::Converged);
    assert!(outcome.warnings.iter().any(|w| w.starts_with("Pass 1: 1 subtitle entries were clamped")));
    let corrected = corrected_track(&outcome.corrected_srt)?;
    assert_eq!(corrected.entries[0].start_time_ms, 0);
    assert_eq!(corrected.entries[1].start_time_ms, common::FIRST_ENTRY_MS - 2_000);
    Ok(())
}

#[tokio::test]
async fn test_synchronize_withSwappedArguments_shouldFailBeforeAnalysis() -> Result<()> {
    let files = default_fixture()?;
    let config = common::test_sync_config();
    let transcriber = Arc::new(ScriptedTranscriber::working(common::dialogue_with_offset(1.0)));
    let engine = common::mock_engine(config.clone(), &common::synthetic_media(), transcriber.clone());

    let failure = engine.synchronize(&files.subtitle, &files.video, &options(&config)).await.unwrap_err();

    assert!(matches!(&failure.error, SyncError::Configuration(message) if message.contains("swapped")));
    assert_eq!(failure.iterations, 0);
    assert_eq!(transcriber.request_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_write_corrected_withUnwritableOutput_shouldReportSerializationWithAdvisories() -> Result<()> {
    let files = fixture("Film.2018.1080p.BluRay.x264-GROUPA.mkv", "Film.2018.720p.WEBRip.x264-GROUPB.srt")?;
    let config = common::test_sync_config();
    let transcriber = Arc::new(ScriptedTranscriber::working(common::dialogue_with_offset(0.0)));
    let engine = common::mock_engine(config.clone(), &common::synthetic_media(), transcriber);

    let outcome = engine.synchronize(&files.video, &files.subtitle, &options(&config)).await?;
    assert!(outcome.advisories.is_empty());

    // The subtitle is a file, so nothing can be created below it
    let failure = outcome.write_corrected(&files.subtitle.join("corrected.srt")).unwrap_err();

    assert!(matches!(failure.error, SyncError::Serialization(_)));
    assert_eq!(failure.advisories.len(), 2);
    assert!(!failure.hints.is_empty());
    assert_eq!(failure.iterations, outcome.iterations);
    Ok(())
}

#[tokio::test]
async fn test_write_corrected_withWritableOutput_shouldSaveCorrectedBytes() -> Result<()> {
    let files = default_fixture()?;
    let config = common::test_sync_config();
    let transcriber = Arc::new(ScriptedTranscriber::working(common::dialogue_with_offset(1.5)));
    let engine = common::mock_engine(config.clone(), &common::synthetic_media(), transcriber);

    let outcome = engine.synchronize(&files.video, &files.subtitle, &options(&config)).await?;
    let output = files.subtitle.with_file_name("out").join("movie.sync.srt");
    outcome.write_corrected(&output).map_err(|d| anyhow::anyhow!(d))?;

    assert_eq!(std::fs::read(&output)?, outcome.corrected_srt);
    Ok(())
}

#[tokio::test]
async fn test_synchronize_withFlakyTranscriber_shouldRetryEveryPoint() -> Result<()> {
    let files = default_fixture()?;
    let config = common::test_sync_config();
    let transcriber = Arc::new(ScriptedTranscriber::new(
        common::dialogue_with_offset(1.0),
        MockBehavior::FailFirstAttempt,
    ));
    let engine = common::mock_engine(config.clone(), &common::synthetic_media(), transcriber);

    let outcome = engine.synchronize(&files.video, &files.subtitle, &options(&config)).await?;

    assert_eq!(outcome.status, SyncStatus::Converged);
    assert_eq!(outcome.history[0].valid_points, 5);
    assert!(outcome.warnings.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_synchronize_withSlowPoint_shouldDropItAndWarn() -> Result<()> {
    let files = default_fixture()?;
    let config = SyncConfig {
        point_timeout_secs: 1,
        transcriber_capacity: 2,
        ..common::test_sync_config()
    };
    let transcriber = Arc::new(
        ScriptedTranscriber::working(common::dialogue_with_offset(0.05)).with_slow_window(1800.0, 3_000),
    );
    let engine = common::mock_engine(config.clone(), &common::synthetic_media(), transcriber);

    let outcome = engine.synchronize(&files.video, &files.subtitle, &options(&config)).await?;

    assert_eq!(outcome.report.valid_points, 4);
    assert_eq!(outcome.report.total_points, 5);
    assert!(outcome.report.per_point_offsets.iter().all(|(index, _)| *index != 3));
    assert!(outcome.warnings.iter().any(|w| w == "1 of 5 sample points were dropped"));
    Ok(())
}

#[tokio::test]
async fn test_synchronize_withCancellation_shouldStopPromptly() -> Result<()> {
    let files = default_fixture()?;
    let config = common::test_sync_config();
    let transcriber = Arc::new(ScriptedTranscriber::new(
        common::dialogue_with_offset(1.0),
        MockBehavior::Slow { delay_ms: 10_000 },
    ));
    let engine = common::mock_engine(config.clone(), &common::synthetic_media(), transcriber);
    let progress = ProgressLog::new();
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let failure = engine
        .synchronize_with(&files.video, &files.subtitle, &options(&config), &progress, &cancel)
        .await
        .unwrap_err();

    assert_eq!(failure.error, SyncError::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(progress.is_complete());
    Ok(())
}

#[tokio::test]
async fn test_synchronize_withoutConfiguredLanguage_shouldDetectAndReuseIt() -> Result<()> {
    let files = default_fixture()?;
    let config = SyncConfig { language: None, ..common::test_sync_config() };
    let transcriber = Arc::new(
        ScriptedTranscriber::working(common::dialogue_with_offset(0.0)).with_language(Some("fr")),
    );
    let engine = common::mock_engine(config.clone(), &common::synthetic_media(), transcriber.clone());

    let outcome = engine.synchronize(&files.video, &files.subtitle, &options(&config)).await?;

    assert_eq!(outcome.language.as_deref(), Some("fr"));
    let hints = transcriber.hints();
    assert_eq!(hints[0], None);
    assert!(hints[1..].iter().all(|hint| hint.as_deref() == Some("fr")));
    Ok(())
}

#[tokio::test]
async fn test_synchronize_withUndetectableLanguage_shouldWarnAndContinue() -> Result<()> {
    let files = default_fixture()?;
    let config = SyncConfig { language: None, ..common::test_sync_config() };
    let transcriber = Arc::new(
        ScriptedTranscriber::working(common::dialogue_with_offset(0.0)).with_language(None),
    );
    let engine = common::mock_engine(config.clone(), &common::synthetic_media(), transcriber.clone());

    let outcome = engine.synchronize(&files.video, &files.subtitle, &options(&config)).await?;

    assert_eq!(outcome.language, None);
    assert!(outcome.warnings.iter().any(|w| w.contains("Language detection failed")));
    assert!(transcriber.hints().iter().all(Option::is_none));
    Ok(())
}

#[tokio::test]
async fn test_synchronize_withMissingSubtitle_shouldFailWithConfigurationError() -> Result<()> {
    let files = default_fixture()?;
    let config = common::test_sync_config();
    let transcriber = Arc::new(ScriptedTranscriber::working(Vec::new()));
    let engine = common::mock_engine(config.clone(), &common::synthetic_media(), transcriber.clone());
    let missing = files.subtitle.with_file_name("missing.srt");

    let failure = engine.synchronize(&files.video, &missing, &options(&config)).await.unwrap_err();

    assert!(matches!(failure.error, SyncError::Configuration(_)));
    assert_eq!(failure.iterations, 0);
    assert_eq!(transcriber.request_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_synchronize_withFailingProbe_shouldFailWithProbeError() -> Result<()> {
    let files = default_fixture()?;
    let config = common::test_sync_config();
    let transcriber = Arc::new(ScriptedTranscriber::working(Vec::new()));
    let media = common::synthetic_media().failing_probe();
    let engine = common::mock_engine(config.clone(), &media, transcriber);

    let failure = engine.synchronize(&files.video, &files.subtitle, &options(&config)).await.unwrap_err();
    assert!(matches!(failure.error, SyncError::Probe(_)));
    Ok(())
}

#[tokio::test]
async fn test_synchronize_withUnknownVideoFramerate_shouldFailWithProbeError() -> Result<()> {
    let files = default_fixture()?;
    let config = common::test_sync_config();
    let transcriber = Arc::new(ScriptedTranscriber::working(Vec::new()));
    let media = MockMedia::new(common::VIDEO_DURATION_SECS, 0, 0);
    let engine = common::mock_engine(config.clone(), &media, transcriber);

    let failure = engine.synchronize(&files.video, &files.subtitle, &options(&config)).await.unwrap_err();
    assert!(matches!(failure.error, SyncError::Probe(_)));
    Ok(())
}

#[tokio::test]
async fn test_synchronize_withZeroSamples_shouldRejectOptions() -> Result<()> {
    let files = default_fixture()?;
    let config = common::test_sync_config();
    let transcriber = Arc::new(ScriptedTranscriber::working(Vec::new()));
    let engine = common::mock_engine(config, &common::synthetic_media(), transcriber);
    let options = SyncOptions { num_samples: 0, ..SyncOptions::default() };

    let failure = engine.synchronize(&files.video, &files.subtitle, &options).await.unwrap_err();
    assert!(matches!(failure.error, SyncError::Configuration(_)));
    Ok(())
}

#[tokio::test]
async fn test_synchronize_withSharedTranscriber_shouldRespectEngineGate() -> Result<()> {
    let files = default_fixture()?;
    let config = SyncConfig { max_concurrent_points: 4, ..common::test_sync_config() };
    let transcriber = Arc::new(ScriptedTranscriber::new(
        common::dialogue_with_offset(0.0),
        MockBehavior::Slow { delay_ms: 20 },
    ));
    let engine = common::mock_engine(config.clone(), &common::synthetic_media(), transcriber.clone());

    let opts = options(&config);
    let (first, second) = tokio::join!(
        engine.synchronize(&files.video, &files.subtitle, &opts),
        engine.synchronize(&files.video, &files.subtitle, &opts),
    );

    assert!(first.is_ok() && second.is_ok());
    assert_eq!(transcriber.peak_concurrency(), 1);
    Ok(())
}
