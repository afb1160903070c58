/*!
 * Tests for the error taxonomy
 */

use resub::errors::{SubtitleError, SyncError, ToolError};
use resub::sync::engine::failure_hints;

#[test]
fn test_is_fatal_withPerPointErrors_shouldNotAbortRun() {
    assert!(!SyncError::Extraction { point: 1, message: "x".to_string() }.is_fatal());
    assert!(!SyncError::Transcription { point: 2, message: "x".to_string() }.is_fatal());
    assert!(SyncError::Cancelled.is_fatal());
    assert!(SyncError::Probe("no duration".to_string()).is_fatal());
    assert!(SyncError::InsufficientData { valid: 0, total: 5, required: 3 }.is_fatal());
}

#[test]
fn test_is_transient_withToolErrors_shouldOnlyRetryRuntimeFailures() {
    let failed = ToolError::Failed { tool: "ffmpeg".to_string(), status: 1, stderr: "busy".to_string() };
    let timeout = ToolError::Timeout { tool: "whisper-cli".to_string(), secs: 120 };
    let launch = ToolError::Launch { tool: "ffprobe".to_string(), message: "not found".to_string() };

    assert!(failed.is_transient());
    assert!(timeout.is_transient());
    assert!(!launch.is_transient());
    assert!(!ToolError::Parse("bad json".to_string()).is_transient());
}

#[test]
fn test_display_withInsufficientData_shouldNameCounts() {
    let error = SyncError::InsufficientData { valid: 2, total: 5, required: 3 };
    assert_eq!(
        error.to_string(),
        "Insufficient data: only 2 of 5 sample points matched (need at least 3)"
    );
}

#[test]
fn test_from_subtitle_error_withEmptyTrack_shouldBeConfigurationError() {
    let error: SyncError = SubtitleError::Empty.into();
    assert!(matches!(error, SyncError::Configuration(message) if message.contains("empty")));
}

#[test]
fn test_display_withToolTimeout_shouldNameToolAndBudget() {
    let error = ToolError::Timeout { tool: "ffmpeg".to_string(), secs: 3 };
    assert_eq!(error.to_string(), "ffmpeg timed out after 3 seconds");
}

#[test]
fn test_failure_hints_withCancellation_shouldBeEmpty() {
    assert!(failure_hints(&SyncError::Cancelled).is_empty());
    assert!(!failure_hints(&SyncError::Probe("x".to_string())).is_empty());
    assert!(!failure_hints(&SyncError::Serialization("x".to_string())).is_empty());
}
