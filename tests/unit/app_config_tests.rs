/*!
 * Tests for application configuration
 */

use anyhow::Result;
use resub::app_config::{Config, LogLevel, SyncConfig, ToolsConfig};
use resub::sync::SyncOptions;
use crate::common;

#[test]
fn test_default_config_withNoChanges_shouldValidate() {
    let config = Config::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.sync.num_samples, 5);
    assert_eq!(config.sync.max_iterations, 5);
    assert_eq!(config.sync.negligible_threshold, 0.1);
    assert_eq!(config.sync.min_valid_points, 3);
    assert_eq!(config.sync.transcriber_capacity, 1);
    assert!(config.sync.convert_framerate);
    assert_eq!(config.tools.ffprobe_path, "ffprobe");
}

#[test]
fn test_deserialize_withPartialSection_shouldFillMissingFields() -> Result<()> {
    let json = r#"{
        "sync": { "num_samples": 7, "language": "de" },
        "tools": { "whisper_model": "/opt/models/ggml-small.bin" },
        "log_level": "debug"
    }"#;
    let config: Config = serde_json::from_str(json)?;

    assert_eq!(config.sync.num_samples, 7);
    assert_eq!(config.sync.language.as_deref(), Some("de"));
    assert_eq!(config.sync.window_secs, 45.0);
    assert_eq!(config.tools.whisper_model, "/opt/models/ggml-small.bin");
    assert_eq!(config.tools.ffmpeg_path, "ffmpeg");
    assert_eq!(config.log_level, LogLevel::Debug);
    config.validate()
}

#[test]
fn test_config_file_withSaveAndLoad_shouldRoundTrip() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = temp_dir.path().join("conf.json");

    let mut config = Config::default();
    config.sync.max_iterations = 2;
    config.tools.whisper_threads = 8;
    std::fs::write(&path, serde_json::to_string_pretty(&config)?)?;

    let loaded: Config = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert_eq!(loaded.sync.max_iterations, 2);
    assert_eq!(loaded.tools.whisper_threads, 8);
    Ok(())
}

#[test]
fn test_sync_validate_withZeroSamples_shouldFail() {
    let config = SyncConfig { num_samples: 0, ..SyncConfig::default() };
    assert!(config.validate().is_err());
}

#[test]
fn test_sync_validate_withNegativeThreshold_shouldFail() {
    let config = SyncConfig { negligible_threshold: -0.5, ..SyncConfig::default() };
    assert!(config.validate().is_err());

    let config = SyncConfig { negligible_threshold: f64::NAN, ..SyncConfig::default() };
    assert!(config.validate().is_err());
}

#[test]
fn test_sync_validate_withZeroConcurrency_shouldFail() {
    let config = SyncConfig { transcriber_capacity: 0, ..SyncConfig::default() };
    assert!(config.validate().is_err());
}

#[test]
fn test_sync_validate_withBibliographicLanguage_shouldPass() {
    let config = SyncConfig { language: Some("fre".to_string()), ..SyncConfig::default() };
    assert!(config.validate().is_ok());
}

#[test]
fn test_tools_validate_withEmptyPath_shouldFail() {
    let config = ToolsConfig { whisper_path: "  ".to_string(), ..ToolsConfig::default() };
    assert!(config.validate().is_err());
}

#[test]
fn test_log_level_withMixedCase_shouldParse() {
    assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
    assert_eq!("trace".parse::<LogLevel>().unwrap().to_level_filter(), log::LevelFilter::Trace);
    assert!("loud".parse::<LogLevel>().is_err());
}

#[test]
fn test_sync_options_withConfig_shouldCopyLoopSettings() {
    let config = SyncConfig { num_samples: 9, max_iterations: 3, negligible_threshold: 0.25, ..SyncConfig::default() };
    let options = SyncOptions::from(&config);
    assert_eq!(options.num_samples, 9);
    assert_eq!(options.max_iterations, 3);
    assert_eq!(options.negligible_threshold, 0.25);
}
