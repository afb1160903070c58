use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::default::Default;

use crate::sync::aggregator::MIN_VALID_POINTS;

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// Synchronization engine settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// External tool settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Synchronization engine configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SyncConfig {
    /// Number of sample points per analysis pass
    #[serde(default = "default_num_samples")]
    pub num_samples: usize,

    /// Maximum number of analysis passes
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Mean offset (seconds) below which no correction is applied
    #[serde(default = "default_negligible_threshold")]
    pub negligible_threshold: f64,

    /// Audio window length per sample point, in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: f64,

    /// Transcribed segments considered per sample point
    #[serde(default = "default_max_segments_per_point")]
    pub max_segments_per_point: usize,

    /// Maximum distance between speech and a subtitle start, in seconds
    #[serde(default = "default_match_tolerance_secs")]
    pub match_tolerance_secs: f64,

    /// Sample points that must produce an offset
    #[serde(default = "default_min_valid_points")]
    pub min_valid_points: usize,

    /// Time budget of one sample point (extraction, transcription, retries);
    /// waiting for the transcriber is not counted
    #[serde(default = "default_point_timeout_secs")]
    pub point_timeout_secs: u64,

    /// Time budget of one analysis pass
    #[serde(default = "default_analysis_deadline_secs")]
    pub analysis_deadline_secs: u64,

    /// Retries for transient tool failures, per sample point
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Base backoff in milliseconds, doubled on each retry
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Sample points processed concurrently
    #[serde(default = "default_max_concurrent_points")]
    pub max_concurrent_points: usize,

    /// Transcriptions allowed to run at the same time
    #[serde(default = "default_transcriber_capacity")]
    pub transcriber_capacity: usize,

    /// Minimum fps difference that triggers a framerate conversion
    #[serde(default = "default_framerate_tolerance")]
    pub framerate_tolerance: f64,

    /// Whether to convert subtitles authored for a different framerate
    #[serde(default = "default_true")]
    pub convert_framerate: bool,

    /// Whether to detect the spoken language when no hint is configured
    #[serde(default = "default_true")]
    pub detect_language: bool,

    /// Language hint for the transcriber (ISO 639 code)
    #[serde(default)]
    pub language: Option<String>,

    /// Where the language detection sample starts, in seconds
    #[serde(default = "default_language_sample_start_secs")]
    pub language_sample_start_secs: f64,

    /// Length of the language detection sample, in seconds
    #[serde(default = "default_language_sample_secs")]
    pub language_sample_secs: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            num_samples: default_num_samples(),
            max_iterations: default_max_iterations(),
            negligible_threshold: default_negligible_threshold(),
            window_secs: default_window_secs(),
            max_segments_per_point: default_max_segments_per_point(),
            match_tolerance_secs: default_match_tolerance_secs(),
            min_valid_points: default_min_valid_points(),
            point_timeout_secs: default_point_timeout_secs(),
            analysis_deadline_secs: default_analysis_deadline_secs(),
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_concurrent_points: default_max_concurrent_points(),
            transcriber_capacity: default_transcriber_capacity(),
            framerate_tolerance: default_framerate_tolerance(),
            convert_framerate: true,
            detect_language: true,
            language: None,
            language_sample_start_secs: default_language_sample_start_secs(),
            language_sample_secs: default_language_sample_secs(),
        }
    }
}

/// External tool configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ToolsConfig {
    /// ffmpeg binary
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,

    /// ffprobe binary
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: String,

    /// whisper.cpp command line binary
    #[serde(default = "default_whisper_path")]
    pub whisper_path: String,

    /// whisper model file
    #[serde(default = "default_whisper_model")]
    pub whisper_model: String,

    /// Timeout of a single tool invocation in seconds
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,

    /// Threads passed to the transcriber
    #[serde(default = "default_whisper_threads")]
    pub whisper_threads: usize,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            whisper_path: default_whisper_path(),
            whisper_model: default_whisper_model(),
            command_timeout_secs: default_command_timeout_secs(),
            whisper_threads: default_whisper_threads(),
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Matching filter for the `log` facade
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(anyhow!("Invalid log level: {}", s)),
        }
    }
}

fn default_num_samples() -> usize {
    5
}

fn default_max_iterations() -> usize {
    5
}

fn default_negligible_threshold() -> f64 {
    0.1
}

fn default_window_secs() -> f64 {
    45.0
}

fn default_max_segments_per_point() -> usize {
    15
}

fn default_match_tolerance_secs() -> f64 {
    5.0
}

fn default_min_valid_points() -> usize {
    3
}

fn default_point_timeout_secs() -> u64 {
    60
}

fn default_analysis_deadline_secs() -> u64 {
    900
}

fn default_retry_count() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    500 // doubled on each retry
}

fn default_max_concurrent_points() -> usize {
    2
}

fn default_transcriber_capacity() -> usize {
    1
}

fn default_framerate_tolerance() -> f64 {
    0.5
}

fn default_language_sample_start_secs() -> f64 {
    60.0
}

fn default_language_sample_secs() -> f64 {
    30.0
}

fn default_true() -> bool {
    true
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe_path() -> String {
    "ffprobe".to_string()
}

fn default_whisper_path() -> String {
    "whisper-cli".to_string()
}

fn default_whisper_model() -> String {
    "models/ggml-base.bin".to_string()
}

fn default_command_timeout_secs() -> u64 {
    120
}

fn default_whisper_threads() -> usize {
    4
}

impl Config {
    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        self.sync.validate()?;
        self.tools.validate()?;
        Ok(())
    }
}

impl SyncConfig {
    /// Validate engine settings
    pub fn validate(&self) -> Result<()> {
        if self.num_samples == 0 {
            return Err(anyhow!("sync.num_samples must be at least 1"));
        }
        if self.max_iterations == 0 {
            return Err(anyhow!("sync.max_iterations must be at least 1"));
        }
        if !(self.negligible_threshold >= 0.0) {
            return Err(anyhow!("sync.negligible_threshold must not be negative"));
        }
        if !(self.window_secs > 0.0) {
            return Err(anyhow!("sync.window_secs must be positive"));
        }
        if self.max_segments_per_point == 0 {
            return Err(anyhow!("sync.max_segments_per_point must be at least 1"));
        }
        if !(self.match_tolerance_secs > 0.0) {
            return Err(anyhow!("sync.match_tolerance_secs must be positive"));
        }
        if self.min_valid_points < MIN_VALID_POINTS {
            return Err(anyhow!("sync.min_valid_points must be at least {}", MIN_VALID_POINTS));
        }
        if self.point_timeout_secs == 0 || self.analysis_deadline_secs == 0 {
            return Err(anyhow!("sync timeouts must be positive"));
        }
        if self.max_concurrent_points == 0 || self.transcriber_capacity == 0 {
            return Err(anyhow!("sync concurrency limits must be at least 1"));
        }
        if !(self.framerate_tolerance >= 0.0) {
            return Err(anyhow!("sync.framerate_tolerance must not be negative"));
        }
        if !(self.language_sample_secs > 0.0) || !(self.language_sample_start_secs >= 0.0) {
            return Err(anyhow!("sync language sample must have a non-negative start and positive length"));
        }
        if let Some(language) = &self.language {
            crate::language_utils::validate_language_code(language)?;
        }
        Ok(())
    }
}

impl ToolsConfig {
    /// Validate tool settings
    pub fn validate(&self) -> Result<()> {
        let paths = [
            ("tools.ffmpeg_path", &self.ffmpeg_path),
            ("tools.ffprobe_path", &self.ffprobe_path),
            ("tools.whisper_path", &self.whisper_path),
            ("tools.whisper_model", &self.whisper_model),
        ];
        for (name, value) in paths {
            if value.trim().is_empty() {
                return Err(anyhow!("{} must not be empty", name));
            }
        }
        if self.command_timeout_secs == 0 {
            return Err(anyhow!("tools.command_timeout_secs must be positive"));
        }
        if self.whisper_threads == 0 {
            return Err(anyhow!("tools.whisper_threads must be at least 1"));
        }
        Ok(())
    }
}
