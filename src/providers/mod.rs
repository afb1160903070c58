/*!
 * External collaborators of the synchronization engine.
 *
 * The engine only talks to these traits:
 * - `MediaProbe`: reads duration and framerate of a video
 * - `AudioExtractor`: cuts a mono 16 kHz PCM window out of a video
 * - `Transcriber`: turns an audio window into timed text segments
 *
 * Implementations:
 * - `ffmpeg::FfmpegToolkit`: ffprobe/ffmpeg command line tools
 * - `whisper::WhisperCli`: whisper.cpp command line transcriber
 * - `mock`: scripted collaborators for tests
 */

use async_trait::async_trait;
use log::debug;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::errors::ToolError;

/// Basic facts about a video file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaInfo {
    /// Duration in seconds
    pub duration_secs: f64,
    /// Framerate numerator
    pub frame_rate_num: u32,
    /// Framerate denominator (0 when unknown)
    pub frame_rate_den: u32,
}

/// Handle to an extracted audio window
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSegment {
    /// Mono 16 kHz PCM file
    pub path: PathBuf,
    /// Position of the window in the video, in seconds
    pub start_secs: f64,
    /// Window length in seconds
    pub duration_secs: f64,
}

/// One piece of recognized speech
#[derive(Debug, Clone, PartialEq)]
pub struct TranscribedSegment {
    /// Start relative to the beginning of the audio window, in seconds
    pub start_secs: f64,
    /// Recognized text
    pub text: String,
}

/// Transcriber output for one audio window
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Transcription {
    /// Language reported by the transcriber
    pub language: Option<String>,
    /// Segments in chronological order
    pub segments: Vec<TranscribedSegment>,
}

/// Reads duration and framerate of a video
#[async_trait]
pub trait MediaProbe: Send + Sync + Debug {
    /// Probe the video at `video`
    async fn probe(&self, video: &Path) -> Result<MediaInfo, ToolError>;
}

/// Extracts audio windows from a video
#[async_trait]
pub trait AudioExtractor: Send + Sync + Debug {
    /// Write `duration_secs` of mono 16 kHz PCM starting at `start_secs` to `output`
    async fn extract_audio_segment(
        &self,
        video: &Path,
        start_secs: f64,
        duration_secs: f64,
        output: &Path,
    ) -> Result<AudioSegment, ToolError>;
}

/// Speech recognition over an audio window
#[async_trait]
pub trait Transcriber: Send + Sync + Debug {
    /// Transcribe `segment`; `language_hint` of `None` lets the engine detect the language
    async fn transcribe(
        &self,
        segment: &AudioSegment,
        language_hint: Option<&str>,
    ) -> Result<Transcription, ToolError>;
}

/// Run an external tool with a timeout, returning its stdout
///
/// The child is killed when the timeout fires or the future is dropped.
pub(crate) async fn run_tool(
    tool: &str,
    program: &str,
    args: &[String],
    timeout_secs: u64,
) -> Result<Vec<u8>, ToolError> {
    debug!("Running {} {}", program, args.join(" "));

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true);

    let output = tokio::select! {
        result = command.output() => {
            result.map_err(|e| ToolError::Launch {
                tool: tool.to_string(),
                message: format!("{} ({})", e, program),
            })?
        },
        _ = tokio::time::sleep(Duration::from_secs(timeout_secs)) => {
            return Err(ToolError::Timeout { tool: tool.to_string(), secs: timeout_secs });
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ToolError::Failed {
            tool: tool.to_string(),
            status: output.status.code().unwrap_or(-1),
            stderr: filter_tool_stderr(&stderr),
        });
    }

    Ok(output.stdout)
}

/// Drop banner and stream listing noise from tool stderr
pub(crate) fn filter_tool_stderr(stderr: &str) -> String {
    const NOISE_PREFIXES: &[&str] = &[
        "ffmpeg version",
        "ffprobe version",
        "built with",
        "configuration:",
        "lib",
        "Input #",
        "Metadata:",
        "Duration:",
        "Stream #",
        "Output #",
        "Stream mapping:",
        "Press [q]",
        "whisper_init",
        "whisper_model_load",
        "whisper_backend",
        "system_info",
    ];

    let meaningful: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !NOISE_PREFIXES.iter().any(|prefix| line.starts_with(prefix)))
        .collect();

    if meaningful.is_empty() {
        // Keep the tail so the failure is not silent
        stderr.lines().rev().take(3).collect::<Vec<_>>().into_iter().rev().collect::<Vec<_>>().join("\n")
    } else {
        meaningful.join("\n")
    }
}

pub mod ffmpeg;
pub mod whisper;
pub mod mock;
