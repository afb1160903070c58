use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use std::path::Path;

use crate::app_config::ToolsConfig;
use crate::errors::ToolError;
use crate::providers::{run_tool, AudioExtractor, AudioSegment, MediaInfo, MediaProbe};

// @module: ffprobe/ffmpeg backed probe and audio extractor

/// Sample rate expected by the transcriber
pub const TRANSCRIPTION_SAMPLE_RATE: u32 = 16_000;

// @struct: ffprobe JSON output, reduced to the fields in use
#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// ffprobe + ffmpeg command line tools
#[derive(Debug, Clone)]
pub struct FfmpegToolkit {
    ffmpeg_path: String,
    ffprobe_path: String,
    timeout_secs: u64,
}

impl FfmpegToolkit {
    /// Create a toolkit with explicit binaries
    pub fn new(ffmpeg_path: impl Into<String>, ffprobe_path: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
            timeout_secs,
        }
    }

    /// Create a toolkit from the tools section of the configuration
    pub fn from_config(config: &ToolsConfig) -> Self {
        Self::new(&config.ffmpeg_path, &config.ffprobe_path, config.command_timeout_secs)
    }

    /// Parse ffprobe JSON into `MediaInfo`
    ///
    /// A missing duration is an error; a missing framerate leaves the denominator at 0.
    pub fn parse_probe_output(json: &str) -> Result<MediaInfo, ToolError> {
        let output: ProbeOutput = serde_json::from_str(json)
            .map_err(|e| ToolError::Parse(format!("ffprobe JSON: {}", e)))?;

        let duration_secs = output.format
            .and_then(|format| format.duration)
            .and_then(|duration| duration.trim().parse::<f64>().ok())
            .ok_or_else(|| ToolError::Parse("ffprobe reported no duration".to_string()))?;

        let (frame_rate_num, frame_rate_den) = output.streams
            .first()
            .and_then(|stream| {
                stream.r_frame_rate.as_deref()
                    .and_then(parse_rational)
                    .or_else(|| stream.avg_frame_rate.as_deref().and_then(parse_rational))
            })
            .unwrap_or((0, 0));

        Ok(MediaInfo {
            duration_secs,
            frame_rate_num,
            frame_rate_den,
        })
    }
}

/// Parse an ffprobe rational such as "24000/1001"; "0/0" yields `None`
fn parse_rational(value: &str) -> Option<(u32, u32)> {
    let (num, den) = value.trim().split_once('/')?;
    let num: u32 = num.parse().ok()?;
    let den: u32 = den.parse().ok()?;
    if num == 0 || den == 0 {
        return None;
    }
    Some((num, den))
}

#[async_trait]
impl MediaProbe for FfmpegToolkit {
    async fn probe(&self, video: &Path) -> Result<MediaInfo, ToolError> {
        let args = vec![
            "-v".to_string(), "error".to_string(),
            "-select_streams".to_string(), "v:0".to_string(),
            "-show_entries".to_string(), "format=duration:stream=r_frame_rate,avg_frame_rate".to_string(),
            "-of".to_string(), "json".to_string(),
            video.to_string_lossy().to_string(),
        ];

        let stdout = run_tool("ffprobe", &self.ffprobe_path, &args, self.timeout_secs).await?;
        let info = Self::parse_probe_output(&String::from_utf8_lossy(&stdout))?;
        debug!("Probed {:?}: {:.3}s at {}/{}", video, info.duration_secs, info.frame_rate_num, info.frame_rate_den);
        Ok(info)
    }
}

#[async_trait]
impl AudioExtractor for FfmpegToolkit {
    async fn extract_audio_segment(
        &self,
        video: &Path,
        start_secs: f64,
        duration_secs: f64,
        output: &Path,
    ) -> Result<AudioSegment, ToolError> {
        let args = vec![
            "-y".to_string(),
            "-nostdin".to_string(),
            "-v".to_string(), "error".to_string(),
            "-ss".to_string(), format!("{:.3}", start_secs.max(0.0)),
            "-t".to_string(), format!("{:.3}", duration_secs),
            "-i".to_string(), video.to_string_lossy().to_string(),
            "-vn".to_string(),
            "-ac".to_string(), "1".to_string(),
            "-ar".to_string(), TRANSCRIPTION_SAMPLE_RATE.to_string(),
            "-c:a".to_string(), "pcm_s16le".to_string(),
            output.to_string_lossy().to_string(),
        ];

        run_tool("ffmpeg", &self.ffmpeg_path, &args, self.timeout_secs).await?;

        let size = tokio::fs::metadata(output).await?.len();
        if size == 0 {
            return Err(ToolError::Parse(format!("ffmpeg produced no audio at {:.3}s", start_secs)));
        }

        Ok(AudioSegment {
            path: output.to_path_buf(),
            start_secs,
            duration_secs,
        })
    }
}
