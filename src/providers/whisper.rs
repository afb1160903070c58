use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use std::path::PathBuf;

use crate::app_config::ToolsConfig;
use crate::errors::ToolError;
use crate::providers::{run_tool, AudioSegment, TranscribedSegment, Transcriber, Transcription};

// @module: whisper.cpp command line transcriber

// @struct: JSON written by `whisper-cli -oj`
#[derive(Debug, Deserialize)]
struct WhisperOutput {
    #[serde(default)]
    result: Option<WhisperResult>,
    #[serde(default)]
    transcription: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperResult {
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    offsets: WhisperOffsets,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct WhisperOffsets {
    // Milliseconds from the start of the input
    from: u64,
}

/// whisper.cpp transcriber
#[derive(Debug, Clone)]
pub struct WhisperCli {
    binary: String,
    model: String,
    threads: usize,
    timeout_secs: u64,
}

impl WhisperCli {
    /// Create a transcriber with explicit settings
    pub fn new(binary: impl Into<String>, model: impl Into<String>, threads: usize, timeout_secs: u64) -> Self {
        Self {
            binary: binary.into(),
            model: model.into(),
            threads,
            timeout_secs,
        }
    }

    /// Create a transcriber from the tools section of the configuration
    pub fn from_config(config: &ToolsConfig) -> Self {
        Self::new(
            &config.whisper_path,
            &config.whisper_model,
            config.whisper_threads,
            config.command_timeout_secs,
        )
    }

    /// Parse whisper.cpp JSON output
    pub fn parse_output(json: &str) -> Result<Transcription, ToolError> {
        let output: WhisperOutput = serde_json::from_str(json)
            .map_err(|e| ToolError::Parse(format!("whisper JSON: {}", e)))?;

        let segments = output.transcription
            .into_iter()
            .filter_map(|segment| {
                let text = segment.text.trim();
                if text.is_empty() || is_non_speech_marker(text) {
                    return None;
                }
                Some(TranscribedSegment {
                    start_secs: segment.offsets.from as f64 / 1000.0,
                    text: text.to_string(),
                })
            })
            .collect();

        Ok(Transcription {
            language: output.result.and_then(|result| result.language),
            segments,
        })
    }
}

/// Markers such as "[MUSIC]" or "(applause)" that carry no dialogue
fn is_non_speech_marker(text: &str) -> bool {
    (text.starts_with('[') && text.ends_with(']')) || (text.starts_with('(') && text.ends_with(')'))
}

#[async_trait]
impl Transcriber for WhisperCli {
    async fn transcribe(
        &self,
        segment: &AudioSegment,
        language_hint: Option<&str>,
    ) -> Result<Transcription, ToolError> {
        let prefix: PathBuf = segment.path.with_extension("");
        let args = vec![
            "-m".to_string(), self.model.clone(),
            "-f".to_string(), segment.path.to_string_lossy().to_string(),
            "-l".to_string(), language_hint.unwrap_or("auto").to_string(),
            "-t".to_string(), self.threads.to_string(),
            "-oj".to_string(),
            "-of".to_string(), prefix.to_string_lossy().to_string(),
            "-np".to_string(),
        ];

        run_tool("whisper", &self.binary, &args, self.timeout_secs).await?;

        let json_path = prefix.with_extension("json");
        let json = tokio::fs::read_to_string(&json_path).await?;
        let _ = tokio::fs::remove_file(&json_path).await;

        let transcription = Self::parse_output(&json)?;
        debug!("Transcribed window at {:.1}s: {} segments, language {:?}",
               segment.start_secs, transcription.segments.len(), transcription.language);
        Ok(transcription)
    }
}
