/*!
 * Mock collaborators for testing.
 *
 * - `MockMedia` answers probes with fixed media facts and "extracts" audio by
 *   writing a placeholder file.
 * - `ScriptedTranscriber` knows when dialogue is spoken in the video and
 *   returns the lines that fall inside each audio window.
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::errors::ToolError;
use crate::providers::{
    AudioExtractor, AudioSegment, MediaInfo, MediaProbe, TranscribedSegment, Transcriber, Transcription,
};

/// Probe and extractor with fixed media facts
#[derive(Debug, Clone)]
pub struct MockMedia {
    info: MediaInfo,
    fail_probe: bool,
    fail_extraction: bool,
    extractions: Arc<Mutex<Vec<f64>>>,
}

impl MockMedia {
    /// Media of `duration_secs` at `num/den` fps
    pub fn new(duration_secs: f64, frame_rate_num: u32, frame_rate_den: u32) -> Self {
        Self {
            info: MediaInfo {
                duration_secs,
                frame_rate_num,
                frame_rate_den,
            },
            fail_probe: false,
            fail_extraction: false,
            extractions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Probing always fails
    pub fn failing_probe(mut self) -> Self {
        self.fail_probe = true;
        self
    }

    /// Extraction always fails with a non-transient error
    pub fn failing_extraction(mut self) -> Self {
        self.fail_extraction = true;
        self
    }

    /// Start times of every extraction request, in call order
    pub fn extraction_starts(&self) -> Vec<f64> {
        self.extractions.lock().clone()
    }
}

#[async_trait]
impl MediaProbe for MockMedia {
    async fn probe(&self, _video: &Path) -> Result<MediaInfo, ToolError> {
        if self.fail_probe {
            return Err(ToolError::Parse("mock probe failure".to_string()));
        }
        Ok(self.info)
    }
}

#[async_trait]
impl AudioExtractor for MockMedia {
    async fn extract_audio_segment(
        &self,
        _video: &Path,
        start_secs: f64,
        duration_secs: f64,
        output: &Path,
    ) -> Result<AudioSegment, ToolError> {
        self.extractions.lock().push(start_secs);

        if self.fail_extraction {
            return Err(ToolError::Parse(format!("mock extraction failure at {:.1}s", start_secs)));
        }

        tokio::fs::write(output, b"RIFF").await?;
        Ok(AudioSegment {
            path: output.to_path_buf(),
            start_secs,
            duration_secs,
        })
    }
}

/// Behavior mode for the scripted transcriber
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockBehavior {
    /// Always returns the scripted dialogue
    Working,
    /// Fails the first attempt for every window, then succeeds
    FailFirstAttempt,
    /// Fails every Nth request (transient)
    Intermittent { fail_every: usize },
    /// Always fails with a transient error
    Failing,
    /// Always fails with an error that is not worth retrying
    Broken,
    /// Waits before answering
    Slow { delay_ms: u64 },
}

/// Transcriber that replays dialogue at known video times
#[derive(Debug)]
pub struct ScriptedTranscriber {
    behavior: MockBehavior,
    dialogue: Vec<f64>,
    language: Option<String>,
    silent_windows: Vec<f64>,
    slow_windows: Vec<(f64, u64)>,
    request_count: AtomicUsize,
    active: AtomicUsize,
    peak_active: AtomicUsize,
    failed_once: Mutex<HashSet<u64>>,
    hints: Mutex<Vec<Option<String>>>,
}

impl ScriptedTranscriber {
    /// Dialogue spoken at each of `dialogue` (absolute video seconds)
    pub fn new(dialogue: Vec<f64>, behavior: MockBehavior) -> Self {
        let mut dialogue = dialogue;
        dialogue.sort_by(|a, b| a.total_cmp(b));
        Self {
            behavior,
            dialogue,
            language: Some("en".to_string()),
            silent_windows: Vec::new(),
            slow_windows: Vec::new(),
            request_count: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            peak_active: AtomicUsize::new(0),
            failed_once: Mutex::new(HashSet::new()),
            hints: Mutex::new(Vec::new()),
        }
    }

    /// Working transcriber over `dialogue`
    pub fn working(dialogue: Vec<f64>) -> Self {
        Self::new(dialogue, MockBehavior::Working)
    }

    /// Language reported in every transcription
    pub fn with_language(mut self, language: Option<&str>) -> Self {
        self.language = language.map(str::to_string);
        self
    }

    /// Windows starting at `start_secs` contain no speech
    pub fn with_silent_window(mut self, start_secs: f64) -> Self {
        self.silent_windows.push(start_secs);
        self
    }

    /// Windows starting at `start_secs` take `delay_ms` to transcribe
    pub fn with_slow_window(mut self, start_secs: f64, delay_ms: u64) -> Self {
        self.slow_windows.push((start_secs, delay_ms));
        self
    }

    /// Number of transcription requests received
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Highest number of transcriptions that ran at the same time
    pub fn peak_concurrency(&self) -> usize {
        self.peak_active.load(Ordering::SeqCst)
    }

    /// Language hints received, in call order
    pub fn hints(&self) -> Vec<Option<String>> {
        self.hints.lock().clone()
    }

    fn window_matches(window_start: f64, list_start: f64) -> bool {
        (window_start - list_start).abs() < 0.5
    }

    fn transient(message: &str) -> ToolError {
        ToolError::Failed {
            tool: "mock-transcriber".to_string(),
            status: 1,
            stderr: message.to_string(),
        }
    }

    fn respond(&self, segment: &AudioSegment, count: usize) -> Result<Transcription, ToolError> {
        match self.behavior {
            MockBehavior::Failing => return Err(Self::transient("always failing")),
            MockBehavior::Broken => return Err(ToolError::Parse("unreadable transcription".to_string())),
            MockBehavior::Intermittent { fail_every } if fail_every > 0 && count % fail_every == 0 => {
                return Err(Self::transient("intermittent failure"));
            }
            MockBehavior::FailFirstAttempt => {
                let key = (segment.start_secs * 1000.0).round() as u64;
                if self.failed_once.lock().insert(key) {
                    return Err(Self::transient("first attempt failure"));
                }
            }
            _ => {}
        }

        if self.silent_windows.iter().any(|start| Self::window_matches(segment.start_secs, *start)) {
            return Ok(Transcription { language: self.language.clone(), segments: Vec::new() });
        }

        let window_end = segment.start_secs + segment.duration_secs;
        let segments = self.dialogue
            .iter()
            .filter(|time| **time >= segment.start_secs && **time < window_end)
            .map(|time| TranscribedSegment {
                start_secs: time - segment.start_secs,
                text: format!("line at {:.3}", time),
            })
            .collect();

        Ok(Transcription {
            language: self.language.clone(),
            segments,
        })
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(
        &self,
        segment: &AudioSegment,
        language_hint: Option<&str>,
    ) -> Result<Transcription, ToolError> {
        let count = self.request_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.hints.lock().push(language_hint.map(str::to_string));

        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_active.fetch_max(active, Ordering::SeqCst);

        let mut delay_ms = match self.behavior {
            MockBehavior::Slow { delay_ms } => delay_ms,
            _ => 0,
        };
        if let Some((_, window_delay)) = self.slow_windows.iter()
            .find(|(start, _)| Self::window_matches(segment.start_secs, *start))
        {
            delay_ms = delay_ms.max(*window_delay);
        }
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        } else {
            tokio::task::yield_now().await;
        }

        let result = self.respond(segment, count);
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
