use std::fmt;
use std::fs;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use regex::Regex;
use once_cell::sync::Lazy;
use log::{warn, debug};

use crate::errors::SubtitleError;

// @module: Subtitle track model, SRT parsing and timestamp arithmetic

// @const: SRT timing line regex, accepts ',' or '.' before milliseconds
static TIMESTAMP_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+):(\d{2}):(\d{2})[,.](\d{3})\s*-->\s*(\d+):(\d{2}):(\d{2})[,.](\d{3})").unwrap()
});

// @struct: Single subtitle entry
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleEntry {
    // @field: Sequence number as found in the source
    pub seq_num: usize,

    // @field: Start time in ms
    pub start_time_ms: u64,

    // @field: End time in ms
    pub end_time_ms: u64,

    // @field: Subtitle text
    pub text: String,
}

impl SubtitleEntry {
    /// Creates a new subtitle entry
    pub fn new(seq_num: usize, start_time_ms: u64, end_time_ms: u64, text: String) -> Self {
        SubtitleEntry {
            seq_num,
            start_time_ms,
            end_time_ms,
            text,
        }
    }

    /// Start time in seconds
    pub fn start_secs(&self) -> f64 {
        self.start_time_ms as f64 / 1000.0
    }

    /// Parse an SRT timestamp (HH:MM:SS,mmm) to milliseconds
    pub fn parse_timestamp(timestamp: &str) -> Result<u64, SubtitleError> {
        let invalid = || SubtitleError::InvalidTimestamp(timestamp.to_string());
        let parts: Vec<&str> = timestamp.trim().split(&[':', ',', '.'][..]).collect();

        if parts.len() != 4 || parts[3].len() != 3 {
            return Err(invalid());
        }

        let hours: u64 = parts[0].parse().map_err(|_| invalid())?;
        let minutes: u64 = parts[1].parse().map_err(|_| invalid())?;
        let seconds: u64 = parts[2].parse().map_err(|_| invalid())?;
        let millis: u64 = parts[3].parse().map_err(|_| invalid())?;

        if minutes >= 60 || seconds >= 60 || millis >= 1000 {
            return Err(invalid());
        }

        Ok(hours * 3_600_000 + minutes * 60_000 + seconds * 1_000 + millis)
    }

    /// Convert start time to formatted SRT timestamp
    pub fn format_start_time(&self) -> String {
        Self::format_timestamp(self.start_time_ms)
    }

    /// Convert end time to formatted SRT timestamp
    pub fn format_end_time(&self) -> String {
        Self::format_timestamp(self.end_time_ms)
    }

    /// Format a timestamp in milliseconds to SRT format (HH:MM:SS,mmm)
    pub fn format_timestamp(ms: u64) -> String {
        let hours = ms / 3_600_000;
        let minutes = (ms % 3_600_000) / 60_000;
        let seconds = (ms % 60_000) / 1_000;
        let millis = ms % 1_000;

        format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
    }

    /// Move both timestamps by a signed number of milliseconds, clamping at zero
    pub fn shift_ms(&mut self, delta_ms: i64) {
        self.start_time_ms = (self.start_time_ms as i64 + delta_ms).max(0) as u64;
        self.end_time_ms = (self.end_time_ms as i64 + delta_ms).max(0) as u64;
    }
}

impl fmt::Display for SubtitleEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}", self.seq_num)?;
        writeln!(f, "{} --> {}", self.format_start_time(), self.format_end_time())?;
        writeln!(f, "{}", self.text)?;
        writeln!(f)
    }
}

/// Ordered subtitle entries loaded from one file
///
/// Order and sequence numbers are kept as found in the source; nothing here
/// assumes entries are sorted by start time.
#[derive(Debug, Clone)]
pub struct SubtitleTrack {
    /// Source filename
    pub source_file: PathBuf,

    /// List of subtitle entries
    pub entries: Vec<SubtitleEntry>,
}

impl SubtitleTrack {
    /// Create a new, empty subtitle track
    pub fn new(source_file: PathBuf) -> Self {
        SubtitleTrack {
            source_file,
            entries: Vec::new(),
        }
    }

    /// Create a track from already parsed entries
    pub fn with_entries(source_file: PathBuf, entries: Vec<SubtitleEntry>) -> Self {
        SubtitleTrack { source_file, entries }
    }

    /// Load and parse an SRT file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SubtitleError> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        Self::from_bytes(path.to_path_buf(), &bytes)
    }

    /// Parse SRT bytes; invalid UTF-8 sequences are replaced rather than rejected
    pub fn from_bytes(source_file: PathBuf, bytes: &[u8]) -> Result<Self, SubtitleError> {
        let content = String::from_utf8_lossy(bytes);
        let entries = Self::parse_srt_string(&content)?;
        Ok(Self::with_entries(source_file, entries))
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the track has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Shift every timestamp by `offset_secs` (positive delays the subtitles)
    ///
    /// Returns how many entries had their start clamped at zero.
    pub fn shift(&mut self, offset_secs: f64) -> usize {
        let delta_ms = (offset_secs * 1000.0).round() as i64;
        if delta_ms == 0 {
            return 0;
        }

        let mut clamped = 0;
        for entry in &mut self.entries {
            if (entry.start_time_ms as i64 + delta_ms) < 0 {
                clamped += 1;
            }
            entry.shift_ms(delta_ms);
        }

        if clamped > 0 {
            warn!("{} subtitle entries were clamped to 00:00:00,000 while shifting by {:+.3}s", clamped, offset_secs);
        }
        clamped
    }

    /// Multiply every timestamp by `ratio`, rounding to the nearest millisecond
    ///
    /// `ratio` must be finite and positive.
    pub fn scale(&mut self, ratio: f64) {
        debug_assert!(ratio.is_finite() && ratio > 0.0);
        for entry in &mut self.entries {
            entry.start_time_ms = (entry.start_time_ms as f64 * ratio).round() as u64;
            entry.end_time_ms = (entry.end_time_ms as f64 * ratio).round() as u64;
        }
    }

    /// Render the track as SRT text
    pub fn to_srt_string(&self) -> String {
        self.entries.iter().map(|entry| entry.to_string()).collect()
    }

    /// Render the track as SRT bytes
    pub fn to_srt_bytes(&self) -> Result<Vec<u8>, SubtitleError> {
        if self.entries.is_empty() {
            return Err(SubtitleError::Empty);
        }

        let mut buffer = Vec::with_capacity(self.entries.len() * 64);
        for entry in &self.entries {
            write!(buffer, "{}", entry)?;
        }
        Ok(buffer)
    }

    /// Write subtitles to an SRT file
    pub fn write_to_srt<P: AsRef<Path>>(&self, path: P) -> Result<(), SubtitleError> {
        let path = path.as_ref();

        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let bytes = self.to_srt_bytes()?;
        let mut file = File::create(path)?;
        file.write_all(&bytes)?;

        Ok(())
    }

    /// Parse SRT format string into subtitle entries
    pub fn parse_srt_string(content: &str) -> Result<Vec<SubtitleEntry>, SubtitleError> {
        let mut entries = Vec::new();
        let content = content.trim_start_matches('\u{feff}');

        // State variables for parsing
        let mut current_seq_num: Option<usize> = None;
        let mut current_times: Option<(u64, u64)> = None;
        let mut current_text = String::new();
        let mut line_count = 0;
        let mut skipped = 0;

        let mut finish_entry = |seq_num: Option<usize>, times: (u64, u64), text: &str, entries: &mut Vec<SubtitleEntry>| {
            let seq_num = seq_num.unwrap_or(entries.len() + 1);
            if text.trim().is_empty() {
                warn!("Skipping empty subtitle entry {}", seq_num);
                skipped += 1;
                return;
            }
            if times.1 < times.0 {
                warn!("Subtitle entry {} ends before it starts ({} --> {})",
                      seq_num,
                      SubtitleEntry::format_timestamp(times.0),
                      SubtitleEntry::format_timestamp(times.1));
            }
            entries.push(SubtitleEntry::new(seq_num, times.0, times.1, text.trim().to_string()));
        };

        for line in content.lines() {
            line_count += 1;
            let trimmed = line.trim();

            // Blank line closes the current block
            if trimmed.is_empty() {
                if let Some(times) = current_times.take() {
                    finish_entry(current_seq_num.take(), times, &current_text, &mut entries);
                }
                current_seq_num = None;
                current_text.clear();
                continue;
            }

            // Timing line opens the text section of a block
            if current_times.is_none() {
                if let Some(caps) = TIMESTAMP_REGEX.captures(trimmed) {
                    let start_ms = Self::parse_timestamp_to_ms(&caps, 1);
                    let end_ms = Self::parse_timestamp_to_ms(&caps, 5);
                    match (start_ms, end_ms) {
                        (Some(start_ms), Some(end_ms)) => {
                            current_times = Some((start_ms, end_ms));
                            continue;
                        }
                        _ => {
                            warn!("Invalid timestamp at line {}: {}", line_count, trimmed);
                            current_seq_num = None;
                            continue;
                        }
                    }
                }

                if current_seq_num.is_none() {
                    if let Ok(num) = trimmed.parse::<usize>() {
                        current_seq_num = Some(num);
                        continue;
                    }
                }

                debug!("Ignoring line {} outside of a subtitle block: {}", line_count, trimmed);
                continue;
            }

            if !current_text.is_empty() {
                current_text.push('\n');
            }
            current_text.push_str(trimmed);
        }

        // Add the last entry if there is one
        if let Some(times) = current_times {
            finish_entry(current_seq_num, times, &current_text, &mut entries);
        }

        if entries.is_empty() {
            return Err(SubtitleError::Parse("No valid subtitle entries were found in the SRT content".to_string()));
        }

        if skipped > 0 {
            debug!("Parsed {} entries, skipped {}", entries.len(), skipped);
        }

        let out_of_order = entries.windows(2)
            .filter(|pair| pair[1].start_time_ms < pair[0].start_time_ms)
            .count();
        if out_of_order > 0 {
            warn!("Found {} subtitle entries that start before their predecessor", out_of_order);
        }

        Ok(entries)
    }

    /// Parse timestamp captures to milliseconds
    fn parse_timestamp_to_ms(caps: &regex::Captures, start_idx: usize) -> Option<u64> {
        let part = |offset: usize| -> Option<u64> {
            caps.get(start_idx + offset)?.as_str().parse().ok()
        };

        let (hours, minutes, seconds, millis) = (part(0)?, part(1)?, part(2)?, part(3)?);
        if minutes >= 60 || seconds >= 60 {
            return None;
        }

        Some((hours * 3600 + minutes * 60 + seconds) * 1000 + millis)
    }
}

impl fmt::Display for SubtitleTrack {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Subtitle Track")?;
        writeln!(f, "Source: {:?}", self.source_file)?;
        writeln!(f, "Entries: {}", self.entries.len())?;
        Ok(())
    }
}
