/*!
 * Error types for the resub application.
 *
 * This module contains custom error types for different parts of the application,
 * using the thiserror crate for ergonomic error definitions.
 */

use thiserror::Error;

/// Errors raised by the external tools (probe, extractor, transcriber)
#[derive(Error, Debug)]
pub enum ToolError {
    /// The tool binary could not be started
    #[error("Failed to launch {tool}: {message}")]
    Launch {
        /// Tool name
        tool: String,
        /// Launch error message
        message: String,
    },

    /// The tool ran but exited unsuccessfully
    #[error("{tool} exited with status {status}: {stderr}")]
    Failed {
        /// Tool name
        tool: String,
        /// Exit status (-1 when killed by a signal)
        status: i32,
        /// Filtered stderr output
        stderr: String,
    },

    /// The tool did not finish in time
    #[error("{tool} timed out after {secs} seconds")]
    Timeout {
        /// Tool name
        tool: String,
        /// Timeout that expired
        secs: u64,
    },

    /// The tool output could not be understood
    #[error("Failed to parse tool output: {0}")]
    Parse(String),

    /// Filesystem error around the tool invocation
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ToolError {
    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Timeout { .. } | Self::Io(_))
    }
}

/// Errors that can occur during subtitle processing
#[derive(Error, Debug)]
pub enum SubtitleError {
    /// The content is not a usable SRT document
    #[error("Failed to parse subtitle: {0}")]
    Parse(String),

    /// A timestamp does not follow HH:MM:SS,mmm
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// The track contains no entries
    #[error("Subtitle track is empty")]
    Empty,

    /// Reading or writing the subtitle failed
    #[error("Subtitle I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors of the synchronization engine
///
/// `Extraction` and `Transcription` are per sample point and never abort a run;
/// every other kind is fatal for the `synchronize()` call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    /// Missing or unreadable inputs, or invalid options
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Duration or framerate of the video could not be read
    #[error("Probe error: {0}")]
    Probe(String),

    /// Audio window extraction failed at a sample point
    #[error("Audio extraction failed at sample point {point}: {message}")]
    Extraction {
        /// Sample point index (1-based)
        point: usize,
        /// Underlying error
        message: String,
    },

    /// Transcription failed at a sample point
    #[error("Transcription failed at sample point {point}: {message}")]
    Transcription {
        /// Sample point index (1-based)
        point: usize,
        /// Underlying error
        message: String,
    },

    /// Too few sample points produced an offset
    #[error("Insufficient data: only {valid} of {total} sample points matched (need at least {required})")]
    InsufficientData {
        /// Points with at least one match
        valid: usize,
        /// Points analyzed
        total: usize,
        /// Minimum number of valid points
        required: usize,
    },

    /// The corrected track could not be serialized or written
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The caller cancelled the run
    #[error("Synchronization cancelled")]
    Cancelled,
}

impl SyncError {
    /// Whether this error aborts the whole run
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Extraction { .. } | Self::Transcription { .. })
    }
}

impl From<SubtitleError> for SyncError {
    fn from(error: SubtitleError) -> Self {
        Self::Configuration(error.to_string())
    }
}
