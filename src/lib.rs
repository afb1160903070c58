/*!
 * # resub - speech-driven subtitle re-synchronization
 *
 * Realigns subtitle timing to the spoken dialogue of a video when the subtitle
 * was made for another release (different cut, re-encode, PAL speed-up).
 *
 * ## Features
 *
 * - Framerate detection and conversion of SRT subtitles
 * - Multi-point offset estimation from transcribed audio windows
 * - Iterative correction until the offset is negligible
 * - Quality and confidence labels for the result
 * - Release mismatch advisories from filenames
 * - ffmpeg/ffprobe and whisper.cpp backends behind async traits
 *
 * ## Architecture
 *
 * - `app_config`: Configuration management
 * - `subtitle_processor`: SRT parsing, writing and timestamp arithmetic
 * - `sync`: The synchronization engine:
 *   - `sync::framerate`: Framerate detection and conversion
 *   - `sync::sampler`: Sample point planning
 *   - `sync::estimator`: Offset estimation per sample point
 *   - `sync::aggregator`: Report and quality classification
 *   - `sync::engine`: Refinement loop and full pipeline
 *   - `sync::progress`: Progress log
 *   - `sync::version`: Version/mismatch advisor
 * - `providers`: Media probe, audio extractor and transcriber implementations
 * - `file_utils`: File system operations
 * - `language_utils`: ISO language code utilities
 * - `errors`: Custom error types for the application
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod errors;
pub mod file_utils;
pub mod language_utils;
pub mod providers;
pub mod subtitle_processor;
pub mod sync;

// Re-export main types for easier usage
pub use app_config::Config;
pub use errors::{SubtitleError, SyncError, ToolError};
pub use language_utils::{get_language_name, normalize_language_hint};
pub use subtitle_processor::{SubtitleEntry, SubtitleTrack};
pub use sync::{FailureDiagnostic, ProgressLog, SyncEngine, SyncOptions, SyncOutcome, SyncQuality, SyncReport, SyncStatus};
