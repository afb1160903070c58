/*!
 * Speech-driven subtitle synchronization.
 *
 * - `framerate`: subtitle framerate detection and conversion
 * - `sampler`: sample point planning
 * - `estimator`: per-point offsets from transcribed audio windows
 * - `aggregator`: offsets to a report with a quality label
 * - `engine`: the full pipeline and refinement loop
 * - `progress`: append-only progress log
 * - `version`: release mismatch advisories from filenames
 */

pub mod aggregator;
pub mod engine;
pub mod estimator;
pub mod framerate;
pub mod progress;
pub mod sampler;
pub mod version;

pub use aggregator::{SyncQuality, SyncReport};
pub use engine::{FailureDiagnostic, SyncEngine, SyncOptions, SyncOutcome, SyncStatus};
pub use progress::{ProgressLog, COMPLETION_MARKER};
pub use version::{compare_versions, detect_version_info, VersionInfo};
