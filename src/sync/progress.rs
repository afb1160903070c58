use log::{info, warn};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

use crate::file_utils::FileManager;

// @module: Append-only progress log shared with observers

/// Last line of every finished run
pub const COMPLETION_MARKER: &str = "Complete";

#[derive(Debug, Default)]
struct ProgressState {
    lines: Vec<String>,
    complete: bool,
}

/// Ordered, append-only progress lines with a one-time completion marker
///
/// Clones share the same log. Observers poll with `lines_since` and stop once
/// `is_complete` returns true.
#[derive(Debug, Clone, Default)]
pub struct ProgressLog {
    state: Arc<Mutex<ProgressState>>,
    mirror: Option<PathBuf>,
}

impl ProgressLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also append every line, timestamped, to `path`
    pub fn with_mirror(path: impl Into<PathBuf>) -> Self {
        Self {
            state: Arc::default(),
            mirror: Some(path.into()),
        }
    }

    /// Append a line; ignored once the log is complete
    pub fn push(&self, line: impl Into<String>) {
        let line = line.into();
        {
            let mut state = self.state.lock();
            if state.complete {
                return;
            }
            state.lines.push(line.clone());
        }
        info!("{}", line);
        self.mirror_line(&line);
    }

    /// Append the completion marker, once
    pub fn complete(&self) {
        {
            let mut state = self.state.lock();
            if state.complete {
                return;
            }
            state.lines.push(COMPLETION_MARKER.to_string());
            state.complete = true;
        }
        self.mirror_line(COMPLETION_MARKER);
    }

    pub fn is_complete(&self) -> bool {
        self.state.lock().complete
    }

    /// Snapshot of all lines
    pub fn lines(&self) -> Vec<String> {
        self.state.lock().lines.clone()
    }

    /// Lines appended at or after `cursor`, and the cursor for the next call
    pub fn lines_since(&self, cursor: usize) -> (Vec<String>, usize) {
        let state = self.state.lock();
        let start = cursor.min(state.lines.len());
        (state.lines[start..].to_vec(), state.lines.len())
    }

    fn mirror_line(&self, line: &str) {
        if let Some(path) = &self.mirror {
            if let Err(e) = FileManager::append_to_log_file(path, line) {
                warn!("Failed to write progress log {:?}: {}", path, e);
            }
        }
    }
}
