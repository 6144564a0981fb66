//! Write-through session log
//!
//! Extraction and rebuild each keep a per-session log file. Every entry is
//! flushed immediately and mirrored to `tracing`, so errors leave a trace
//! even when they are swallowed at the result level.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::Local;

/// Timestamped log sink. Line format: `YYYY-MM-DD HH:MM:SS.fff | <message>`.
pub struct SessionLog {
    file: Mutex<Option<File>>,
}

/// Append one stamped line to a standalone log file, creating it on first
/// use. Write failures are demoted to `tracing::warn!`; logging never aborts
/// the operation that produced the message.
pub(crate) fn append_line(path: &Path, message: &str) {
    let stamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
    let result = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| writeln!(file, "{stamp} | {message}").and_then(|()| file.flush()));
    if let Err(e) = result {
        tracing::warn!("log append to {} failed: {e}", path.display());
    }
}

impl SessionLog {
    /// Open (append) a session log file, creating parent directories.
    pub fn to_file(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(Some(file)),
        })
    }

    /// A sink that only mirrors to `tracing` (used by tests and callers that
    /// do not want a file).
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            file: Mutex::new(None),
        }
    }

    /// Append one line. Failures to write the file are reported via
    /// `tracing::warn!` rather than propagated; logging must never abort the
    /// pipeline.
    pub fn log(&self, message: &str) {
        tracing::info!(target: "fsbforge::session", "{message}");

        let mut guard = match self.file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(file) = guard.as_mut() {
            let stamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
            if let Err(e) = writeln!(file, "{stamp} | {message}").and_then(|()| file.flush()) {
                tracing::warn!("session log write failed: {e}");
            }
        }
    }
}
