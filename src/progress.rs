//! Progress reporting and cooperative cancellation
//!
//! Background work never touches caller state directly; it emits immutable
//! progress records through callbacks and observes a shared cancellation
//! flag between sub-sounds.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Error, Result};

/// Progress callback for extraction-style operations
pub type ExtractProgressCallback<'a> = &'a (dyn Fn(&ExtractProgress) + Send + Sync);

/// Progress callback for rebuild-style operations
pub type RebuildProgressCallback<'a> = &'a (dyn Fn(&RebuildProgress) + Send + Sync);

/// Cooperative cancellation flag shared between a caller and its workers.
///
/// Workers check the flag between sub-sounds; the encoder runner responds by
/// force-terminating its child process.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Cooperative check point: returns [`Error::Cancelled`] once the token
    /// has been raised.
    pub fn checkpoint(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Progress information during sub-sound extraction
#[derive(Debug, Clone)]
pub struct ExtractProgress {
    /// Sub-sounds finished so far (1-indexed as reported)
    pub current: usize,
    /// Total sub-sounds in the chunk
    pub total: usize,
    /// Name of the sub-sound just finished, if any
    pub current_name: Option<String>,
}

impl ExtractProgress {
    /// Progress as a fraction (0.0 - 1.0)
    #[must_use]
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            self.current as f32 / self.total as f32
        }
    }
}

/// Phase of a rebuild operation.
///
/// Each phase owns a disjoint band of the overall percentage so the
/// aggregated number is monotonic across phase transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildPhase {
    /// Workspace extraction and replacement transcoding
    Prepare,
    /// Encoder invocations (including the quality search)
    Build,
    /// Splicing the rebuilt chunk into the container
    Patch,
    /// Workspace disposal
    Cleanup,
    Complete,
}

impl RebuildPhase {
    /// `(start, end)` of this phase's overall-percentage band
    #[must_use]
    pub fn band(self) -> (u8, u8) {
        match self {
            RebuildPhase::Prepare => (0, 30),
            RebuildPhase::Build => (30, 90),
            RebuildPhase::Patch => (90, 95),
            RebuildPhase::Cleanup => (95, 100),
            RebuildPhase::Complete => (100, 100),
        }
    }

    /// Map a within-phase fraction to the overall percentage
    #[must_use]
    pub fn overall_percent(self, fraction: f32) -> u8 {
        let (start, end) = self.band();
        let span = f32::from(end - start);
        let clamped = fraction.clamp(0.0, 1.0);
        (f32::from(start) + span * clamped).round() as u8
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RebuildPhase::Prepare => "Preparing workspace",
            RebuildPhase::Build => "Building FSB",
            RebuildPhase::Patch => "Patching container",
            RebuildPhase::Cleanup => "Cleaning up",
            RebuildPhase::Complete => "Complete",
        }
    }
}

/// Progress information during a rebuild
#[derive(Debug, Clone)]
pub struct RebuildProgress {
    pub phase: RebuildPhase,
    /// Overall percentage across all phases (0-100)
    pub overall_percent: u8,
    pub status: String,
}

impl RebuildProgress {
    #[must_use]
    pub fn new(phase: RebuildPhase, fraction: f32, status: impl Into<String>) -> Self {
        Self {
            phase,
            overall_percent: phase.overall_percent(fraction),
            status: status.into(),
        }
    }
}
