//! # `fsbforge`
//!
//! A pure-Rust toolkit for reading, inspecting, and rebuilding FMOD Sound
//! Bank containers: standalone `.fsb` files and `.bank` wrappers that embed
//! one or more FSB chunks at arbitrary byte offsets.
//!
//! ## Pipeline
//!
//! - **Scan** - locate and validate FSB3/FSB4/FSB5 chunks inside a bank
//! - **Inspect** - enumerate sub-sounds with codec, rate, channel, and loop
//!   metadata
//! - **Extract** - decode every sub-sound of a chunk to WAV files in a
//!   per-chunk workspace, in parallel
//! - **Rebuild** - re-encode the workspace through an external encoder tool,
//!   binary-searching Vorbis quality until the result fits the original
//!   chunk's byte length
//! - **Patch** - splice the rebuilt chunk back into the container at the
//!   exact original offset, preserving all surrounding bytes
//!
//! ## Quick Start
//!
//! ```no_run
//! use fsbforge::prelude::*;
//!
//! // Find every FSB chunk in a bank
//! let scan = scan_file(std::path::Path::new("Master.bank"))?;
//! for chunk in &scan.chunks {
//!     println!("{} at {:#x} ({} bytes)", chunk.display_name, chunk.chunk.offset, chunk.chunk.length);
//! }
//!
//! // Extract one chunk to its workspace
//! let gate = DecoderGate::default();
//! let log = SessionLog::disabled();
//! let cancel = CancellationToken::new();
//! let workspace = build_workspace(&gate, &scan.chunks[0].chunk, &log, &cancel, &|_| {})?;
//! println!("extracted to {}", workspace.dir.display());
//! # Ok::<(), fsbforge::Error>(())
//! ```
//!
//! Real-time playback, DSP analysis, and the GUI layer live outside this
//! crate; the decoder and encoder are reached through the seams in
//! [`decoder`] and [`rebuild`].

pub mod bank;
pub mod batch;
pub mod decoder;
pub mod error;
pub mod formats;
pub mod progress;
pub mod rebuild;
pub mod session_log;
pub mod workspace;

mod utils;

// Re-exports for convenience
pub use error::{Error, Result};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::error::{Error, Result};

    pub use crate::formats::fsb::{
        FsbChunkRef, FsbVersion, SampleCodec, SampleDescriptor, is_valid_header,
        resolve_chunk_length,
    };

    pub use crate::bank::{
        BankScan, ChunkMetadata, DiscoveredInputs, ScannedChunk, discover_inputs,
        read_chunk_metadata, scan_file,
    };

    pub use crate::batch::{AnalyzedBank, BatchAnalysis, analyze_banks};

    pub use crate::decoder::{AudioDecoder, DecoderGate, PcmDecoder, SubSoundInfo};

    pub use crate::workspace::{
        BuildFormat, FsbManifest, SubSoundManifestEntry, Workspace, build_workspace,
        sanitize_file_name,
    };

    pub use crate::rebuild::{
        BatchReplacement, FsbEncoder, ProcessEncoder, RebuildOptions, RebuildOrchestrator,
        RebuildOutcome, RebuildRequest, patch_container,
    };

    pub use crate::progress::{CancellationToken, ExtractProgress, RebuildPhase, RebuildProgress};
    pub use crate::session_log::SessionLog;
}

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
