//! Rebuild orchestration
//!
//! Drives a rebuild through four phases, each owning a disjoint band of the
//! overall progress: prepare the workspace and apply replacements (30%),
//! build the new chunk (60%), patch it into the container (5%), clean up
//! (5%).
//!
//! Fixed-quality formats (PCM, FADPCM) build once. Vorbis binary-searches
//! the quality interval `[0, 100]` for the highest quality whose output
//! still fits the original chunk length, then pads the winner with zero
//! bytes to the exact length so the patch preserves every offset.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::encoder::{EncodeRequest, FsbEncoder};
use super::patcher::{ChunkBoundary, patch_container};
use crate::decoder::DecoderGate;
use crate::decoder::wav::{WavEncoding, WavStreamWriter};
use crate::error::{Error, Result};
use crate::formats::fsb::FsbChunkRef;
use crate::progress::{
    CancellationToken, RebuildPhase, RebuildProgress, RebuildProgressCallback,
};
use crate::session_log::SessionLog;
use crate::utils::COPY_BUF_SIZE;
use crate::workspace::{BuildFormat, Workspace, build_workspace, workspace_dir_for};

/// Cap on Vorbis quality-search iterations
const MAX_SEARCH_ITERATIONS: u32 = 8;

/// Replace one sub-sound's audio before the rebuild
#[derive(Debug, Clone)]
pub struct BatchReplacement {
    pub target_index: u32,
    pub new_audio_path: PathBuf,
}

/// Rebuild configuration
#[derive(Debug, Clone)]
pub struct RebuildOptions {
    pub encoding: BuildFormat,
    /// Honoured directly for fixed formats; seeds the first probe of the
    /// Vorbis binary search and is then overridden by the discovered optimum
    pub quality_hint: u8,
}

impl Default for RebuildOptions {
    fn default() -> Self {
        Self {
            encoding: BuildFormat::Vorbis,
            quality_hint: 100,
        }
    }
}

/// A finished (padded) build from an earlier run, for resume
#[derive(Debug, Clone)]
pub struct PreviousBuild {
    pub output: PathBuf,
}

/// Everything one rebuild needs
#[derive(Debug, Clone)]
pub struct RebuildRequest {
    pub chunk: FsbChunkRef,
    pub replacements: Vec<BatchReplacement>,
    pub destination: PathBuf,
    pub options: RebuildOptions,
    /// Accept a fixed-format build that exceeds the original chunk length
    pub force_oversize: bool,
    pub previous: Option<PreviousBuild>,
}

/// Terminal status of a rebuild
#[derive(Debug)]
pub enum RebuildOutcome {
    Success {
        destination: PathBuf,
    },
    Failed {
        message: String,
    },
    CancelledByUser,
    /// A fixed-format build came out larger than the chunk; the caller may
    /// re-run with `force_oversize` to accept `temporary_path` as-is
    OversizedConfirmationNeeded {
        original_size: u64,
        new_size: u64,
        temporary_path: PathBuf,
    },
}

/// Runs rebuilds against a decoder gate and an encoder seam.
///
/// Concurrent orchestrators on the same `(source, offset)` would share a
/// workspace path; the caller must serialise them.
pub struct RebuildOrchestrator<'a> {
    gate: &'a DecoderGate,
    encoder: &'a dyn FsbEncoder,
    log: &'a SessionLog,
    cancel: CancellationToken,
}

impl<'a> RebuildOrchestrator<'a> {
    pub fn new(
        gate: &'a DecoderGate,
        encoder: &'a dyn FsbEncoder,
        log: &'a SessionLog,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            gate,
            encoder,
            log,
            cancel,
        }
    }

    /// Write-through to the session sink and, once the workspace exists, the
    /// rebuild's own log file inside it.
    fn note(&self, request: &RebuildRequest, message: &str) {
        self.log.log(message);
        let dir = workspace_dir_for(&request.chunk.source, request.chunk.offset);
        if dir.is_dir() {
            crate::session_log::append_line(&dir.join("rebuild.log"), message);
        }
    }

    /// Run the rebuild to a terminal outcome. Errors become
    /// [`RebuildOutcome::Failed`]; cancellation becomes
    /// [`RebuildOutcome::CancelledByUser`] and leaves the workspace intact.
    pub fn run(
        &self,
        request: &RebuildRequest,
        progress: RebuildProgressCallback,
    ) -> RebuildOutcome {
        match self.run_inner(request, progress) {
            Ok(outcome) => outcome,
            Err(Error::Cancelled) => {
                self.note(request, "Rebuild cancelled by user");
                RebuildOutcome::CancelledByUser
            }
            Err(e) => {
                self.note(request, &format!("Rebuild failed: {e}"));
                RebuildOutcome::Failed {
                    message: e.to_string(),
                }
            }
        }
    }

    fn run_inner(
        &self,
        request: &RebuildRequest,
        progress: RebuildProgressCallback,
    ) -> Result<RebuildOutcome> {
        let chunk = &request.chunk;

        // Resume: a finished build from an earlier run goes straight to the
        // patch phase, skipping extraction and encoding entirely.
        if let Some(rebuilt) = self.find_previous_build(request)? {
            self.note(request, &format!(
                "Resuming with previous build {}",
                rebuilt.display()
            ));
            self.patch_phase(request, &rebuilt, progress)?;
            let workspace = Workspace::existing_for(&chunk.source, chunk.offset)
                .and_then(|dir| Workspace::open(dir).ok());
            return self.finish(request, workspace, progress);
        }

        // Phase A - prepare
        progress(&RebuildProgress::new(
            RebuildPhase::Prepare,
            0.0,
            RebuildPhase::Prepare.as_str(),
        ));
        let workspace = self.prepare_workspace(request, progress)?;
        self.apply_replacements(request, &workspace)?;
        self.cancel.checkpoint()?;

        // Phase B - build
        let rebuilt = match self.build_phase(request, &workspace, progress)? {
            BuildResult::Built(path) => path,
            BuildResult::Oversized { new_size, path } => {
                return Ok(RebuildOutcome::OversizedConfirmationNeeded {
                    original_size: chunk.length,
                    new_size,
                    temporary_path: path,
                });
            }
        };
        self.cancel.checkpoint()?;

        // Phase C - patch
        self.patch_phase(request, &rebuilt, progress)?;

        // Phase D - cleanup
        self.finish(request, Some(workspace), progress)
    }

    /// Look for a resumable build artifact: an explicit `PreviousBuild`, or
    /// a `output.good`/`output.fsb` left in the workspace by an earlier run.
    fn find_previous_build(&self, request: &RebuildRequest) -> Result<Option<PathBuf>> {
        if let Some(previous) = &request.previous
            && previous.output.is_file()
        {
            return Ok(Some(previous.output.clone()));
        }

        let Some(dir) = Workspace::existing_for(&request.chunk.source, request.chunk.offset)
        else {
            return Ok(None);
        };

        let final_output = dir.join("output.fsb");
        if final_output.is_file()
            && std::fs::metadata(&final_output)?.len() == request.chunk.length
        {
            return Ok(Some(final_output));
        }

        let good = dir.join("output.good");
        if good.is_file() && std::fs::metadata(&good)?.len() <= request.chunk.length {
            std::fs::rename(&good, &final_output)?;
            pad_to_length(&final_output, request.chunk.length)?;
            return Ok(Some(final_output));
        }

        Ok(None)
    }

    fn prepare_workspace(
        &self,
        request: &RebuildRequest,
        progress: RebuildProgressCallback,
    ) -> Result<Workspace> {
        if let Some(dir) = Workspace::existing_for(&request.chunk.source, request.chunk.offset) {
            self.note(request, &format!("Reusing workspace {}", dir.display()));
            return Workspace::open(dir);
        }

        build_workspace(self.gate, &request.chunk, self.log, &self.cancel, &|extract| {
            progress(&RebuildProgress::new(
                RebuildPhase::Prepare,
                extract.fraction(),
                format!(
                    "Extracting sub-sound {} of {}",
                    extract.current, extract.total
                ),
            ));
        })
    }

    /// Transcode each replacement onto the workspace WAV for its index.
    /// Replacements naming unknown indices are ignored.
    fn apply_replacements(&self, request: &RebuildRequest, workspace: &Workspace) -> Result<()> {
        for replacement in &request.replacements {
            self.cancel.checkpoint()?;
            let Some(entry) = workspace.manifest.entry(replacement.target_index) else {
                self.note(request, &format!(
                    "Replacement for unknown index {} ignored",
                    replacement.target_index
                ));
                continue;
            };

            let target = workspace.wav_path(entry);
            self.note(request, &format!(
                "Replacing sub-sound {} with {}",
                replacement.target_index,
                replacement.new_audio_path.display()
            ));
            self.transcode_to_wav(&replacement.new_audio_path, &target)?;
        }
        Ok(())
    }

    /// Decode `source` (any container the decoder understands) and write it
    /// as a canonical WAV at `target`.
    fn transcode_to_wav(&self, source: &Path, target: &Path) -> Result<()> {
        let container = self.gate.open(source, 0)?;
        let mut stream = container.open_sub_sound(0).map_err(Error::Decoder)?;
        let info = stream.info().clone();

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::File::create(target)
            .map_err(|e| Error::io_at(target, "replacement transcode", e))?;
        let encoding = WavEncoding::for_codec(info.codec);
        let mut writer = WavStreamWriter::new(file, encoding, info.channels, info.sample_rate_hz)
            .map_err(|e| Error::io_at(target, "replacement transcode", e))?;

        let mut buf = vec![0u8; 16 * 1024];
        loop {
            let n = stream.read_pcm(&mut buf).map_err(Error::Decoder)?;
            if n == 0 {
                break;
            }
            writer
                .write_data(&buf[..n])
                .map_err(|e| Error::io_at(target, "replacement transcode", e))?;
        }
        writer
            .finish()
            .map_err(|e| Error::io_at(target, "replacement transcode", e))?;
        Ok(())
    }

    fn build_phase(
        &self,
        request: &RebuildRequest,
        workspace: &Workspace,
        progress: RebuildProgressCallback,
    ) -> Result<BuildResult> {
        let chunk_length = request.chunk.length;
        let total = workspace.manifest.sub_sounds.len();
        let buildlist = workspace.buildlist_path();
        let final_output = workspace.dir.join("output.fsb");

        if !request.options.encoding.has_quality() {
            // Fixed-quality formats: one build.
            progress(&RebuildProgress::new(
                RebuildPhase::Build,
                0.0,
                RebuildPhase::Build.as_str(),
            ));
            let outcome = self.encoder.encode(&EncodeRequest {
                buildlist: &buildlist,
                output: &final_output,
                format: request.options.encoding,
                quality: None,
                sub_sound_total: total,
            })?;

            if outcome.output_size > chunk_length {
                if !request.force_oversize {
                    return Ok(BuildResult::Oversized {
                        new_size: outcome.output_size,
                        path: final_output,
                    });
                }
                self.note(request, &format!(
                    "Accepting oversized build: {} > {chunk_length} bytes",
                    outcome.output_size
                ));
            } else {
                pad_to_length(&final_output, chunk_length)?;
            }
            return Ok(BuildResult::Built(final_output));
        }

        // Vorbis: binary-search the highest quality that still fits.
        let tmp_output = workspace.dir.join("output.tmp");
        let good_output = workspace.dir.join("output.good");
        let mut lo: i32 = 0;
        let mut hi: i32 = 100;
        let mut best_quality: Option<u8> = None;
        let mut first_probe = true;

        for iteration in 0..MAX_SEARCH_ITERATIONS {
            if lo > hi {
                break;
            }
            self.cancel.checkpoint()?;

            let mid = if first_probe {
                i32::from(request.options.quality_hint).clamp(lo, hi)
            } else {
                (lo + hi) / 2
            };
            first_probe = false;

            progress(&RebuildProgress::new(
                RebuildPhase::Build,
                iteration as f32 / MAX_SEARCH_ITERATIONS as f32,
                format!("Trying Vorbis quality {mid}"),
            ));

            let result = self.encoder.encode(&EncodeRequest {
                buildlist: &buildlist,
                output: &tmp_output,
                format: BuildFormat::Vorbis,
                quality: Some(mid as u8),
                sub_sound_total: total,
            });

            match result {
                Ok(outcome) if outcome.output_size <= chunk_length => {
                    self.note(request, &format!(
                        "Quality {mid} fits: {} <= {chunk_length} bytes",
                        outcome.output_size
                    ));
                    if good_output.is_file() {
                        std::fs::remove_file(&good_output)?;
                    }
                    std::fs::rename(&tmp_output, &good_output)?;
                    best_quality = Some(mid as u8);
                    lo = mid + 1;
                }
                Ok(outcome) => {
                    self.note(request, &format!(
                        "Quality {mid} too large: {} > {chunk_length} bytes",
                        outcome.output_size
                    ));
                    let _ = std::fs::remove_file(&tmp_output);
                    hi = mid - 1;
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    self.note(request, &format!("Quality {mid} failed: {e}"));
                    let _ = std::fs::remove_file(&tmp_output);
                    hi = mid - 1;
                }
            }
        }

        let Some(best) = best_quality else {
            return Err(Error::NoQualityFits { chunk_length });
        };
        self.note(request, &format!("Best Vorbis quality: {best}"));

        std::fs::rename(&good_output, &final_output)?;
        pad_to_length(&final_output, chunk_length)?;
        Ok(BuildResult::Built(final_output))
    }

    fn patch_phase(
        &self,
        request: &RebuildRequest,
        rebuilt: &Path,
        progress: RebuildProgressCallback,
    ) -> Result<()> {
        progress(&RebuildProgress::new(
            RebuildPhase::Patch,
            0.0,
            RebuildPhase::Patch.as_str(),
        ));
        self.note(request, &format!(
            "Patching {} into {} at {:#x}",
            rebuilt.display(),
            request.destination.display(),
            request.chunk.offset
        ));
        patch_container(
            &request.chunk.source,
            ChunkBoundary::from_chunk(&request.chunk),
            rebuilt,
            &request.destination,
        )
    }

    fn finish(
        &self,
        request: &RebuildRequest,
        workspace: Option<Workspace>,
        progress: RebuildProgressCallback,
    ) -> Result<RebuildOutcome> {
        progress(&RebuildProgress::new(
            RebuildPhase::Cleanup,
            0.0,
            RebuildPhase::Cleanup.as_str(),
        ));
        if let Some(workspace) = workspace {
            // Cleanup failure is not worth failing a finished rebuild over.
            if let Err(e) = workspace.remove() {
                self.note(request, &format!("Workspace cleanup failed: {e}"));
            }
        }
        progress(&RebuildProgress::new(
            RebuildPhase::Complete,
            1.0,
            RebuildPhase::Complete.as_str(),
        ));
        self.note(request, &format!(
            "Rebuild complete: {}",
            request.destination.display()
        ));
        Ok(RebuildOutcome::Success {
            destination: request.destination.clone(),
        })
    }
}

enum BuildResult {
    Built(PathBuf),
    Oversized { new_size: u64, path: PathBuf },
}

/// Extend `path` with zero bytes up to exactly `length`.
fn pad_to_length(path: &Path, length: u64) -> Result<()> {
    let current = std::fs::metadata(path)?.len();
    if current > length {
        return Err(Error::Oversize {
            original_size: length,
            new_size: current,
        });
    }
    if current == length {
        return Ok(());
    }

    let mut file = OpenOptions::new().append(true).open(path)?;
    let mut remaining = (length - current) as usize;
    let zeros = vec![0u8; COPY_BUF_SIZE.min(remaining.max(1))];
    while remaining > 0 {
        let n = zeros.len().min(remaining);
        file.write_all(&zeros[..n])?;
        remaining -= n;
    }
    file.flush()?;
    Ok(())
}
