//! Workspace extraction
//!
//! Copies the target chunk into the workspace as `source.fsb`, then decodes
//! every sub-sound to a WAV in parallel. The worker pool is oversubscribed
//! at 4x the core count: per-sub-sound latency is dominated by decoder work
//! plus disk I/O, so more in-flight tasks than cores keeps both busy. Each
//! worker holds its own decoder handle to `source.fsb`; only the opens go
//! through the global decoder lock.
//!
//! A sub-sound the decoder rejects is logged and its WAV omitted; the
//! manifest still lists the index so a rebuild can fail cleanly on it.

use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;

use super::manifest::{BuildFormat, FsbManifest, SubSoundManifestEntry};
use super::{Workspace, sanitize_file_name, workspace_dir_for};
use crate::decoder::wav::{WavEncoding, WavStreamWriter};
use crate::decoder::{DecoderGate, OpenContainer};
use crate::error::{Error, Result};
use crate::formats::fsb::FsbChunkRef;
use crate::progress::{CancellationToken, ExtractProgress, ExtractProgressCallback};
use crate::session_log::SessionLog;
use crate::utils::copy_exact;

/// PCM read granularity during sub-sound extraction
const PCM_READ_CHUNK: usize = 16 * 1024;

/// Extraction oversubscription factor
const WORKERS_PER_CPU: usize = 4;

/// Extract every sub-sound of `chunk` into its workspace.
///
/// Produces `source.fsb`, one WAV per decodable sub-sound under
/// `AudioSource/`, `manifest.json`, and `buildlist.txt`. On cancellation the
/// partially built workspace is left intact.
pub fn build_workspace(
    gate: &DecoderGate,
    chunk: &FsbChunkRef,
    log: &SessionLog,
    cancel: &CancellationToken,
    progress: ExtractProgressCallback,
) -> Result<Workspace> {
    let dir = workspace_dir_for(&chunk.source, chunk.offset);
    std::fs::create_dir_all(dir.join("AudioSource"))
        .map_err(|e| Error::io_at(dir.clone(), "workspace creation", e))?;

    // Extraction keeps its own per-session log file next to the artifacts.
    let log_file = dir.join("extract.log");
    note(log, &log_file, &format!(
        "Extracting chunk at {:#x} ({} bytes) from {}",
        chunk.offset,
        chunk.length,
        chunk.source.display()
    ));

    let source_fsb = dir.join("source.fsb");
    copy_chunk_bytes(chunk, &source_fsb)?;

    // Analyse the copied chunk to size the job and pick the build format.
    let container = gate.open(&source_fsb, 0)?;
    let count = container.sub_sound_count();
    let build_format = container
        .sub_sound_info(0)
        .map(|info| BuildFormat::for_codec(info.codec))
        .unwrap_or(BuildFormat::Pcm);
    drop(container);

    note(log, &log_file, &format!(
        "Chunk has {count} sub-sounds, build format {build_format:?}"
    ));

    let outcomes = extract_all(gate, &source_fsb, &dir, count, log, cancel, progress)?;
    cancel.checkpoint()?;

    // Completion order is nondeterministic; restore index order before the
    // manifest is written.
    let mut entries = outcomes;
    entries.sort_by_key(|e| e.index);

    let mut manifest = FsbManifest::new(build_format);
    manifest.sub_sounds = entries;

    let workspace = Workspace { dir, manifest };
    workspace.manifest.save(&workspace.manifest_path())?;
    workspace.write_buildlist()?;

    note(log, &log_file, "Extraction complete");
    Ok(workspace)
}

/// Write-through to the caller's sink and the workspace's own log file.
fn note(log: &SessionLog, log_file: &Path, message: &str) {
    log.log(message);
    crate::session_log::append_line(log_file, message);
}

/// Stream-copy the chunk bytes into `source.fsb`.
fn copy_chunk_bytes(chunk: &FsbChunkRef, dest: &Path) -> Result<()> {
    let mut source = File::open(&chunk.source)
        .map_err(|e| Error::io_at(chunk.source.clone(), "chunk copy", e))?;
    source.seek(SeekFrom::Start(chunk.offset))?;
    let mut out = File::create(dest).map_err(|e| Error::io_at(dest, "chunk copy", e))?;
    copy_exact(&mut source, &mut out, chunk.length)
        .map_err(|e| Error::io_at(chunk.source.clone(), "chunk copy", e))
}

fn extract_all(
    gate: &DecoderGate,
    source_fsb: &Path,
    workspace_dir: &Path,
    count: u32,
    log: &SessionLog,
    cancel: &CancellationToken,
    progress: ExtractProgressCallback,
) -> Result<Vec<SubSoundManifestEntry>> {
    let workers = WORKERS_PER_CPU
        * std::thread::available_parallelism()
            .map(std::num::NonZero::get)
            .unwrap_or(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
        .map_err(|e| Error::ThreadPool(e.to_string()))?;

    let audio_dir = workspace_dir.join("AudioSource");
    let log_file = workspace_dir.join("extract.log");
    let processed = AtomicUsize::new(0);

    let results: Vec<Result<SubSoundManifestEntry>> = pool.install(|| {
        (0..count)
            .into_par_iter()
            .map_init(
                // One decoder handle per worker, opened under the gate lock
                || gate.open(source_fsb, 0).ok(),
                |container, index| {
                    cancel.checkpoint()?;
                    let Some(container) = container.as_deref() else {
                        return Err(Error::Decoder(anyhow::anyhow!(
                            "worker failed to open a decoder handle"
                        )));
                    };

                    let entry = extract_one(container, &audio_dir, index, log, &log_file)?;
                    let current = processed.fetch_add(1, Ordering::SeqCst) + 1;
                    progress(&ExtractProgress {
                        current,
                        total: count as usize,
                        current_name: Some(entry.name.clone()),
                    });
                    Ok(entry)
                },
            )
            .collect()
    });

    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    results.into_iter().collect()
}

/// Extract one sub-sound to `AudioSource/NNN/<name>.wav`.
///
/// Decoder rejections are tolerated: the entry is still produced (so the
/// manifest covers the index) but no WAV is written.
fn extract_one(
    container: &dyn OpenContainer,
    audio_dir: &Path,
    index: u32,
    log: &SessionLog,
    log_file: &Path,
) -> Result<SubSoundManifestEntry> {
    let info = match container.sub_sound_info(index) {
        Ok(info) => info,
        Err(e) => {
            note(log, log_file, &format!(
                "Sub-sound {index}: decoder rejected metadata: {e}"
            ));
            return Ok(placeholder_entry(index));
        }
    };

    let file_stem = if info.name.is_empty() {
        format!("sample_{index:03}")
    } else {
        sanitize_file_name(&info.name)
    };
    let relative_wav_path = format!("{index:03}/{file_stem}.wav");

    let mut entry = SubSoundManifestEntry {
        index,
        name: info.name.clone(),
        relative_wav_path,
        loop_enabled: info.loop_enabled,
        loop_start_ms: info.loop_start_ms,
        loop_end_ms: info.loop_end_ms,
    };

    let mut stream = match container.open_sub_sound(index) {
        Ok(stream) => stream,
        Err(e) => {
            note(log, log_file, &format!(
                "Sub-sound {index} ({}): skipped: {e}",
                entry.name
            ));
            return Ok(entry);
        }
    };

    let index_dir = audio_dir.join(format!("{index:03}"));
    std::fs::create_dir_all(&index_dir)
        .map_err(|e| Error::io_at(index_dir.clone(), "extraction", e))?;
    let wav_path = audio_dir.join(&entry.relative_wav_path);

    let file =
        File::create(&wav_path).map_err(|e| Error::io_at(wav_path.clone(), "extraction", e))?;
    let encoding = WavEncoding::for_codec(info.codec);
    let mut writer = WavStreamWriter::new(file, encoding, info.channels, info.sample_rate_hz)
        .map_err(|e| Error::io_at(wav_path.clone(), "extraction", e))?;

    let mut buf = vec![0u8; PCM_READ_CHUNK];
    loop {
        let n = match stream.read_pcm(&mut buf) {
            Ok(n) => n,
            Err(e) => {
                // Mid-stream decoder failure: drop the partial WAV and keep
                // the manifest entry.
                note(log, log_file, &format!(
                    "Sub-sound {index} ({}): read failed: {e}",
                    entry.name
                ));
                drop(writer);
                let _ = std::fs::remove_file(&wav_path);
                return Ok(entry);
            }
        };
        if n == 0 {
            break;
        }
        writer
            .write_data(&buf[..n])
            .map_err(|e| Error::io_at(wav_path.clone(), "extraction", e))?;
    }
    let written = writer
        .finish()
        .map_err(|e| Error::io_at(wav_path.clone(), "extraction", e))?;

    tracing::debug!("sub-sound {index}: {written} PCM bytes -> {}", entry.relative_wav_path);
    Ok(entry)
}

fn placeholder_entry(index: u32) -> SubSoundManifestEntry {
    SubSoundManifestEntry {
        index,
        name: String::new(),
        relative_wav_path: format!("{index:03}/sample_{index:03}.wav"),
        loop_enabled: false,
        loop_start_ms: 0,
        loop_end_ms: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::fsb::legacy::tests::{legacy_chunk, sample_record};
    use crate::formats::fsb::{FsbVersion, MODE_MONO, MODE_MPEG};
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn pcm16_payload(samples: u32) -> Vec<u8> {
        (0..samples).flat_map(|i| (i as i16).to_le_bytes()).collect()
    }

    // Distinct file names per test: the workspace path is derived from the
    // container name, and tests run concurrently.
    fn temp_chunk(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> FsbChunkRef {
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        FsbChunkRef {
            source: path,
            offset: 0,
            version: FsbVersion::Fsb4,
            length: bytes.len() as u64,
        }
    }

    fn isolated_workspace(chunk: &FsbChunkRef) -> PathBuf {
        workspace_dir_for(&chunk.source, chunk.offset)
    }

    #[test]
    fn extracts_pcm_chunk_round_trip() {
        let payload_a = pcm16_payload(500);
        let payload_b = pcm16_payload(300);
        let rec_a = sample_record("alpha", 500, payload_a.len() as u32, 0, 0, MODE_MONO, 22050, 1);
        let rec_b = sample_record("beta", 300, payload_b.len() as u32, 0, 0, MODE_MONO, 22050, 1);
        let bytes = legacy_chunk(
            FsbVersion::Fsb4,
            0,
            &[rec_a, rec_b],
            &[payload_a.clone(), payload_b.clone()],
        );

        let dir = tempfile::tempdir().unwrap();
        let chunk = temp_chunk(&dir, "extract_roundtrip.fsb", &bytes);
        let ws_dir = isolated_workspace(&chunk);
        let _ = std::fs::remove_dir_all(&ws_dir);

        let gate = DecoderGate::default();
        let log = SessionLog::disabled();
        let cancel = CancellationToken::new();
        let ws = build_workspace(&gate, &chunk, &log, &cancel, &|_| {}).unwrap();

        assert_eq!(ws.manifest.build_format, BuildFormat::Pcm);
        assert_eq!(ws.manifest.sub_sounds.len(), 2);
        assert_eq!(ws.manifest.sub_sounds[0].relative_wav_path, "000/alpha.wav");
        assert_eq!(ws.manifest.sub_sounds[1].relative_wav_path, "001/beta.wav");

        // source.fsb is a byte-exact copy of the chunk
        assert_eq!(std::fs::read(ws.source_fsb()).unwrap(), bytes);

        // WAV payload round-trips the PCM bytes exactly
        let wav = std::fs::read(ws.wav_path(&ws.manifest.sub_sounds[0])).unwrap();
        assert_eq!(&wav[44..], payload_a.as_slice());
        let declared = u32::from_le_bytes(wav[40..44].try_into().unwrap());
        assert_eq!(declared as usize, payload_a.len());

        // buildlist has one line per sub-sound
        let buildlist = std::fs::read_to_string(ws.buildlist_path()).unwrap();
        assert_eq!(buildlist.lines().count(), 2);

        ws.remove().unwrap();
    }

    #[test]
    fn undecodable_sub_sound_is_listed_but_not_written() {
        let pcm = pcm16_payload(100);
        let rec_a = sample_record("ok", 100, pcm.len() as u32, 0, 0, MODE_MONO, 44100, 1);
        let rec_b = sample_record("mp3ish", 100, 64, 0, 0, MODE_MPEG, 44100, 2);
        let bytes = legacy_chunk(
            FsbVersion::Fsb4,
            0,
            &[rec_a, rec_b],
            &[pcm, vec![0u8; 64]],
        );

        let dir = tempfile::tempdir().unwrap();
        let chunk = temp_chunk(&dir, "extract_skips.fsb", &bytes);
        let _ = std::fs::remove_dir_all(isolated_workspace(&chunk));

        let gate = DecoderGate::default();
        let log = SessionLog::disabled();
        let cancel = CancellationToken::new();
        let ws = build_workspace(&gate, &chunk, &log, &cancel, &|_| {}).unwrap();

        assert_eq!(ws.manifest.sub_sounds.len(), 2);
        assert!(ws.wav_path(&ws.manifest.sub_sounds[0]).is_file());
        assert!(!ws.wav_path(&ws.manifest.sub_sounds[1]).is_file());

        // Buildlist still covers both indices
        let buildlist = std::fs::read_to_string(ws.buildlist_path()).unwrap();
        assert_eq!(buildlist.lines().count(), 2);

        ws.remove().unwrap();
    }

    #[test]
    fn cancellation_leaves_workspace_intact() {
        let pcm = pcm16_payload(100);
        let rec = sample_record("x", 100, pcm.len() as u32, 0, 0, MODE_MONO, 44100, 1);
        let bytes = legacy_chunk(FsbVersion::Fsb4, 0, &[rec], &[pcm]);

        let dir = tempfile::tempdir().unwrap();
        let chunk = temp_chunk(&dir, "extract_cancel.fsb", &bytes);
        let ws_dir = isolated_workspace(&chunk);
        let _ = std::fs::remove_dir_all(&ws_dir);

        let gate = DecoderGate::default();
        let log = SessionLog::disabled();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = build_workspace(&gate, &chunk, &log, &cancel, &|_| {}).unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        // The partially built workspace (source.fsb at least) survives
        assert!(ws_dir.join("source.fsb").is_file());
        let _ = std::fs::remove_dir_all(&ws_dir);
    }
}
