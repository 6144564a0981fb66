//! Batch bank analysis
//!
//! Discovers container files under the input roots and analyses them in
//! parallel: scan for chunks, then read sub-sound metadata for each. The
//! pool is bounded by `min(cpu_count, n_files)`; a file's sub-tasks run
//! sequentially inside its worker. Per-file failures land in a failure bag
//! and never abort the batch.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;

use crate::bank::{ChunkMetadata, discover_inputs, read_chunk_metadata, scan_file};
use crate::decoder::DecoderGate;
use crate::error::{Error, Result};
use crate::progress::CancellationToken;

/// Progress of a batch analysis run
#[derive(Debug, Clone)]
pub struct AnalysisProgress {
    /// Files finished so far (1-indexed as reported)
    pub current: usize,
    pub total: usize,
    pub current_file: Option<String>,
}

/// Progress callback type for batch analysis
pub type AnalysisProgressCallback<'a> = &'a (dyn Fn(&AnalysisProgress) + Send + Sync);

/// One chunk with its display name and full metadata
#[derive(Debug)]
pub struct AnalyzedChunk {
    pub display_name: String,
    pub metadata: ChunkMetadata,
}

/// All chunks of one container file, in ascending offset
#[derive(Debug)]
pub struct AnalyzedBank {
    pub path: PathBuf,
    pub chunks: Vec<AnalyzedChunk>,
}

/// Outcome of a batch analysis
#[derive(Debug, Default)]
pub struct BatchAnalysis {
    pub banks: Vec<AnalyzedBank>,
    /// `.strings.bank` files found during discovery, forwarded unparsed
    pub strings_banks: Vec<PathBuf>,
    /// Files that could not be analysed: `(path, message)`
    pub failures: Vec<(PathBuf, String)>,
}

/// Discover and analyse every bank under `roots`.
pub fn analyze_banks(
    roots: &[PathBuf],
    gate: &DecoderGate,
    cancel: &CancellationToken,
    progress: AnalysisProgressCallback,
) -> Result<BatchAnalysis> {
    let inputs = discover_inputs(roots)?;
    let total = inputs.banks.len();

    let cpu_count = std::thread::available_parallelism()
        .map(std::num::NonZero::get)
        .unwrap_or(1);
    let workers = cpu_count.min(total.max(1));
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| Error::ThreadPool(e.to_string()))?;

    let processed = AtomicUsize::new(0);

    let results: Vec<std::result::Result<AnalyzedBank, (PathBuf, String)>> = pool.install(|| {
        inputs
            .banks
            .par_iter()
            .map(|path| {
                if cancel.is_cancelled() {
                    return Err((path.clone(), Error::Cancelled.to_string()));
                }

                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| path.to_string_lossy().to_string());
                let current = processed.fetch_add(1, Ordering::SeqCst) + 1;
                progress(&AnalysisProgress {
                    current,
                    total,
                    current_file: Some(file_name),
                });

                analyze_one(path, gate).map_err(|e| (path.clone(), e.to_string()))
            })
            .collect()
    });

    cancel.checkpoint()?;

    let mut analysis = BatchAnalysis {
        strings_banks: inputs.strings_banks,
        ..BatchAnalysis::default()
    };
    for result in results {
        match result {
            Ok(bank) => analysis.banks.push(bank),
            Err(failure) => analysis.failures.push(failure),
        }
    }
    Ok(analysis)
}

/// Scan one file and read metadata for every chunk, sequentially.
fn analyze_one(path: &PathBuf, gate: &DecoderGate) -> Result<AnalyzedBank> {
    let scan = scan_file(path)?;
    let mut chunks = Vec::with_capacity(scan.chunks.len());

    for scanned in scan.chunks {
        match read_chunk_metadata(gate, &scanned.chunk) {
            Ok(metadata) => chunks.push(AnalyzedChunk {
                display_name: scanned.display_name,
                metadata,
            }),
            Err(e) => {
                // Metadata failures degrade the chunk, not the whole bank.
                tracing::warn!(
                    "metadata for {} at {:#x} failed: {e}",
                    path.display(),
                    scanned.chunk.offset
                );
                chunks.push(AnalyzedChunk {
                    display_name: scanned.display_name,
                    metadata: ChunkMetadata {
                        chunk: scanned.chunk,
                        sub_sounds: Vec::new(),
                    },
                });
            }
        }
    }

    Ok(AnalyzedBank {
        path: path.clone(),
        chunks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::fsb::legacy::tests::{legacy_chunk, sample_record};
    use crate::formats::fsb::{FsbVersion, MODE_MONO};
    use pretty_assertions::assert_eq;

    #[test]
    fn analyzes_directory_of_banks() {
        let dir = tempfile::tempdir().unwrap();

        let rec = sample_record("s", 100, 200, 0, 0, MODE_MONO, 44100, 1);
        let chunk = legacy_chunk(FsbVersion::Fsb4, 0, &[rec], &[vec![0u8; 200]]);
        std::fs::write(dir.path().join("a.fsb"), &chunk).unwrap();
        std::fs::write(dir.path().join("b.fsb"), &chunk).unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"skip me").unwrap();
        std::fs::write(dir.path().join("Master.strings.bank"), b"gui").unwrap();

        let gate = DecoderGate::default();
        let cancel = CancellationToken::new();
        let analysis =
            analyze_banks(&[dir.path().to_path_buf()], &gate, &cancel, &|_| {}).unwrap();

        assert_eq!(analysis.banks.len(), 2);
        assert_eq!(analysis.strings_banks.len(), 1);
        assert!(analysis.failures.is_empty());
        for bank in &analysis.banks {
            assert_eq!(bank.chunks.len(), 1);
            assert_eq!(bank.chunks[0].metadata.sub_sound_count(), 1);
        }
    }

    #[test]
    fn unreadable_file_lands_in_failure_bag() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone.fsb");

        let gate = DecoderGate::default();
        let cancel = CancellationToken::new();
        let analysis = analyze_banks(&[missing], &gate, &cancel, &|_| {}).unwrap();
        assert!(analysis.banks.is_empty());
        assert_eq!(analysis.failures.len(), 1);
    }
}
