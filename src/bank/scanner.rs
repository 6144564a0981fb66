//! Bank scanning: locate FSB chunks inside `.bank` and `.fsb` files
//!
//! A bank may embed FSB chunks at arbitrary byte offsets. The scanner walks
//! the file in 64 KiB windows looking for the three-byte `FSB` prefix,
//! validates every hit against the header validator, and resolves each
//! surviving chunk's byte length. Signature hits that fail validation are
//! silently skipped - random bytes matching `FSB` are expected, not an
//! error.

use std::collections::HashSet;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::Result;
use crate::utils::read_up_to;
use crate::formats::fsb::{
    FSB4_MAIN_HEADER_SIZE, FsbChunkRef, FsbVersion, LEGACY_SAMPLE_RECORD_SIZE, SCAN_OVERLAP,
    SCAN_WINDOW, SIG_PREFIX, is_valid_header, parse_legacy_chunk, resolve_chunk_length,
};

/// One validated chunk with its bank-unique display name
#[derive(Debug, Clone)]
pub struct ScannedChunk {
    pub chunk: FsbChunkRef,
    /// Internal FSB name, or `<basename>_<hex offset>`; unique within the bank
    pub display_name: String,
}

/// All chunks found in one container file, in ascending byte offset
#[derive(Debug)]
pub struct BankScan {
    pub path: PathBuf,
    pub chunks: Vec<ScannedChunk>,
}

/// Input files sorted into scannable banks and `.strings.bank` passthroughs
#[derive(Debug, Default)]
pub struct DiscoveredInputs {
    /// `.bank` / `.fsb` files to scan
    pub banks: Vec<PathBuf>,
    /// `.strings.bank` files, forwarded to the caller unparsed
    pub strings_banks: Vec<PathBuf>,
}

/// Enumerate input roots (files or directories) into scannable banks.
///
/// Directories are walked recursively; only names ending in `.bank` or
/// `.fsb` are kept. `.strings.bank` files are collected separately and never
/// parsed here.
pub fn discover_inputs(roots: &[PathBuf]) -> Result<DiscoveredInputs> {
    let mut inputs = DiscoveredInputs::default();

    for root in roots {
        if root.is_dir() {
            for entry in WalkDir::new(root).follow_links(true) {
                let entry = entry?;
                if entry.path().is_file() {
                    classify(entry.path(), &mut inputs);
                }
            }
        } else {
            classify(root, &mut inputs);
        }
    }

    inputs.banks.sort();
    inputs.strings_banks.sort();
    Ok(inputs)
}

fn classify(path: &Path, inputs: &mut DiscoveredInputs) {
    let name = path.file_name().map(|n| n.to_string_lossy().to_lowercase());
    let Some(name) = name else { return };

    if name.ends_with(".strings.bank") {
        inputs.strings_banks.push(path.to_path_buf());
    } else if name.ends_with(".bank") || name.ends_with(".fsb") {
        inputs.banks.push(path.to_path_buf());
    }
}

/// Scan one container file for FSB chunks.
///
/// Guarantees: offsets ascend, every emitted chunk passed header validation,
/// and no two chunks share a display name.
pub fn scan_file(path: &Path) -> Result<BankScan> {
    let mut file = File::open(path)?;
    let offsets = scan_offsets(&mut file)?;

    let mut used_names: HashSet<String> = HashSet::new();
    let mut chunks = Vec::with_capacity(offsets.len());

    for offset in offsets {
        let length = resolve_chunk_length(&mut file, offset)?;
        let version = signature_version(&mut file, offset)?;

        let base_name = internal_name(&mut file, offset, version)
            .unwrap_or_else(|| fallback_name(path, offset));
        let display_name = dedup_name(base_name, &mut used_names);

        chunks.push(ScannedChunk {
            chunk: FsbChunkRef {
                source: path.to_path_buf(),
                offset,
                version,
                length,
            },
            display_name,
        });
    }

    Ok(BankScan {
        path: path.to_path_buf(),
        chunks,
    })
}

/// Linear window scan for validated signature offsets, ascending.
fn scan_offsets(file: &mut File) -> Result<Vec<u64>> {
    let file_len = file.seek(SeekFrom::End(0))?;
    let mut offsets: Vec<u64> = Vec::new();
    let mut window = vec![0u8; SCAN_WINDOW];
    let mut pos = 0u64;

    while pos < file_len {
        file.seek(SeekFrom::Start(pos))?;
        let n = read_up_to(file, &mut window)?;
        if n < SIG_PREFIX.len() {
            break;
        }
        let at_eof = pos + n as u64 >= file_len;

        let mut i = 0;
        while i + SIG_PREFIX.len() <= n {
            if &window[i..i + SIG_PREFIX.len()] == SIG_PREFIX {
                let abs = pos + i as u64;
                // A hit too close to the window edge is re-examined in the
                // next window, where the full header is available.
                let enough = i + SCAN_OVERLAP <= n || at_eof;
                let fresh = offsets.last().is_none_or(|&o| o < abs);
                if enough && fresh && is_valid_header(&window[..n], i) {
                    offsets.push(abs);
                }
            }
            i += 1;
        }

        if at_eof {
            break;
        }
        pos += (n - SCAN_OVERLAP) as u64;
    }

    Ok(offsets)
}

fn signature_version(file: &mut File, offset: u64) -> Result<FsbVersion> {
    file.seek(SeekFrom::Start(offset + 3))?;
    let mut b = [0u8; 1];
    file.read_exact(&mut b)?;
    Ok(FsbVersion::from_signature_byte(b[0]))
}

/// The chunk's internal name: the first legacy sample-header name, when the
/// dialect carries one and it is non-empty.
fn internal_name(file: &mut File, offset: u64, version: FsbVersion) -> Option<String> {
    if !version.is_legacy() {
        return None;
    }

    // Main header plus one sample record is enough for the first name.
    let mut buf = vec![0u8; FSB4_MAIN_HEADER_SIZE + LEGACY_SAMPLE_RECORD_SIZE];
    file.seek(SeekFrom::Start(offset)).ok()?;
    let n = read_up_to(file, &mut buf).ok()?;
    buf.truncate(n);

    let name = parse_legacy_chunk(&buf)?.samples().next()?.name;
    if name.is_empty() { None } else { Some(name) }
}

fn fallback_name(path: &Path, offset: u64) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "bank".to_string());
    format!("{stem}_{offset:x}")
}

fn dedup_name(base: String, used: &mut HashSet<String>) -> String {
    if used.insert(base.clone()) {
        return base;
    }
    let mut counter = 1;
    loop {
        let candidate = format!("{base}_{counter}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}
