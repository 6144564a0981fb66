//! In-place chunk patching
//!
//! Splices a rebuilt chunk back into its container at the exact original
//! byte offset: prefix bytes, then the rebuilt file, then the suffix. The
//! rebuilt chunk is normally padded to the original chunk length, so every
//! offset outside the chunk survives bit-exact.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{Error, Result};
use crate::formats::fsb::FsbChunkRef;
use crate::utils::{copy_exact, copy_to_end};

/// Byte ranges a patch preserves around a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkBoundary {
    /// Bytes `[0, prefix_length)` are copied verbatim before the chunk
    pub prefix_length: u64,
    /// Bytes `[suffix_start, EOF)` are copied verbatim after the chunk
    pub suffix_start: u64,
}

impl ChunkBoundary {
    #[must_use]
    pub fn from_chunk(chunk: &FsbChunkRef) -> Self {
        Self {
            prefix_length: chunk.offset,
            suffix_start: chunk.offset + chunk.length,
        }
    }
}

/// Write `destination` as `source` with the chunk bytes replaced by the
/// contents of `rebuilt`.
pub fn patch_container(
    source: &Path,
    boundary: ChunkBoundary,
    rebuilt: &Path,
    destination: &Path,
) -> Result<()> {
    if source == destination {
        return Err(Error::SamePath(destination.to_path_buf()));
    }

    let mut src = File::open(source).map_err(|e| Error::io_at(source, "patch", e))?;
    let mut new_chunk = File::open(rebuilt).map_err(|e| Error::io_at(rebuilt, "patch", e))?;
    let dest_file =
        File::create(destination).map_err(|e| Error::io_at(destination, "patch", e))?;
    let mut dest = BufWriter::new(dest_file);

    copy_exact(&mut src, &mut dest, boundary.prefix_length)
        .map_err(|e| Error::io_at(source, "patch prefix", e))?;
    copy_to_end(&mut new_chunk, &mut dest)
        .map_err(|e| Error::io_at(rebuilt, "patch chunk", e))?;
    src.seek(SeekFrom::Start(boundary.suffix_start))?;
    copy_to_end(&mut src, &mut dest).map_err(|e| Error::io_at(source, "patch suffix", e))?;

    dest.flush()?;
    Ok(())
}
