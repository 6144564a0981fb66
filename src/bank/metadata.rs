//! Chunk metadata assembly
//!
//! Combines the technical fields reported by the audio decoder with the
//! payload geometry recovered from the chunk's own headers: legacy chunks
//! carry per-sample offsets computed during the header walk, FSB5 chunks go
//! through the payload resolver. A sub-sound the decoder rejects is skipped
//! and logged; the remaining indices still produce descriptors.

use std::fs::File;
use std::io::{Seek, SeekFrom};

use crate::decoder::DecoderGate;
use crate::error::{Error, Result};
use crate::utils::read_up_to;
use crate::formats::fsb::{
    FSB4_MAIN_HEADER_SIZE, FsbChunkRef, FsbVersion, SampleDescriptor, is_valid_header,
    parse_legacy_chunk, resolve_fsb5_payload,
};

/// Everything known about one chunk's sub-sounds, in index order
#[derive(Debug)]
pub struct ChunkMetadata {
    pub chunk: FsbChunkRef,
    pub sub_sounds: Vec<SampleDescriptor>,
}

impl ChunkMetadata {
    #[must_use]
    pub fn sub_sound_count(&self) -> u32 {
        self.sub_sounds.len() as u32
    }

    /// Sum of sub-sound durations in milliseconds
    #[must_use]
    pub fn total_duration_ms(&self) -> u64 {
        self.sub_sounds.iter().map(SampleDescriptor::duration_ms).sum()
    }
}

/// Read per-sub-sound metadata for a chunk.
pub fn read_chunk_metadata(gate: &DecoderGate, chunk: &FsbChunkRef) -> Result<ChunkMetadata> {
    // Re-validate known-dialect chunks before touching the decoder; refs for
    // unknown versions are taken on faith (best-effort).
    if matches!(
        chunk.version,
        FsbVersion::Fsb3 | FsbVersion::Fsb4 | FsbVersion::Fsb5
    ) && !probe_header(chunk)?
    {
        return Err(Error::NotAnFsb {
            path: chunk.source.clone(),
            offset: chunk.offset,
        });
    }

    let container = gate.open(&chunk.source, chunk.offset)?;
    let count = container.sub_sound_count();

    let layout = read_payload_layout(chunk, count)?;

    let mut sub_sounds = Vec::with_capacity(count as usize);
    for index in 0..count {
        let mut descriptor = match container.sub_sound_info(index) {
            Ok(info) => SampleDescriptor {
                index,
                name: info.name,
                codec: info.codec,
                channels: info.channels.max(1),
                sample_rate_hz: info.sample_rate_hz,
                bits_per_sample: info.bits_per_sample,
                pcm_length_samples: info.pcm_length_samples,
                compressed_length_bytes: 0,
                loop_start_ms: info.loop_start_ms,
                loop_end_ms: info.loop_end_ms,
                loop_enabled: info.loop_enabled,
                data_offset_in_chunk: 0,
                data_length: 0,
            },
            Err(e) => {
                tracing::warn!(
                    "decoder rejected sub-sound {index} of {} at {:#x}: {e}",
                    chunk.source.display(),
                    chunk.offset
                );
                SampleDescriptor::unresolved(index)
            }
        };

        if let Some(&(offset, length)) = layout.get(index as usize) {
            descriptor.data_offset_in_chunk = offset;
            descriptor.data_length = length;
            descriptor.compressed_length_bytes = length;
        }
        sub_sounds.push(descriptor);
    }

    Ok(ChunkMetadata {
        chunk: chunk.clone(),
        sub_sounds,
    })
}

/// Validate the header bytes at the chunk offset.
fn probe_header(chunk: &FsbChunkRef) -> Result<bool> {
    let mut file = File::open(&chunk.source)?;
    file.seek(SeekFrom::Start(chunk.offset))?;
    let mut head = [0u8; 64];
    let n = read_up_to(&mut file, &mut head)?;
    Ok(is_valid_header(&head[..n], 0))
}

/// Per-index `(offset_in_chunk, length)` pairs; `(0, 0)` marks an unknown
/// layout for that index.
fn read_payload_layout(chunk: &FsbChunkRef, count: u32) -> Result<Vec<(u64, u64)>> {
    let mut file = File::open(&chunk.source)?;

    match chunk.version {
        FsbVersion::Fsb3 | FsbVersion::Fsb4 => legacy_layout(&mut file, chunk, count),
        FsbVersion::Fsb5 => {
            let file_length = file.seek(SeekFrom::End(0))?;
            Ok((0..count)
                .map(|i| resolve_fsb5_payload(&mut file, file_length, chunk.offset, i))
                .collect())
        }
        FsbVersion::Other(_) => Ok(vec![(0, 0); count as usize]),
    }
}

fn legacy_layout(file: &mut File, chunk: &FsbChunkRef, count: u32) -> Result<Vec<(u64, u64)>> {
    // Main header first, to size the sample-header region.
    file.seek(SeekFrom::Start(chunk.offset))?;
    let mut main = [0u8; FSB4_MAIN_HEADER_SIZE];
    if read_up_to(file, &mut main)? < FSB4_MAIN_HEADER_SIZE {
        return Ok(vec![(0, 0); count as usize]);
    }
    let shdr_size = u32::from_le_bytes(main[8..12].try_into().expect("4-byte slice"));

    let mut buf = vec![0u8; FSB4_MAIN_HEADER_SIZE + shdr_size as usize];
    file.seek(SeekFrom::Start(chunk.offset))?;
    let n = read_up_to(file, &mut buf)?;
    buf.truncate(n);

    let Some(parsed) = parse_legacy_chunk(&buf) else {
        return Ok(vec![(0, 0); count as usize]);
    };

    let mut layout: Vec<(u64, u64)> = parsed
        .samples()
        .map(|s| (s.data_offset_in_chunk, s.data_length))
        .collect();
    layout.resize(count as usize, (0, 0));
    Ok(layout)
}
