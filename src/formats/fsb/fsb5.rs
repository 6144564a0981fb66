//! FSB5 header reading and payload offset resolution
//!
//! FSB5 keeps a fixed 0x40-byte main header followed by a table of
//! fixed-size sample records (64 bytes for sub-version 0, 80 for
//! sub-version 1). Each record stores its payload offset and length relative
//! to the data section, which begins immediately after the record table.

use std::io::{Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};

use super::{
    FSB5_MAIN_HEADER_SIZE, FSB5_PAYLOAD_FIELD_V0, FSB5_PAYLOAD_FIELD_V1, FSB5_RECORD_SIZE_V0,
    FSB5_RECORD_SIZE_V1, FSB5_SIG,
};

/// Decoded FSB5 main header
#[derive(Debug, Clone)]
pub struct Fsb5MainHeader {
    pub sub_version: u32,
    pub num_samples: u32,
    pub sample_headers_size: u32,
    pub name_table_size: u32,
    pub data_size: u32,
    /// Container-wide mode/codec field as stored
    pub mode: u32,
}

impl Fsb5MainHeader {
    /// Chunk length implied by the header fields
    #[must_use]
    pub fn declared_total_size(&self) -> u64 {
        FSB5_MAIN_HEADER_SIZE
            + u64::from(self.sample_headers_size)
            + u64::from(self.name_table_size)
            + u64::from(self.data_size)
    }

    /// Record geometry for this sub-version: `(record_size, payload_field_offset)`.
    /// `None` for sub-versions this parser does not know.
    #[must_use]
    pub fn record_geometry(&self) -> Option<(u64, u64)> {
        match self.sub_version {
            0 => Some((FSB5_RECORD_SIZE_V0, FSB5_PAYLOAD_FIELD_V0)),
            1 => Some((FSB5_RECORD_SIZE_V1, FSB5_PAYLOAD_FIELD_V1)),
            _ => None,
        }
    }
}

/// Read the FSB5 main header at `chunk_start`.
///
/// Returns `None` on signature mismatch or a short read; both mean "not an
/// FSB5 chunk here" rather than an error.
pub fn read_fsb5_header<R: Read + Seek>(reader: &mut R, chunk_start: u64) -> Option<Fsb5MainHeader> {
    reader.seek(SeekFrom::Start(chunk_start)).ok()?;

    let mut sig = [0u8; 4];
    reader.read_exact(&mut sig).ok()?;
    if &sig != FSB5_SIG {
        return None;
    }

    let sub_version = reader.read_u32::<LittleEndian>().ok()?;
    let num_samples = reader.read_u32::<LittleEndian>().ok()?;
    let sample_headers_size = reader.read_u32::<LittleEndian>().ok()?;
    let name_table_size = reader.read_u32::<LittleEndian>().ok()?;
    let data_size = reader.read_u32::<LittleEndian>().ok()?;
    let mode = reader.read_u32::<LittleEndian>().ok()?;

    Some(Fsb5MainHeader {
        sub_version,
        num_samples,
        sample_headers_size,
        name_table_size,
        data_size,
        mode,
    })
}

/// Resolve a sample's payload position within an FSB5 chunk.
///
/// Returns `(data_offset_within_chunk, data_length)`, or `(0, 0)` on any
/// failure; callers treat that as "unknown layout" and fall back to the
/// durations reported by the audio decoder.
pub fn resolve_fsb5_payload<R: Read + Seek>(
    reader: &mut R,
    file_length: u64,
    chunk_start: u64,
    index: u32,
) -> (u64, u64) {
    resolve_inner(reader, file_length, chunk_start, index).unwrap_or((0, 0))
}

fn resolve_inner<R: Read + Seek>(
    reader: &mut R,
    file_length: u64,
    chunk_start: u64,
    index: u32,
) -> Option<(u64, u64)> {
    let header = read_fsb5_header(reader, chunk_start)?;
    if index >= header.num_samples {
        return None;
    }
    let (record_size, payload_field) = header.record_geometry()?;

    let table_start = chunk_start + FSB5_MAIN_HEADER_SIZE;
    let record_start = table_start + u64::from(index) * record_size;
    reader
        .seek(SeekFrom::Start(record_start + payload_field))
        .ok()?;
    let payload_offset = u64::from(reader.read_u32::<LittleEndian>().ok()?);
    let payload_length = u64::from(reader.read_u32::<LittleEndian>().ok()?);

    let data_section_start = table_start + u64::from(header.sample_headers_size);
    if data_section_start + payload_offset + payload_length > file_length {
        return None;
    }

    let offset_in_chunk = data_section_start + payload_offset - chunk_start;
    Some((offset_in_chunk, payload_length))
}
