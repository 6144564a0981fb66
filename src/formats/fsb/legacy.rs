//! Legacy FSB3/FSB4 header parsing
//!
//! Both dialects share the sample-record layout; FSB4 adds a 24-byte reserved
//! block to the main header and aligns payloads to 32 bytes. Records are
//! variable-length: each declares its own total size in its first field, and
//! the header cursor advances by that declared size rather than the fixed
//! record length.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};

use super::{
    DEFAULT_SAMPLE_RATE, FSB3_MAIN_HEADER_SIZE, FSB3_SIG, FSB4_MAIN_HEADER_SIZE, FSB4_SIG,
    FSB5_SIG, FsbVersion, LEGACY_DATA_ALIGN, LEGACY_NAME_LEN, LEGACY_SAMPLE_RECORD_SIZE,
    MODE_8BITS, MODE_GC_ADPCM, MODE_IMA_ADPCM, MODE_LOOP_NORMAL, MODE_MONO, MODE_MPEG,
    MODE_MPEG_PADDED, MODE_STEREO, MODE_VAG, MODE_XMA, SampleCodec, SampleDescriptor,
};

/// Decoded FSB3/FSB4 main header
#[derive(Debug, Clone)]
pub struct LegacyMainHeader {
    pub version: FsbVersion,
    pub num_samples: u32,
    pub sample_headers_size: u32,
    pub data_size: u32,
    /// Format version field as stored
    pub format_version: u32,
    /// Container-wide mode flags
    pub global_mode: u32,
}

impl LegacyMainHeader {
    /// Byte size of this dialect's main header
    #[must_use]
    pub fn size(&self) -> usize {
        match self.version {
            FsbVersion::Fsb3 => FSB3_MAIN_HEADER_SIZE,
            _ => FSB4_MAIN_HEADER_SIZE,
        }
    }

    /// Offset (within the chunk) where the payload region begins
    #[must_use]
    pub fn data_region_start(&self) -> u64 {
        self.size() as u64 + u64::from(self.sample_headers_size)
    }
}

/// A legacy chunk viewed over a raw byte buffer positioned at the signature
pub struct LegacyChunk<'a> {
    buf: &'a [u8],
    header: LegacyMainHeader,
}

impl<'a> LegacyChunk<'a> {
    #[must_use]
    pub fn header(&self) -> &LegacyMainHeader {
        &self.header
    }

    /// Lazy walk over the sample-header records.
    ///
    /// Stops early if a record is truncated or declares a size smaller than
    /// the fixed record layout; a short walk simply yields fewer descriptors.
    #[must_use]
    pub fn samples(&self) -> LegacySampleIter<'a> {
        LegacySampleIter {
            buf: self.buf,
            version: self.header.version,
            global_mode: self.header.global_mode,
            header_cursor: self.header.size(),
            data_cursor: self.header.data_region_start(),
            remaining: self.header.num_samples,
            index: 0,
        }
    }
}

/// Parse a legacy chunk from a buffer starting at the `FSB3`/`FSB4` signature.
///
/// Returns `None` when the bytes are not a legacy FSB header; that is the
/// expected outcome while scanning, not an error.
#[must_use]
pub fn parse_legacy_chunk(buf: &[u8]) -> Option<LegacyChunk<'_>> {
    let version = match buf.get(..4)? {
        sig if sig == FSB3_SIG => FsbVersion::Fsb3,
        sig if sig == FSB4_SIG => FsbVersion::Fsb4,
        _ => return None,
    };

    let header_size = match version {
        FsbVersion::Fsb3 => FSB3_MAIN_HEADER_SIZE,
        _ => FSB4_MAIN_HEADER_SIZE,
    };
    if buf.len() < header_size {
        return None;
    }

    let mut cursor = Cursor::new(&buf[4..header_size]);
    let num_samples = cursor.read_u32::<LittleEndian>().ok()?;
    let sample_headers_size = cursor.read_u32::<LittleEndian>().ok()?;
    let data_size = cursor.read_u32::<LittleEndian>().ok()?;
    let format_version = cursor.read_u32::<LittleEndian>().ok()?;
    let global_mode = cursor.read_u32::<LittleEndian>().ok()?;
    // FSB4 carries a further 24 reserved bytes; nothing in them is needed.

    Some(LegacyChunk {
        buf,
        header: LegacyMainHeader {
            version,
            num_samples,
            sample_headers_size,
            data_size,
            format_version,
            global_mode,
        },
    })
}

/// Iterator over legacy sample-header records
pub struct LegacySampleIter<'a> {
    buf: &'a [u8],
    version: FsbVersion,
    global_mode: u32,
    header_cursor: usize,
    data_cursor: u64,
    remaining: u32,
    index: u32,
}

impl Iterator for LegacySampleIter<'_> {
    type Item = SampleDescriptor;

    fn next(&mut self) -> Option<SampleDescriptor> {
        if self.remaining == 0 {
            return None;
        }
        let record = self
            .buf
            .get(self.header_cursor..self.header_cursor + LEGACY_SAMPLE_RECORD_SIZE)?;

        let mut cursor = Cursor::new(record);
        let declared_size = cursor.read_u16::<LittleEndian>().ok()?;
        if (declared_size as usize) < LEGACY_SAMPLE_RECORD_SIZE {
            return None;
        }

        let name_bytes = &record[2..2 + LEGACY_NAME_LEN];
        let name = String::from_utf8_lossy(name_bytes)
            .trim_end_matches('\0')
            .to_string();
        cursor.set_position(2 + LEGACY_NAME_LEN as u64);

        let pcm_length = cursor.read_u32::<LittleEndian>().ok()?;
        let compressed_length = cursor.read_u32::<LittleEndian>().ok()?;
        let loop_start = cursor.read_u32::<LittleEndian>().ok()?;
        let loop_end = cursor.read_u32::<LittleEndian>().ok()?;
        let mode = cursor.read_u32::<LittleEndian>().ok()?;
        let default_freq = cursor.read_i32::<LittleEndian>().ok()?;
        let _default_vol = cursor.read_u16::<LittleEndian>().ok()?;
        let _default_pan = cursor.read_i16::<LittleEndian>().ok()?;
        let _default_pri = cursor.read_u16::<LittleEndian>().ok()?;
        let num_channels = cursor.read_u16::<LittleEndian>().ok()?;

        let codec = codec_from_mode(mode);
        let channels = channels_from_mode(mode, num_channels);
        let raw_rate = if default_freq > 0 { default_freq as u32 } else { 0 };
        let sample_rate_hz = if raw_rate == 0 { DEFAULT_SAMPLE_RATE } else { raw_rate };

        // Loop conversion uses the raw header rate: a 0 Hz header collapses
        // the endpoints to 0 even though the descriptor rate is defaulted.
        let loop_end_clamped = u64::from(loop_end).min(u64::from(pcm_length));
        let (loop_start_ms, loop_end_ms) = if raw_rate == 0 {
            (0, 0)
        } else {
            (
                samples_to_ms(u64::from(loop_start), raw_rate),
                samples_to_ms(loop_end_clamped, raw_rate),
            )
        };
        let loop_enabled = mode & MODE_LOOP_NORMAL != 0 || loop_start != 0 || loop_end != 0;

        let descriptor = SampleDescriptor {
            index: self.index,
            name,
            codec,
            channels,
            sample_rate_hz,
            bits_per_sample: bits_for_codec(codec),
            pcm_length_samples: u64::from(pcm_length),
            compressed_length_bytes: u64::from(compressed_length),
            loop_start_ms,
            loop_end_ms,
            loop_enabled,
            data_offset_in_chunk: self.data_cursor,
            data_length: u64::from(compressed_length),
        };

        self.header_cursor += declared_size as usize;
        self.data_cursor += u64::from(compressed_length);
        if self.version == FsbVersion::Fsb4 || self.global_mode & MODE_STEREO != 0 {
            self.data_cursor = align_up(self.data_cursor, LEGACY_DATA_ALIGN);
        }
        self.remaining -= 1;
        self.index += 1;

        Some(descriptor)
    }
}

/// Map legacy mode flags to a codec.
///
/// Flag-specific codecs win over the bit-width fallback; MPEG padding is a
/// variant of MPEG, not a codec of its own.
fn codec_from_mode(mode: u32) -> SampleCodec {
    if mode & (MODE_MPEG_PADDED | MODE_MPEG) != 0 {
        SampleCodec::Mpeg
    } else if mode & MODE_IMA_ADPCM != 0 {
        SampleCodec::ImaAdpcm
    } else if mode & MODE_XMA != 0 {
        SampleCodec::Xma
    } else if mode & MODE_VAG != 0 {
        SampleCodec::Vag
    } else if mode & MODE_GC_ADPCM != 0 {
        SampleCodec::GcAdpcm
    } else if mode & MODE_8BITS != 0 {
        SampleCodec::Pcm8
    } else {
        SampleCodec::Pcm16
    }
}

fn channels_from_mode(mode: u32, header_channels: u16) -> u16 {
    if mode & MODE_MONO != 0 {
        1
    } else if mode & MODE_STEREO != 0 {
        2
    } else {
        header_channels.max(1)
    }
}

fn bits_for_codec(codec: SampleCodec) -> u8 {
    match codec {
        SampleCodec::Pcm8 => 8,
        SampleCodec::Pcm16 => 16,
        SampleCodec::PcmFloat => 32,
        SampleCodec::ImaAdpcm => 4,
        _ => 0,
    }
}

/// Integer sample→millisecond conversion. Truncates; boundary off-by-one
/// behavior is intentional and pinned by tests.
fn samples_to_ms(samples: u64, rate: u32) -> u64 {
    samples * 1000 / u64::from(rate)
}

fn align_up(value: u64, align: u64) -> u64 {
    value.div_ceil(align) * align
}

/// Check whether `buf[offset..]` looks like a valid FSB header.
///
/// Used by the scanner to filter signature hits; returning `false` means
/// "not an FSB at this offset", which is an expected outcome.
#[must_use]
pub fn is_valid_header(buf: &[u8], offset: usize) -> bool {
    let Some(sig) = buf.get(offset..offset + 4) else {
        return false;
    };

    if sig == FSB5_SIG {
        let Some(head) = buf.get(offset..offset + 24) else {
            return false;
        };
        let num_samples = read_u32_at(head, 8);
        let shdr_size = read_u32_at(head, 12);
        let data_size = read_u32_at(head, 20);
        return num_samples > 0 && shdr_size != 0 && data_size != 0;
    }

    if sig == FSB3_SIG || sig == FSB4_SIG {
        let Some(head) = buf.get(offset..offset + 16) else {
            return false;
        };
        let num_samples = read_u32_at(head, 4);
        let shdr_size = read_u32_at(head, 8);
        let data_size = read_u32_at(head, 12);
        if num_samples == 0 || shdr_size == 0 || data_size == 0 {
            return false;
        }
        if shdr_size % num_samples != 0 {
            return false;
        }
        let per_sample = shdr_size / num_samples;
        return (24..=128).contains(&per_sample);
    }

    false
}

fn read_u32_at(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(buf[at..at + 4].try_into().expect("4-byte slice"))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Build one legacy sample record with the fixed 64-byte layout
    pub(crate) fn sample_record(
        name: &str,
        pcm_length: u32,
        compressed_length: u32,
        loop_start: u32,
        loop_end: u32,
        mode: u32,
        freq: i32,
        channels: u16,
    ) -> Vec<u8> {
        let mut rec = Vec::with_capacity(LEGACY_SAMPLE_RECORD_SIZE);
        rec.extend_from_slice(&(LEGACY_SAMPLE_RECORD_SIZE as u16).to_le_bytes());
        let mut name_buf = [0u8; LEGACY_NAME_LEN];
        let bytes = name.as_bytes();
        name_buf[..bytes.len().min(LEGACY_NAME_LEN)]
            .copy_from_slice(&bytes[..bytes.len().min(LEGACY_NAME_LEN)]);
        rec.extend_from_slice(&name_buf);
        rec.extend_from_slice(&pcm_length.to_le_bytes());
        rec.extend_from_slice(&compressed_length.to_le_bytes());
        rec.extend_from_slice(&loop_start.to_le_bytes());
        rec.extend_from_slice(&loop_end.to_le_bytes());
        rec.extend_from_slice(&mode.to_le_bytes());
        rec.extend_from_slice(&freq.to_le_bytes());
        rec.extend_from_slice(&255u16.to_le_bytes()); // default volume
        rec.extend_from_slice(&0i16.to_le_bytes()); // default pan
        rec.extend_from_slice(&128u16.to_le_bytes()); // default priority
        rec.extend_from_slice(&channels.to_le_bytes());
        assert_eq!(rec.len(), LEGACY_SAMPLE_RECORD_SIZE);
        rec
    }

    /// Build a complete legacy chunk from sample records and payloads.
    ///
    /// Payload placement follows the parser's cursor rule: the absolute
    /// cursor (within the chunk) advances by each payload length and rounds
    /// up to a 32-byte boundary for FSB4 or a stereo global mode.
    pub(crate) fn legacy_chunk(
        version: FsbVersion,
        global_mode: u32,
        records: &[Vec<u8>],
        payloads: &[Vec<u8>],
    ) -> Vec<u8> {
        let header_size = match version {
            FsbVersion::Fsb3 => FSB3_MAIN_HEADER_SIZE,
            _ => FSB4_MAIN_HEADER_SIZE,
        };
        let shdr_size: usize = records.iter().map(Vec::len).sum();
        let data_start = header_size + shdr_size;
        let align = version == FsbVersion::Fsb4 || global_mode & MODE_STEREO != 0;

        let mut data = Vec::new();
        let mut cursor = data_start as u64;
        for payload in payloads {
            let rel = cursor as usize - data_start;
            if data.len() < rel {
                data.resize(rel, 0);
            }
            data.extend_from_slice(payload);
            cursor += payload.len() as u64;
            if align {
                cursor = cursor.div_ceil(LEGACY_DATA_ALIGN) * LEGACY_DATA_ALIGN;
            }
        }

        let mut chunk = Vec::new();
        chunk.extend_from_slice(match version {
            FsbVersion::Fsb3 => FSB3_SIG,
            _ => FSB4_SIG,
        });
        chunk.extend_from_slice(&(records.len() as u32).to_le_bytes());
        chunk.extend_from_slice(&(shdr_size as u32).to_le_bytes());
        chunk.extend_from_slice(&(data.len() as u32).to_le_bytes());
        chunk.extend_from_slice(&0x00040000u32.to_le_bytes()); // format version
        chunk.extend_from_slice(&global_mode.to_le_bytes());
        if version == FsbVersion::Fsb4 {
            chunk.extend_from_slice(&[0u8; 24]);
        }
        for rec in records {
            chunk.extend_from_slice(rec);
        }
        chunk.extend_from_slice(&data);
        chunk
    }

    #[test]
    fn parses_fsb3_mono_pcm16() {
        // 100 ms of 22050 Hz mono PCM16: 2205 samples, 4410 bytes
        let rec = sample_record("tone", 2205, 4410, 0, 0, MODE_MONO, 22050, 1);
        let chunk = legacy_chunk(FsbVersion::Fsb3, 0, &[rec], &[vec![0u8; 4410]]);

        let parsed = parse_legacy_chunk(&chunk).expect("valid chunk");
        assert_eq!(parsed.header().num_samples, 1);
        assert_eq!(parsed.header().size(), FSB3_MAIN_HEADER_SIZE);

        let samples: Vec<_> = parsed.samples().collect();
        assert_eq!(samples.len(), 1);
        let s = &samples[0];
        assert_eq!(s.name, "tone");
        assert_eq!(s.codec, SampleCodec::Pcm16);
        assert_eq!(s.channels, 1);
        assert_eq!(s.sample_rate_hz, 22050);
        assert_eq!(s.bits_per_sample, 16);
        assert_eq!(s.data_offset_in_chunk, 24 + 64);
        assert_eq!(s.data_length, 4410);
        assert!(!s.loop_enabled);
    }

    #[test]
    fn fsb4_aligns_payload_cursor() {
        let rec_a = sample_record("a", 100, 100, 0, 0, MODE_MONO, 44100, 1);
        let rec_b = sample_record("b", 100, 100, 0, 0, MODE_MONO, 44100, 1);
        let chunk = legacy_chunk(
            FsbVersion::Fsb4,
            0,
            &[rec_a, rec_b],
            &[vec![1u8; 100], vec![2u8; 100]],
        );

        let parsed = parse_legacy_chunk(&chunk).expect("valid chunk");
        let samples: Vec<_> = parsed.samples().collect();
        // First payload at 48 + 128 = 176; the cursor reaches 276 and rounds
        // up to the next 32-byte boundary.
        assert_eq!(samples[0].data_offset_in_chunk, 176);
        assert_eq!(samples[1].data_offset_in_chunk, 288);
    }

    #[test]
    fn fsb3_without_stereo_flag_does_not_align() {
        let rec_a = sample_record("a", 100, 100, 0, 0, MODE_MONO, 44100, 1);
        let rec_b = sample_record("b", 100, 100, 0, 0, MODE_MONO, 44100, 1);
        let chunk = legacy_chunk(
            FsbVersion::Fsb3,
            0,
            &[rec_a, rec_b],
            &[vec![1u8; 100], vec![2u8; 100]],
        );

        let parsed = parse_legacy_chunk(&chunk).expect("valid chunk");
        let samples: Vec<_> = parsed.samples().collect();
        assert_eq!(samples[1].data_offset_in_chunk, samples[0].data_offset_in_chunk + 100);
    }

    #[test]
    fn codec_priority_prefers_flag_codecs() {
        assert_eq!(codec_from_mode(MODE_MPEG | MODE_IMA_ADPCM), SampleCodec::Mpeg);
        assert_eq!(codec_from_mode(MODE_MPEG_PADDED), SampleCodec::Mpeg);
        assert_eq!(codec_from_mode(MODE_IMA_ADPCM | MODE_XMA), SampleCodec::ImaAdpcm);
        assert_eq!(codec_from_mode(MODE_XMA), SampleCodec::Xma);
        assert_eq!(codec_from_mode(MODE_VAG), SampleCodec::Vag);
        assert_eq!(codec_from_mode(MODE_GC_ADPCM), SampleCodec::GcAdpcm);
        assert_eq!(codec_from_mode(MODE_8BITS), SampleCodec::Pcm8);
        assert_eq!(codec_from_mode(0), SampleCodec::Pcm16);
    }

    #[test]
    fn loop_conversion_is_integer_and_clamped() {
        // loop_end beyond pcm_length clamps to pcm_length before conversion
        let rec = sample_record("loopy", 1000, 2000, 441, 5000, MODE_LOOP_NORMAL, 44100, 1);
        let chunk = legacy_chunk(FsbVersion::Fsb3, 0, &[rec], &[vec![0u8; 2000]]);
        let s = parse_legacy_chunk(&chunk).unwrap().samples().next().unwrap();
        assert_eq!(s.loop_start_ms, 441 * 1000 / 44100); // 10 ms exactly
        assert_eq!(s.loop_end_ms, 1000 * 1000 / 44100); // truncated 22 ms
        assert!(s.loop_enabled);
    }

    #[test]
    fn zero_rate_collapses_loops_and_defaults_rate() {
        let rec = sample_record("z", 1000, 2000, 100, 900, 0, 0, 2);
        let chunk = legacy_chunk(FsbVersion::Fsb3, 0, &[rec], &[vec![0u8; 2000]]);
        let s = parse_legacy_chunk(&chunk).unwrap().samples().next().unwrap();
        assert_eq!(s.sample_rate_hz, DEFAULT_SAMPLE_RATE);
        assert_eq!(s.loop_start_ms, 0);
        assert_eq!(s.loop_end_ms, 0);
        // Nonzero endpoints still mark the sample as looping
        assert!(s.loop_enabled);
    }

    #[test]
    fn validator_accepts_divisible_legacy_header() {
        // shdr_size=240 over 10 samples -> 24 bytes per sample, valid
        let mut buf = Vec::new();
        buf.extend_from_slice(FSB4_SIG);
        buf.extend_from_slice(&10u32.to_le_bytes());
        buf.extend_from_slice(&240u32.to_le_bytes());
        buf.extend_from_slice(&1024u32.to_le_bytes());
        assert!(is_valid_header(&buf, 0));
    }

    #[test]
    fn validator_rejects_zero_samples() {
        let mut buf = Vec::new();
        buf.extend_from_slice(FSB4_SIG);
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&240u32.to_le_bytes());
        buf.extend_from_slice(&1024u32.to_le_bytes());
        assert!(!is_valid_header(&buf, 0));
    }

    #[test]
    fn validator_rejects_odd_per_sample_sizes() {
        let mut buf = Vec::new();
        buf.extend_from_slice(FSB3_SIG);
        buf.extend_from_slice(&10u32.to_le_bytes());
        buf.extend_from_slice(&245u32.to_le_bytes()); // not divisible by 10
        buf.extend_from_slice(&1024u32.to_le_bytes());
        assert!(!is_valid_header(&buf, 0));

        let mut buf = Vec::new();
        buf.extend_from_slice(FSB3_SIG);
        buf.extend_from_slice(&10u32.to_le_bytes());
        buf.extend_from_slice(&100u32.to_le_bytes()); // 10 per sample, below 24
        buf.extend_from_slice(&1024u32.to_le_bytes());
        assert!(!is_valid_header(&buf, 0));

        let mut buf = Vec::new();
        buf.extend_from_slice(FSB3_SIG);
        buf.extend_from_slice(&10u32.to_le_bytes());
        buf.extend_from_slice(&2000u32.to_le_bytes()); // 200 per sample, above 128
        buf.extend_from_slice(&1024u32.to_le_bytes());
        assert!(!is_valid_header(&buf, 0));
    }

    #[test]
    fn validator_checks_fsb5_counts() {
        let mut buf = Vec::new();
        buf.extend_from_slice(FSB5_SIG);
        buf.extend_from_slice(&1u32.to_le_bytes()); // sub-version
        buf.extend_from_slice(&3u32.to_le_bytes()); // num samples
        buf.extend_from_slice(&(3 * 80u32).to_le_bytes()); // shdr size
        buf.extend_from_slice(&0u32.to_le_bytes()); // name table
        buf.extend_from_slice(&4096u32.to_le_bytes()); // data size
        assert!(is_valid_header(&buf, 0));

        buf[8..12].copy_from_slice(&0u32.to_le_bytes());
        assert!(!is_valid_header(&buf, 0));
    }

    #[test]
    fn validator_rejects_truncated_buffers() {
        assert!(!is_valid_header(b"FS", 0));
        assert!(!is_valid_header(b"FSB4\x01\x00", 0));
        assert!(!is_valid_header(b"FSB9aaaaaaaaaaaaaaaaaaaaaaaa", 0));
    }
}
