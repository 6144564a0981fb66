//! Value types shared by the FSB parsers

use std::path::PathBuf;

use super::DEFAULT_SAMPLE_RATE;

/// FSB container version, taken from the fourth signature byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsbVersion {
    Fsb3,
    Fsb4,
    Fsb5,
    /// Unrecognized version byte, carried best-effort
    Other(u8),
}

impl FsbVersion {
    /// Parse from the fourth byte of a signature (`b'3'`, `b'4'`, `b'5'`)
    #[must_use]
    pub fn from_signature_byte(b: u8) -> Self {
        match b {
            b'3' => FsbVersion::Fsb3,
            b'4' => FsbVersion::Fsb4,
            b'5' => FsbVersion::Fsb5,
            other => FsbVersion::Other(other),
        }
    }

    /// The version as a display character
    #[must_use]
    pub fn as_char(self) -> char {
        match self {
            FsbVersion::Fsb3 => '3',
            FsbVersion::Fsb4 => '4',
            FsbVersion::Fsb5 => '5',
            FsbVersion::Other(b) => b as char,
        }
    }

    /// True for the legacy dialects (FSB3/FSB4)
    #[must_use]
    pub fn is_legacy(self) -> bool {
        matches!(self, FsbVersion::Fsb3 | FsbVersion::Fsb4)
    }
}

/// Codec of a sub-sound's payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleCodec {
    Pcm8,
    Pcm16,
    PcmFloat,
    ImaAdpcm,
    GcAdpcm,
    Xma,
    Vag,
    Mpeg,
    Vorbis,
    Fadpcm,
    Unknown,
}

impl SampleCodec {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SampleCodec::Pcm8 => "PCM8",
            SampleCodec::Pcm16 => "PCM16",
            SampleCodec::PcmFloat => "PCMFLOAT",
            SampleCodec::ImaAdpcm => "IMAADPCM",
            SampleCodec::GcAdpcm => "GCADPCM",
            SampleCodec::Xma => "XMA",
            SampleCodec::Vag => "VAG",
            SampleCodec::Mpeg => "MPEG",
            SampleCodec::Vorbis => "VORBIS",
            SampleCodec::Fadpcm => "FADPCM",
            SampleCodec::Unknown => "UNKNOWN",
        }
    }

    /// True when the payload is raw interleaved PCM samples
    #[must_use]
    pub fn is_pcm(self) -> bool {
        matches!(
            self,
            SampleCodec::Pcm8 | SampleCodec::Pcm16 | SampleCodec::PcmFloat
        )
    }
}

/// Identifies one FSB chunk inside a container file.
///
/// Immutable once produced by the scanner / chunk-length resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsbChunkRef {
    /// Container file holding the chunk
    pub source: PathBuf,
    /// Absolute byte offset of the chunk signature
    pub offset: u64,
    /// Version from the signature
    pub version: FsbVersion,
    /// Chunk byte length
    pub length: u64,
}

/// Per sub-sound metadata assembled from header fields and the decoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleDescriptor {
    pub index: u32,
    /// Internal name, NUL-trimmed ASCII; may be empty
    pub name: String,
    pub codec: SampleCodec,
    /// Channel count, always >= 1
    pub channels: u16,
    /// Sample rate; a header value of 0 is replaced by 44100
    pub sample_rate_hz: u32,
    /// Bits per sample where the codec has a fixed width, else 0
    pub bits_per_sample: u8,
    pub pcm_length_samples: u64,
    pub compressed_length_bytes: u64,
    pub loop_start_ms: u64,
    /// Clamped so the underlying sample position never exceeds `pcm_length_samples`
    pub loop_end_ms: u64,
    /// True iff the loop flag is set or any loop endpoint is nonzero
    pub loop_enabled: bool,
    /// Payload offset relative to the chunk start; 0 when the layout is unknown
    pub data_offset_in_chunk: u64,
    /// Payload byte length; 0 when the layout is unknown
    pub data_length: u64,
}

impl SampleDescriptor {
    /// A descriptor with the layout fields unresolved, used when only the
    /// decoder-reported technical fields are available.
    #[must_use]
    pub fn unresolved(index: u32) -> Self {
        Self {
            index,
            name: String::new(),
            codec: SampleCodec::Unknown,
            channels: 1,
            sample_rate_hz: DEFAULT_SAMPLE_RATE,
            bits_per_sample: 0,
            pcm_length_samples: 0,
            compressed_length_bytes: 0,
            loop_start_ms: 0,
            loop_end_ms: 0,
            loop_enabled: false,
            data_offset_in_chunk: 0,
            data_length: 0,
        }
    }

    /// Duration in milliseconds derived from PCM length and rate
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate_hz == 0 {
            return 0;
        }
        self.pcm_length_samples * 1000 / u64::from(self.sample_rate_hz)
    }
}
