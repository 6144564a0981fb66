//! FSB (FMOD Sound Bank) container format
//!
//! Three header dialects are in scope:
//!
//! - **FSB3** - legacy, 24-byte main header followed by variable-length
//!   sample records
//! - **FSB4** - legacy, same record layout as FSB3 behind a 48-byte main
//!   header, with 32-byte payload alignment
//! - **FSB5** - fixed 0x40-byte main header with fixed-size sample records
//!   (64 or 80 bytes depending on sub-version)
//!
//! All multi-byte fields are little-endian. A sample rate of 0 in any header
//! means 44100 Hz.

mod chunk;
pub(crate) mod fsb5;
pub(crate) mod legacy;
mod types;

pub use chunk::resolve_chunk_length;
pub use fsb5::{Fsb5MainHeader, read_fsb5_header, resolve_fsb5_payload};
pub use legacy::{LegacyChunk, LegacyMainHeader, is_valid_header, parse_legacy_chunk};
pub use types::{FsbChunkRef, FsbVersion, SampleCodec, SampleDescriptor};

/// Chunk signatures
pub const FSB3_SIG: &[u8; 4] = b"FSB3";
pub const FSB4_SIG: &[u8; 4] = b"FSB4";
pub const FSB5_SIG: &[u8; 4] = b"FSB5";

/// Common three-byte prefix shared by all signatures, used by the scanner
pub const SIG_PREFIX: &[u8; 3] = b"FSB";

/// FSB5 main header size
pub const FSB5_MAIN_HEADER_SIZE: u64 = 0x40;
/// FSB5 sample-header record size for sub-version 0
pub const FSB5_RECORD_SIZE_V0: u64 = 64;
/// FSB5 sample-header record size for sub-version 1
pub const FSB5_RECORD_SIZE_V1: u64 = 80;
/// Offset of the payload-offset field inside a sub-version 0 record.
/// The payload length is the u32 immediately following it.
pub const FSB5_PAYLOAD_FIELD_V0: u64 = 52;
/// Offset of the payload-offset field inside a sub-version 1 record
pub const FSB5_PAYLOAD_FIELD_V1: u64 = 68;

/// FSB4 main header size
pub const FSB4_MAIN_HEADER_SIZE: usize = 48;
/// FSB3 main header size (FSB4 without the trailing 24-byte reserved block)
pub const FSB3_MAIN_HEADER_SIZE: usize = 24;

/// Fixed portion of a legacy sample-header record
pub const LEGACY_SAMPLE_RECORD_SIZE: usize = 64;
/// Legacy sample name field length (NUL-padded ASCII)
pub const LEGACY_NAME_LEN: usize = 30;
/// Legacy payload alignment (FSB4, and FSB3 with the global stereo flag)
pub const LEGACY_DATA_ALIGN: u64 = 32;

/// Scanner/resolver window size
pub const SCAN_WINDOW: usize = 64 * 1024;
/// Scanner window overlap, large enough to re-validate a signature split
/// across a window boundary
pub const SCAN_OVERLAP: usize = 64;

// Legacy mode-flag bits
pub const MODE_LOOP_NORMAL: u32 = 0x2;
pub const MODE_8BITS: u32 = 0x8;
pub const MODE_MONO: u32 = 0x20;
pub const MODE_STEREO: u32 = 0x40;
pub const MODE_MPEG: u32 = 0x20000;
pub const MODE_MPEG_PADDED: u32 = 0x200000;
pub const MODE_IMA_ADPCM: u32 = 0x400000;
pub const MODE_VAG: u32 = 0x800000;
pub const MODE_XMA: u32 = 0x1000000;
pub const MODE_GC_ADPCM: u32 = 0x2000000;

/// Default sample rate substituted when a header declares 0 Hz
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;
