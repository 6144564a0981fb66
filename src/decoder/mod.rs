//! Audio decoder seam
//!
//! PCM decoding of arbitrary compressed streams is delegated to an external
//! decoder library. This module defines the trait surface the pipeline
//! programs against, the coarse lock that serialises container open/close on
//! the decoder's global handle, and a native passthrough decoder
//! ([`PcmDecoder`]) for the payloads that need no DSP at all.

mod pcm;
pub mod wav;

pub use pcm::PcmDecoder;

use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::formats::fsb::SampleCodec;

/// Technical fields the decoder reports for one sub-sound
#[derive(Debug, Clone)]
pub struct SubSoundInfo {
    /// Internal name; may be empty
    pub name: String,
    pub codec: SampleCodec,
    pub channels: u16,
    pub sample_rate_hz: u32,
    /// Source bit width where fixed, else 0
    pub bits_per_sample: u8,
    pub pcm_length_samples: u64,
    pub loop_start_ms: u64,
    pub loop_end_ms: u64,
    pub loop_enabled: bool,
}

impl SubSoundInfo {
    /// Duration in milliseconds (integer truncation, matching header math)
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate_hz == 0 {
            return 0;
        }
        self.pcm_length_samples * 1000 / u64::from(self.sample_rate_hz)
    }
}

/// External audio decoder capable of opening a container at a byte offset.
///
/// Errors cross this seam as opaque [`anyhow::Error`]s; the pipeline wraps
/// them in [`Error::Decoder`].
pub trait AudioDecoder: Send + Sync {
    /// Open the container starting at `offset` within `path`.
    ///
    /// Implementations may touch process-global decoder state here; callers
    /// go through [`DecoderGate`] so opens are serialised.
    fn open_container(&self, path: &Path, offset: u64) -> anyhow::Result<Box<dyn OpenContainer>>;
}

/// An opened container handle, independent of the global decoder state.
///
/// Per-file handles opened for concurrent sub-sound reads are separate
/// objects and therefore lock-free at read time.
pub trait OpenContainer: Send {
    fn sub_sound_count(&self) -> u32;

    /// Technical fields for one sub-sound, without opening a read stream
    fn sub_sound_info(&self, index: u32) -> anyhow::Result<SubSoundInfo>;

    /// Open a PCM read stream over one sub-sound
    fn open_sub_sound(&self, index: u32) -> anyhow::Result<Box<dyn SubSoundStream>>;
}

/// Streaming PCM reader over a single sub-sound
pub trait SubSoundStream: Send {
    fn info(&self) -> &SubSoundInfo;

    /// Read decoded bytes into `buf`; returns 0 at end of stream
    fn read_pcm(&mut self, buf: &mut [u8]) -> anyhow::Result<usize>;
}

/// Serialises access to the decoder's global handle.
///
/// Only container open goes through the lock; the returned handles are
/// operated without it.
#[derive(Clone)]
pub struct DecoderGate {
    decoder: Arc<dyn AudioDecoder>,
    open_lock: Arc<Mutex<()>>,
}

impl DecoderGate {
    pub fn new(decoder: Arc<dyn AudioDecoder>) -> Self {
        Self {
            decoder,
            open_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Open a container under the global lock.
    pub fn open(&self, path: &Path, offset: u64) -> Result<Box<dyn OpenContainer>> {
        let _guard = match self.open_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.decoder
            .open_container(path, offset)
            .map_err(Error::Decoder)
    }
}

impl Default for DecoderGate {
    /// A gate over the native passthrough decoder
    fn default() -> Self {
        Self::new(Arc::new(PcmDecoder))
    }
}
