//! Workspace manifest
//!
//! `manifest.json` records the build format and one entry per sub-sound of
//! the source chunk, sorted by index. It is the contract between extraction
//! and rebuild: the encoder build list is derived from it, and loop metadata
//! survives the round trip through it.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::formats::fsb::SampleCodec;

/// Output format the external encoder is asked to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildFormat {
    Vorbis,
    Fadpcm,
    Pcm,
}

impl BuildFormat {
    /// The `-format` argument value for the encoder tool
    #[must_use]
    pub fn as_encoder_arg(self) -> &'static str {
        match self {
            BuildFormat::Vorbis => "vorbis",
            BuildFormat::Fadpcm => "fadpcm",
            BuildFormat::Pcm => "pcm",
        }
    }

    /// Build format that best reproduces a source chunk of the given codec
    #[must_use]
    pub fn for_codec(codec: SampleCodec) -> Self {
        match codec {
            SampleCodec::Vorbis => BuildFormat::Vorbis,
            SampleCodec::Fadpcm => BuildFormat::Fadpcm,
            _ => BuildFormat::Pcm,
        }
    }

    /// Whether the encoder takes a quality argument for this format
    #[must_use]
    pub fn has_quality(self) -> bool {
        self == BuildFormat::Vorbis
    }
}

/// One sub-sound of the source chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubSoundManifestEntry {
    pub index: u32,
    /// Name as the header/decoder reported it; may be empty
    pub name: String,
    /// WAV path relative to `AudioSource/`, e.g. `000/name.wav`
    #[serde(rename = "original_file_name")]
    pub relative_wav_path: String,
    #[serde(rename = "looping")]
    pub loop_enabled: bool,
    pub loop_start_ms: u64,
    pub loop_end_ms: u64,
}

/// The workspace manifest: an index-ordered cover of the chunk's sub-sounds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsbManifest {
    pub build_format: BuildFormat,
    pub sub_sounds: Vec<SubSoundManifestEntry>,
}

impl FsbManifest {
    #[must_use]
    pub fn new(build_format: BuildFormat) -> Self {
        Self {
            build_format,
            sub_sounds: Vec::new(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Entry for a sub-sound index, if listed
    #[must_use]
    pub fn entry(&self, index: u32) -> Option<&SubSoundManifestEntry> {
        self.sub_sounds.iter().find(|e| e.index == index)
    }
}
