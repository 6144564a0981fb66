//! Native passthrough decoder
//!
//! Handles the payloads that need no DSP: legacy FSB3/FSB4 chunks whose
//! sub-sounds are raw PCM (8/16-bit integer, float) or IMA ADPCM, and
//! canonical RIFF/WAVE files (used when a replacement file is already WAV).
//! Everything else - Vorbis, MPEG, XMA, VAG, and FSB5 payloads, whose
//! simplified record layout carries no format fields - is refused and must
//! go through the external decoder.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use byteorder::{LittleEndian, ReadBytesExt};

use super::{AudioDecoder, OpenContainer, SubSoundInfo, SubSoundStream};
use super::wav::{FORMAT_IEEE_FLOAT, FORMAT_IMA_ADPCM, FORMAT_PCM, IMA_SAMPLES_PER_BLOCK};
use crate::formats::fsb::{
    FSB3_MAIN_HEADER_SIZE, FSB3_SIG, FSB4_MAIN_HEADER_SIZE, FSB4_SIG, FSB5_SIG, SampleCodec,
    parse_legacy_chunk,
};

/// Passthrough decoder for PCM-family payloads
pub struct PcmDecoder;

impl AudioDecoder for PcmDecoder {
    fn open_container(&self, path: &Path, offset: u64) -> anyhow::Result<Box<dyn OpenContainer>> {
        let mut file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        file.seek(SeekFrom::Start(offset))?;
        let mut sig = [0u8; 4];
        file.read_exact(&mut sig)
            .with_context(|| format!("read signature at {offset:#x} in {}", path.display()))?;

        if &sig == FSB3_SIG || &sig == FSB4_SIG {
            open_legacy(&mut file, path, offset)
        } else if &sig == FSB5_SIG {
            bail!("FSB5 payloads require the external decoder")
        } else if &sig == b"RIFF" {
            open_wav(&mut file, path, offset)
        } else {
            bail!("unrecognized container signature {sig:?}")
        }
    }
}

struct PcmContainer {
    path: PathBuf,
    sub_sounds: Vec<PcmSubSound>,
}

struct PcmSubSound {
    info: SubSoundInfo,
    /// Absolute payload position in the container file
    abs_offset: u64,
    length: u64,
}

impl OpenContainer for PcmContainer {
    fn sub_sound_count(&self) -> u32 {
        self.sub_sounds.len() as u32
    }

    fn sub_sound_info(&self, index: u32) -> anyhow::Result<SubSoundInfo> {
        self.sub_sounds
            .get(index as usize)
            .map(|s| s.info.clone())
            .with_context(|| format!("sub-sound {index} out of range"))
    }

    fn open_sub_sound(&self, index: u32) -> anyhow::Result<Box<dyn SubSoundStream>> {
        let sub = self
            .sub_sounds
            .get(index as usize)
            .with_context(|| format!("sub-sound {index} out of range"))?;

        match sub.info.codec {
            SampleCodec::Pcm8
            | SampleCodec::Pcm16
            | SampleCodec::PcmFloat
            | SampleCodec::ImaAdpcm => {}
            other => bail!(
                "codec {} requires the external decoder",
                other.as_str()
            ),
        }

        // Each stream opens its own handle so concurrent reads stay
        // independent of the container and of each other.
        let mut file = File::open(&self.path)
            .with_context(|| format!("open {}", self.path.display()))?;
        file.seek(SeekFrom::Start(sub.abs_offset))?;
        Ok(Box::new(PcmStream {
            info: sub.info.clone(),
            file,
            remaining: sub.length,
        }))
    }
}

struct PcmStream {
    info: SubSoundInfo,
    file: File,
    remaining: u64,
}

impl SubSoundStream for PcmStream {
    fn info(&self) -> &SubSoundInfo {
        &self.info
    }

    fn read_pcm(&mut self, buf: &mut [u8]) -> anyhow::Result<usize> {
        if self.remaining == 0 {
            return Ok(0);
        }
        let want = buf.len().min(self.remaining as usize);
        let n = self.file.read(&mut buf[..want])?;
        self.remaining -= n as u64;
        Ok(n)
    }
}

fn open_legacy(
    file: &mut File,
    path: &Path,
    offset: u64,
) -> anyhow::Result<Box<dyn OpenContainer>> {
    // Read the main header first to size the full header region.
    file.seek(SeekFrom::Start(offset))?;
    let mut main = [0u8; FSB4_MAIN_HEADER_SIZE];
    file.read_exact(&mut main)
        .context("legacy main header truncated")?;
    let shdr_size = u32::from_le_bytes(main[8..12].try_into().expect("4-byte slice"));
    let main_size = if &main[..4] == FSB3_SIG {
        FSB3_MAIN_HEADER_SIZE
    } else {
        FSB4_MAIN_HEADER_SIZE
    };

    let header_region = main_size + shdr_size as usize;
    let mut buf = vec![0u8; header_region];
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(&mut buf)
        .context("legacy sample headers truncated")?;

    let chunk = parse_legacy_chunk(&buf).context("not a legacy FSB chunk")?;
    let sub_sounds: Vec<PcmSubSound> = chunk
        .samples()
        .map(|s| PcmSubSound {
            abs_offset: offset + s.data_offset_in_chunk,
            length: s.data_length,
            info: SubSoundInfo {
                name: s.name.clone(),
                codec: s.codec,
                channels: s.channels,
                sample_rate_hz: s.sample_rate_hz,
                bits_per_sample: s.bits_per_sample,
                pcm_length_samples: s.pcm_length_samples,
                loop_start_ms: s.loop_start_ms,
                loop_end_ms: s.loop_end_ms,
                loop_enabled: s.loop_enabled,
            },
        })
        .collect();

    if sub_sounds.len() != chunk.header().num_samples as usize {
        bail!(
            "sample header walk ended early: {} of {}",
            sub_sounds.len(),
            chunk.header().num_samples
        );
    }

    Ok(Box::new(PcmContainer {
        path: path.to_path_buf(),
        sub_sounds,
    }))
}

fn open_wav(file: &mut File, path: &Path, offset: u64) -> anyhow::Result<Box<dyn OpenContainer>> {
    file.seek(SeekFrom::Start(offset + 8))?;
    let mut wave = [0u8; 4];
    file.read_exact(&mut wave)?;
    if &wave != b"WAVE" {
        bail!("RIFF file is not a WAVE");
    }

    let mut fmt: Option<(u16, u16, u32, u16, u16)> = None;
    let mut data: Option<(u64, u64)> = None;

    // Walk chunks until both fmt and data are known.
    loop {
        let mut id = [0u8; 4];
        match file.read_exact(&mut id) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
        let size = u64::from(file.read_u32::<LittleEndian>()?);
        let body_start = file.stream_position()?;

        match &id {
            b"fmt " => {
                let format_code = file.read_u16::<LittleEndian>()?;
                let channels = file.read_u16::<LittleEndian>()?;
                let sample_rate = file.read_u32::<LittleEndian>()?;
                let _byte_rate = file.read_u32::<LittleEndian>()?;
                let block_align = file.read_u16::<LittleEndian>()?;
                let bits_per_sample = file.read_u16::<LittleEndian>()?;
                fmt = Some((format_code, channels, sample_rate, block_align, bits_per_sample));
            }
            b"data" => {
                data = Some((body_start, size));
            }
            _ => {}
        }
        if fmt.is_some() && data.is_some() {
            break;
        }
        // Chunks are word-aligned.
        file.seek(SeekFrom::Start(body_start + size + (size & 1)))?;
    }

    let (format_code, channels, sample_rate, block_align, bits) =
        fmt.context("WAV has no fmt chunk")?;
    let (data_offset, data_len) = data.context("WAV has no data chunk")?;

    let codec = match (format_code, bits) {
        (FORMAT_PCM, 8) => SampleCodec::Pcm8,
        (FORMAT_PCM, 16) => SampleCodec::Pcm16,
        (FORMAT_IEEE_FLOAT, 32) => SampleCodec::PcmFloat,
        (FORMAT_IMA_ADPCM, _) => SampleCodec::ImaAdpcm,
        (code, bits) => bail!("unsupported WAV format code {code:#x} ({bits} bps)"),
    };

    let pcm_length_samples = if block_align == 0 {
        0
    } else if codec == SampleCodec::ImaAdpcm {
        data_len / u64::from(block_align) * u64::from(IMA_SAMPLES_PER_BLOCK)
    } else {
        data_len / u64::from(block_align)
    };

    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    Ok(Box::new(PcmContainer {
        path: path.to_path_buf(),
        sub_sounds: vec![PcmSubSound {
            abs_offset: data_offset,
            length: data_len,
            info: SubSoundInfo {
                name,
                codec,
                channels: channels.max(1),
                sample_rate_hz: sample_rate,
                bits_per_sample: bits as u8,
                pcm_length_samples,
                loop_start_ms: 0,
                loop_end_ms: 0,
                loop_enabled: false,
            },
        }],
    }))
}
