//! RIFF/WAVE header synthesis
//!
//! Extraction writes a canonical 44-byte header (format code 1 for integer
//! PCM, 3 for IEEE float). IMA ADPCM payloads pass through undecoded behind
//! a 20-byte `fmt ` chunk variant with format code 0x11 and a
//! samples-per-block hint of 0x40.

use std::io::{Seek, SeekFrom, Write};

use crate::formats::fsb::SampleCodec;

/// WAVE format code for integer PCM
pub const FORMAT_PCM: u16 = 0x0001;
/// WAVE format code for IEEE float
pub const FORMAT_IEEE_FLOAT: u16 = 0x0003;
/// WAVE format code for IMA ADPCM
pub const FORMAT_IMA_ADPCM: u16 = 0x0011;

/// Samples-per-block hint written for IMA ADPCM passthrough
pub const IMA_SAMPLES_PER_BLOCK: u16 = 0x40;
/// IMA ADPCM block alignment per channel
const IMA_BLOCK_ALIGN_PER_CHANNEL: u16 = 0x24;

/// How a sub-sound's bytes are framed in the produced WAV
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WavEncoding {
    /// Integer PCM with the given bit width
    Pcm { bits_per_sample: u16 },
    /// 32-bit IEEE float PCM
    Float,
    /// Raw IMA ADPCM passthrough
    ImaAdpcm,
}

impl WavEncoding {
    /// The encoding extraction uses for a sub-sound of the given codec.
    ///
    /// Everything without a raw-PCM or passthrough representation is decoded
    /// to 16-bit integer PCM by the external decoder.
    #[must_use]
    pub fn for_codec(codec: SampleCodec) -> Self {
        match codec {
            SampleCodec::Pcm8 => WavEncoding::Pcm { bits_per_sample: 8 },
            SampleCodec::PcmFloat => WavEncoding::Float,
            SampleCodec::ImaAdpcm => WavEncoding::ImaAdpcm,
            _ => WavEncoding::Pcm { bits_per_sample: 16 },
        }
    }

    fn header_len(self) -> usize {
        match self {
            // 12 (RIFF/WAVE) + 24 (fmt) + 8 (data)
            WavEncoding::Pcm { .. } | WavEncoding::Float => 44,
            // fmt chunk grows by cbSize + samplesPerBlock
            WavEncoding::ImaAdpcm => 48,
        }
    }
}

/// Build a complete WAV header for `data_len` bytes of payload.
#[must_use]
pub fn wav_header(
    encoding: WavEncoding,
    channels: u16,
    sample_rate: u32,
    data_len: u32,
) -> Vec<u8> {
    let (format_code, bits_per_sample, fmt_len) = match encoding {
        WavEncoding::Pcm { bits_per_sample } => (FORMAT_PCM, bits_per_sample, 16u32),
        WavEncoding::Float => (FORMAT_IEEE_FLOAT, 32, 16),
        WavEncoding::ImaAdpcm => (FORMAT_IMA_ADPCM, 4, 20),
    };

    let (block_align, byte_rate) = match encoding {
        WavEncoding::ImaAdpcm => {
            let block_align = IMA_BLOCK_ALIGN_PER_CHANNEL * channels;
            let byte_rate =
                sample_rate * u32::from(block_align) / u32::from(IMA_SAMPLES_PER_BLOCK);
            (block_align, byte_rate)
        }
        _ => {
            let block_align = channels * bits_per_sample / 8;
            (block_align, sample_rate * u32::from(block_align))
        }
    };

    let header_len = encoding.header_len();
    let mut header = Vec::with_capacity(header_len);
    header.extend_from_slice(b"RIFF");
    header.extend_from_slice(&(header_len as u32 - 8 + data_len).to_le_bytes());
    header.extend_from_slice(b"WAVE");
    header.extend_from_slice(b"fmt ");
    header.extend_from_slice(&fmt_len.to_le_bytes());
    header.extend_from_slice(&format_code.to_le_bytes());
    header.extend_from_slice(&channels.to_le_bytes());
    header.extend_from_slice(&sample_rate.to_le_bytes());
    header.extend_from_slice(&byte_rate.to_le_bytes());
    header.extend_from_slice(&block_align.to_le_bytes());
    header.extend_from_slice(&bits_per_sample.to_le_bytes());
    if encoding == WavEncoding::ImaAdpcm {
        header.extend_from_slice(&2u16.to_le_bytes()); // cbSize
        header.extend_from_slice(&IMA_SAMPLES_PER_BLOCK.to_le_bytes());
    }
    header.extend_from_slice(b"data");
    header.extend_from_slice(&data_len.to_le_bytes());
    debug_assert_eq!(header.len(), header_len);
    header
}

/// Streaming WAV writer that back-patches the size fields on finish, so the
/// declared `data` length always equals the bytes actually written.
pub struct WavStreamWriter<W: Write + Seek> {
    sink: W,
    encoding: WavEncoding,
    channels: u16,
    sample_rate: u32,
    data_written: u64,
}

impl<W: Write + Seek> WavStreamWriter<W> {
    /// Write the placeholder header and return the writer.
    pub fn new(
        mut sink: W,
        encoding: WavEncoding,
        channels: u16,
        sample_rate: u32,
    ) -> std::io::Result<Self> {
        let header = wav_header(encoding, channels, sample_rate, 0);
        sink.write_all(&header)?;
        Ok(Self {
            sink,
            encoding,
            channels,
            sample_rate,
            data_written: 0,
        })
    }

    /// Append payload bytes.
    pub fn write_data(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.sink.write_all(data)?;
        self.data_written += data.len() as u64;
        Ok(())
    }

    /// Patch the header sizes and flush. Returns payload bytes written.
    pub fn finish(mut self) -> std::io::Result<u64> {
        let header = wav_header(
            self.encoding,
            self.channels,
            self.sample_rate,
            self.data_written as u32,
        );
        self.sink.seek(SeekFrom::Start(0))?;
        self.sink.write_all(&header)?;
        self.sink.flush()?;
        Ok(self.data_written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn u16_at(buf: &[u8], at: usize) -> u16 {
        u16::from_le_bytes(buf[at..at + 2].try_into().unwrap())
    }

    fn u32_at(buf: &[u8], at: usize) -> u32 {
        u32::from_le_bytes(buf[at..at + 4].try_into().unwrap())
    }

    #[test]
    fn canonical_pcm16_header() {
        // S1 geometry: mono 22050 Hz PCM16, 4410 data bytes
        let h = wav_header(WavEncoding::Pcm { bits_per_sample: 16 }, 1, 22050, 4410);
        assert_eq!(h.len(), 44);
        assert_eq!(&h[0..4], b"RIFF");
        assert_eq!(u32_at(&h, 4), 36 + 4410);
        assert_eq!(&h[8..12], b"WAVE");
        assert_eq!(&h[12..16], b"fmt ");
        assert_eq!(u32_at(&h, 16), 16);
        assert_eq!(u16_at(&h, 20), FORMAT_PCM);
        assert_eq!(u16_at(&h, 22), 1);
        assert_eq!(u32_at(&h, 24), 22050);
        assert_eq!(u32_at(&h, 28), 22050 * 2);
        assert_eq!(u16_at(&h, 32), 2);
        assert_eq!(u16_at(&h, 34), 16);
        assert_eq!(&h[36..40], b"data");
        assert_eq!(u32_at(&h, 40), 4410);
    }

    #[test]
    fn float_header_uses_format_code_3() {
        let h = wav_header(WavEncoding::Float, 2, 48000, 1024);
        assert_eq!(u16_at(&h, 20), FORMAT_IEEE_FLOAT);
        assert_eq!(u16_at(&h, 34), 32);
        assert_eq!(u16_at(&h, 32), 8); // block align: 2ch * 32bit
    }

    #[test]
    fn ima_adpcm_header_has_extended_fmt() {
        let h = wav_header(WavEncoding::ImaAdpcm, 1, 44100, 1024);
        assert_eq!(h.len(), 48);
        assert_eq!(u32_at(&h, 16), 20);
        assert_eq!(u16_at(&h, 20), FORMAT_IMA_ADPCM);
        assert_eq!(u16_at(&h, 34), 4);
        assert_eq!(u16_at(&h, 36), 2); // cbSize
        assert_eq!(u16_at(&h, 38), IMA_SAMPLES_PER_BLOCK);
        assert_eq!(&h[40..44], b"data");
        assert_eq!(u32_at(&h, 44), 1024);
    }

    #[test]
    fn stream_writer_backpatches_sizes() {
        let mut buf = Cursor::new(Vec::new());
        let mut writer = WavStreamWriter::new(
            &mut buf,
            WavEncoding::Pcm { bits_per_sample: 16 },
            1,
            22050,
        )
        .unwrap();
        writer.write_data(&[0u8; 4000]).unwrap();
        writer.write_data(&[0u8; 412]).unwrap();
        assert_eq!(writer.finish().unwrap(), 4412);

        let bytes = buf.into_inner();
        assert_eq!(bytes.len(), 44 + 4412);
        assert_eq!(u32_at(&bytes, 4), 36 + 4412);
        assert_eq!(u32_at(&bytes, 40), 4412);
    }

    #[test]
    fn encoding_for_codec_maps_passthrough_and_fallback() {
        assert_eq!(
            WavEncoding::for_codec(SampleCodec::Pcm8),
            WavEncoding::Pcm { bits_per_sample: 8 }
        );
        assert_eq!(WavEncoding::for_codec(SampleCodec::PcmFloat), WavEncoding::Float);
        assert_eq!(WavEncoding::for_codec(SampleCodec::ImaAdpcm), WavEncoding::ImaAdpcm);
        // Compressed codecs decode to 16-bit PCM
        assert_eq!(
            WavEncoding::for_codec(SampleCodec::Vorbis),
            WavEncoding::Pcm { bits_per_sample: 16 }
        );
    }
}
