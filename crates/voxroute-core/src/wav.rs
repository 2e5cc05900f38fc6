//! WAV container helpers.
//!
//! The worker never decodes audio; it only needs to write small PCM files
//! (stub engines, tests), check that an engine artifact really is a
//! RIFF/WAVE file, and repair the sizes of WAVs that were streamed with
//! `0xFFFFFFFF` placeholders.

const RIFF_HEADER_LEN: usize = 12;
const CANONICAL_HEADER_LEN: usize = 44;
const SIZE_SENTINEL: u32 = 0xFFFF_FFFF;

/// Why a buffer was not accepted as a WAV file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WavError {
    #[error("too short for a RIFF header")]
    TooShort,
    #[error("missing RIFF/WAVE tags")]
    NotRiffWave,
    #[error("fmt chunk truncated")]
    TruncatedFmt,
    #[error("data chunk before fmt chunk")]
    DataBeforeFmt,
    #[error("data chunk not found")]
    NoData,
}

/// Format parameters of a WAV file and where its samples begin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    /// 1 = integer PCM, 3 = IEEE float, anything else passed through.
    pub audio_format: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub data_offset: usize,
}

/// Encode 16-bit mono PCM samples as a canonical 44-byte-header WAV.
pub fn encode_pcm16(samples: &[i16], sample_rate: u32) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let mut buf = Vec::with_capacity(CANONICAL_HEADER_LEN + data_len as usize);

    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&(36 + data_len).to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
    buf.extend_from_slice(&1u16.to_le_bytes()); // mono
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&(sample_rate * 2).to_le_bytes());
    buf.extend_from_slice(&2u16.to_le_bytes());
    buf.extend_from_slice(&16u16.to_le_bytes());

    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_len.to_le_bytes());
    for sample in samples {
        buf.extend_from_slice(&sample.to_le_bytes());
    }

    buf
}

fn read_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn has_riff_wave_tags(buf: &[u8]) -> bool {
    buf.len() >= RIFF_HEADER_LEN && &buf[0..4] == b"RIFF" && &buf[8..12] == b"WAVE"
}

/// Walk the chunk list and return the format of the file.
pub fn parse_wav_header(buf: &[u8]) -> Result<WavHeader, WavError> {
    if buf.len() < RIFF_HEADER_LEN {
        return Err(WavError::TooShort);
    }
    if !has_riff_wave_tags(buf) {
        return Err(WavError::NotRiffWave);
    }

    let mut pos = RIFF_HEADER_LEN;
    let mut fmt: Option<(u16, u16, u32, u16)> = None;

    while pos + 8 <= buf.len() {
        let id = &buf[pos..pos + 4];
        let size = read_u32(buf, pos + 4);

        match id {
            b"fmt " => {
                if pos + 24 > buf.len() {
                    return Err(WavError::TruncatedFmt);
                }
                fmt = Some((
                    read_u16(buf, pos + 8),
                    read_u16(buf, pos + 10),
                    read_u32(buf, pos + 12),
                    read_u16(buf, pos + 22),
                ));
                let payload = if size == SIZE_SENTINEL { 16 } else { size as usize };
                pos += 8 + payload;
            }
            b"data" => {
                let (audio_format, channels, sample_rate, bits_per_sample) =
                    fmt.ok_or(WavError::DataBeforeFmt)?;
                return Ok(WavHeader {
                    audio_format,
                    channels,
                    sample_rate,
                    bits_per_sample,
                    data_offset: pos + 8,
                });
            }
            _ => {
                let payload = if size == SIZE_SENTINEL { 0 } else { size as usize };
                // RIFF chunks are word aligned
                pos += 8 + payload + (payload & 1);
            }
        }
    }

    Err(WavError::NoData)
}

/// Replace placeholder RIFF and `data` sizes with the real ones.
///
/// Streaming synthesis servers write `0xFFFFFFFF` because the length is
/// unknown when the header goes out. Once the whole body is buffered the
/// sizes can be computed. Buffers that are not RIFF/WAVE are returned
/// unchanged.
pub fn fix_wav_sizes(mut wav: Vec<u8>) -> Vec<u8> {
    if wav.len() < CANONICAL_HEADER_LEN || !has_riff_wave_tags(&wav) {
        return wav;
    }
    let riff_size = (wav.len() - 8) as u32;
    wav[4..8].copy_from_slice(&riff_size.to_le_bytes());

    let mut pos = RIFF_HEADER_LEN;
    while pos + 8 <= wav.len() {
        if &wav[pos..pos + 4] == b"data" {
            let data_size = (wav.len() - pos - 8) as u32;
            wav[pos + 4..pos + 8].copy_from_slice(&data_size.to_le_bytes());
            break;
        }
        let size = read_u32(&wav, pos + 4);
        pos += 8 + if size == SIZE_SENTINEL { 0 } else { size as usize };
    }

    wav
}
