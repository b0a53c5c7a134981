use std::io::Cursor;

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::Result;
use crate::pcm::PcmBuffer;

/// Size of the canonical RIFF/WAVE header written for 16-bit PCM.
pub const WAV_HEADER_LEN: usize = 44;

/// Convert a float sample to 16-bit PCM.
///
/// Input is clamped to `[-1.0, 1.0]` first, then scaled by 32768 and clamped to the `i16`
/// range. This is the inverse of the decoder's `s / 32768`, so 16-bit input survives exactly.
pub fn sample_to_i16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    (s * 32_768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Encode a PCM buffer as a 16-bit little-endian WAV file held in memory.
///
/// What we write:
/// - a 44-byte header (PCM format tag, mono or stereo, rate, byte rate, block align)
/// - interleaved samples
///
/// The declared channel count is the buffer's, capped at two; only those channels are written.
pub fn encode_wav(pcm: &PcmBuffer) -> Result<Vec<u8>> {
    let channels = pcm.channel_count().clamp(1, 2);
    let spec = WavSpec {
        channels: channels as u16,
        sample_rate: pcm.sample_rate(),
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let planes: Vec<&[f32]> = (0..channels).filter_map(|c| pcm.channel(c)).collect();

    let mut cursor = Cursor::new(Vec::with_capacity(
        WAV_HEADER_LEN + pcm.frames() * channels * 2,
    ));
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for frame in 0..pcm.frames() {
            for plane in &planes {
                writer.write_sample(sample_to_i16(plane[frame]))?;
            }
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}
