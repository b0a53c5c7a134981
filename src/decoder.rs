// src/decoder.rs

//! Decode one compressed voice payload (MP3 from the TTS service, or any container Symphonia
//! understands) into a planar `PcmBuffer`.
//!
//! Unlike a streaming decoder, payloads are small and fully in memory, so we probe a seekable
//! `Cursor` and collect the whole clip before handing it back.
//!
//! Error handling policy:
//! - a corrupt frame inside an otherwise valid stream is skipped
//! - an IO error while reading packets marks end-of-stream
//! - a payload that cannot be probed, has no audio track, or changes format mid-stream is an
//!   error
//! - a well-formed clip with zero frames decodes to an empty buffer; if no packet decoded, the
//!   track's declared rate and channel count are used

use std::io::Cursor;

use anyhow::{Context, Result, anyhow, bail};
use bytes::Bytes;
use symphonia::core::audio::{AudioBufferRef, SampleBuffer};
use symphonia::core::codecs::{CODEC_TYPE_NULL, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Track};
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

use crate::pcm::PcmBuffer;

/// Guess a file extension from a payload's magic bytes.
///
/// Anything unrecognized is assumed to be MPEG audio, which is what the TTS service returns.
pub fn sniff_extension(payload: &[u8]) -> &'static str {
    match payload {
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'A', b'V', b'E', ..] => "wav",
        [b'O', b'g', b'g', b'S', ..] => "ogg",
        [b'f', b'L', b'a', b'C', ..] => "flac",
        _ => "mp3",
    }
}

/// Decode a whole payload into PCM.
pub fn decode_payload(payload: &Bytes) -> Result<PcmBuffer> {
    let (mut format, track) = open_payload(payload)?;
    let mut decoder = make_decoder(&track)?;
    let mut collector = ChannelCollector::default();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(_)) => break,
            Err(e) => return Err(anyhow!(e)).context("failed reading packet"),
        };

        if packet.track_id() != track.id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => collector.push(decoded)?,
            Err(SymphoniaError::DecodeError(err)) => {
                debug!(%err, "skipping corrupt frame");
            }
            Err(SymphoniaError::IoError(_)) => break,
            Err(e) => return Err(anyhow!(e)).context("decoder failure"),
        }
    }

    collector.finish(&track)
}

fn open_payload(payload: &Bytes) -> Result<(Box<dyn FormatReader>, Track)> {
    let source = Cursor::new(payload.clone());
    let mss = MediaSourceStream::new(
        Box::new(source),
        MediaSourceStreamOptions {
            // Symphonia wants a power-of-two buffer larger than 32 KiB.
            buffer_len: 64 * 1024,
        },
    );

    let mut hint = Hint::new();
    hint.with_extension(sniff_extension(payload));

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| anyhow!(e))
        .context("failed to probe audio payload")?;

    let format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL && t.codec_params.sample_rate.is_some())
        .cloned()
        .ok_or_else(|| anyhow!("payload has no audio track"))?;

    Ok((format, track))
}

fn make_decoder(track: &Track) -> Result<Box<dyn Decoder>> {
    symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| anyhow!(e))
        .context("unsupported audio codec in payload")
}

/// Accumulates decoded packets into per-channel sample arrays.
#[derive(Default)]
struct ChannelCollector {
    // (sample rate, channel count) of the first decoded packet.
    format: Option<(u32, usize)>,
    channels: Vec<Vec<f32>>,
    scratch: Option<SampleBuffer<f32>>,
    scratch_frames: usize,
}

impl ChannelCollector {
    fn push(&mut self, decoded: AudioBufferRef<'_>) -> Result<()> {
        let spec = *decoded.spec();
        let rate = spec.rate;
        let channel_count = spec.channels.count();
        if channel_count == 0 {
            bail!("decoded audio had zero channels");
        }

        match self.format {
            None => {
                self.format = Some((rate, channel_count));
                self.channels = vec![Vec::new(); channel_count];
            }
            Some(format) if format != (rate, channel_count) => {
                bail!(
                    "payload changed format mid-stream ({} Hz / {} ch → {rate} Hz / {channel_count} ch)",
                    format.0,
                    format.1
                );
            }
            Some(_) => {}
        }

        if decoded.frames() == 0 {
            return Ok(());
        }

        if self.scratch.is_none() || decoded.capacity() > self.scratch_frames {
            self.scratch_frames = decoded.capacity();
            self.scratch = Some(SampleBuffer::<f32>::new(self.scratch_frames as u64, spec));
        }
        let scratch = self
            .scratch
            .as_mut()
            .ok_or_else(|| anyhow!("sample buffer not initialized"))?;

        scratch.copy_interleaved_ref(decoded);
        for frame in scratch.samples().chunks_exact(channel_count) {
            for (channel, sample) in self.channels.iter_mut().zip(frame) {
                channel.push(*sample);
            }
        }
        Ok(())
    }

    fn finish(self, track: &Track) -> Result<PcmBuffer> {
        if let Some((rate, _)) = self.format {
            return PcmBuffer::from_channels(rate, self.channels).map_err(|err| anyhow!("{err}"));
        }

        let params = &track.codec_params;
        let (Some(rate), Some(channels)) = (params.sample_rate, params.channels) else {
            bail!("payload contained no decodable audio");
        };
        let channel_count = channels.count();
        if channel_count == 0 {
            bail!("payload contained no decodable audio");
        }
        debug!(rate, channel_count, "payload holds an empty clip");
        PcmBuffer::from_channels(rate, vec![Vec::new(); channel_count])
            .map_err(|err| anyhow!("{err}"))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn wav_payload(rate: u32, channels: u16, samples: &[i16]) -> Bytes {
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("writer");
            for s in samples {
                writer.write_sample(*s).expect("sample");
            }
            writer.finalize().expect("finalize");
        }
        Bytes::from(cursor.into_inner())
    }

    #[test]
    fn sniffs_common_containers() {
        assert_eq!(sniff_extension(b"RIFF\0\0\0\0WAVEfmt "), "wav");
        assert_eq!(sniff_extension(b"OggS\0"), "ogg");
        assert_eq!(sniff_extension(b"fLaC"), "flac");
        assert_eq!(sniff_extension(b"ID3\x04"), "mp3");
        assert_eq!(sniff_extension(b""), "mp3");
    }

    #[test]
    fn decodes_mono_wav_payload() -> anyhow::Result<()> {
        let payload = wav_payload(16_000, 1, &[0, 16_384, -16_384, 32_767]);
        let pcm = decode_payload(&payload)?;

        assert_eq!(pcm.sample_rate(), 16_000);
        assert_eq!(pcm.channel_count(), 1);
        assert_eq!(pcm.frames(), 4);
        let ch = pcm.channel(0).expect("channel 0");
        assert!((ch[1] - 0.5).abs() < 1e-3);
        assert!((ch[2] + 0.5).abs() < 1e-3);
        Ok(())
    }

    #[test]
    fn decodes_stereo_into_separate_channels() -> anyhow::Result<()> {
        // Interleaved L/R: L is positive, R is negative.
        let payload = wav_payload(8_000, 2, &[8_192, -8_192, 16_384, -16_384]);
        let pcm = decode_payload(&payload)?;

        assert_eq!(pcm.channel_count(), 2);
        assert_eq!(pcm.frames(), 2);
        assert!(pcm.channel(0).expect("left").iter().all(|s| *s > 0.0));
        assert!(pcm.channel(1).expect("right").iter().all(|s| *s < 0.0));
        Ok(())
    }

    #[test]
    fn garbage_payload_fails() {
        let payload = Bytes::from_static(b"definitely not audio, just some text bytes");
        assert!(decode_payload(&payload).is_err());
    }

    #[test]
    fn zero_frame_clip_decodes_empty() -> anyhow::Result<()> {
        let pcm = decode_payload(&wav_payload(22_050, 1, &[]))?;
        assert_eq!(pcm.sample_rate(), 22_050);
        assert_eq!(pcm.channel_count(), 1);
        assert_eq!(pcm.frames(), 0);
        Ok(())
    }

    #[test]
    fn empty_payload_fails() {
        assert!(decode_payload(&Bytes::new()).is_err());
    }
}
