//! Planar PCM buffers and back-to-back concatenation.

use crate::{Error, Result};

/// Decoded waveform: one `f32` sample array per channel, all the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl PcmBuffer {
    /// Build a buffer from per-channel sample arrays.
    ///
    /// Fails if there are no channels or the channels differ in length.
    pub fn from_channels(sample_rate: u32, channels: Vec<Vec<f32>>) -> Result<Self> {
        let Some(first) = channels.first() else {
            return Err(Error::msg("PCM buffer needs at least one channel"));
        };
        let frames = first.len();
        if channels.iter().any(|c| c.len() != frames) {
            return Err(Error::msg("PCM channels must all have the same length"));
        }
        Ok(Self {
            sample_rate,
            channels,
        })
    }

    pub fn mono(sample_rate: u32, samples: Vec<f32>) -> Self {
        Self {
            sample_rate,
            channels: vec![samples],
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel.
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Concatenate buffers back-to-back, in order.
    ///
    /// The output takes its rate and channel count from the first buffer; every input must
    /// match it. The output holds exactly the sum of the inputs' frames.
    pub fn concat<'a>(buffers: impl IntoIterator<Item = &'a PcmBuffer>) -> Result<PcmBuffer> {
        let buffers: Vec<&PcmBuffer> = buffers.into_iter().collect();
        let Some(first) = buffers.first() else {
            return Err(Error::msg("nothing to concatenate"));
        };

        let sample_rate = first.sample_rate;
        let channel_count = first.channel_count();
        if let Some(odd) = buffers
            .iter()
            .find(|b| b.sample_rate != sample_rate || b.channel_count() != channel_count)
        {
            return Err(Error::msg(format!(
                "cannot concatenate {} Hz / {} ch onto {} Hz / {} ch",
                odd.sample_rate,
                odd.channel_count(),
                sample_rate,
                channel_count
            )));
        }

        let total: usize = buffers.iter().map(|b| b.frames()).sum();
        let mut channels = vec![vec![0.0f32; total]; channel_count];

        let mut offset = 0;
        for buffer in &buffers {
            let frames = buffer.frames();
            for (out, input) in channels.iter_mut().zip(&buffer.channels) {
                out[offset..offset + frames].copy_from_slice(input);
            }
            offset += frames;
        }

        Ok(PcmBuffer {
            sample_rate,
            channels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concat_two_mono_buffers_preserves_every_sample() -> anyhow::Result<()> {
        let a = PcmBuffer::mono(22_050, vec![0.1, 0.2, 0.3]);
        let b = PcmBuffer::mono(22_050, vec![-0.5, 0.5]);

        let out = PcmBuffer::concat([&a, &b])?;

        assert_eq!(out.frames(), 5);
        assert_eq!(out.sample_rate(), 22_050);
        assert_eq!(out.channel(0), Some(&[0.1, 0.2, 0.3, -0.5, 0.5][..]));
        Ok(())
    }

    #[test]
    fn concat_stereo_keeps_channels_apart() -> anyhow::Result<()> {
        let a = PcmBuffer::from_channels(8_000, vec![vec![1.0], vec![-1.0]])?;
        let b = PcmBuffer::from_channels(8_000, vec![vec![0.5, 0.25], vec![-0.5, -0.25]])?;

        let out = PcmBuffer::concat([&a, &b])?;

        assert_eq!(out.channel(0), Some(&[1.0, 0.5, 0.25][..]));
        assert_eq!(out.channel(1), Some(&[-1.0, -0.5, -0.25][..]));
        Ok(())
    }

    #[test]
    fn concat_rejects_mismatched_rates() {
        let a = PcmBuffer::mono(44_100, vec![0.0]);
        let b = PcmBuffer::mono(22_050, vec![0.0]);
        assert!(PcmBuffer::concat([&a, &b]).is_err());
    }

    #[test]
    fn concat_of_nothing_is_an_error() {
        assert!(PcmBuffer::concat(Vec::<&PcmBuffer>::new()).is_err());
    }

    #[test]
    fn from_channels_rejects_ragged_input() {
        assert!(PcmBuffer::from_channels(8_000, vec![vec![0.0], vec![]]).is_err());
        assert!(PcmBuffer::from_channels(8_000, vec![]).is_err());
    }

    #[test]
    fn duration_follows_rate() {
        let buf = PcmBuffer::mono(4, vec![0.0; 10]);
        assert!((buf.duration_secs() - 2.5).abs() < f64::EPSILON);
    }
}
