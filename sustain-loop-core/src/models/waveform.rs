use std::sync::Arc;

use super::error::WaveformError;

/// Immutable view over a captured, interleaved multi-channel recording.
///
/// Samples are stored once behind an `Arc`, so clones are cheap and every
/// downstream reader sees the same frames. Nothing can mutate a buffer after
/// construction.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformBuffer {
    samples: Arc<[f32]>,
    channels: u16,
    sample_rate: u32,
    bit_depth: u16,
}

impl WaveformBuffer {
    /// Build a buffer from interleaved `[c0, c1, .., c0, c1, ..]` samples.
    pub fn from_interleaved(
        samples: Vec<f32>,
        channels: u16,
        sample_rate: u32,
        bit_depth: u16,
    ) -> Result<Self, WaveformError> {
        if channels == 0 {
            return Err(WaveformError::ZeroChannels);
        }
        if sample_rate == 0 {
            return Err(WaveformError::ZeroSampleRate);
        }
        if samples.is_empty() {
            return Err(WaveformError::Empty);
        }
        if samples.len() % channels as usize != 0 {
            return Err(WaveformError::RaggedFrames {
                len: samples.len(),
                channels,
            });
        }
        Ok(Self {
            samples: samples.into(),
            channels,
            sample_rate,
            bit_depth,
        })
    }

    /// Build a single-channel buffer.
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Result<Self, WaveformError> {
        Self::from_interleaved(samples, 1, sample_rate, 32)
    }

    /// Build a buffer from per-channel sample vectors of equal length.
    pub fn from_channels(channels: &[Vec<f32>], sample_rate: u32, bit_depth: u16) -> Result<Self, WaveformError> {
        let count = u16::try_from(channels.len()).map_err(|_| WaveformError::ZeroChannels)?;
        let frames = channels.first().map(Vec::len).unwrap_or(0);
        if channels.iter().any(|c| c.len() != frames) {
            return Err(WaveformError::RaggedFrames {
                len: channels.iter().map(Vec::len).sum(),
                channels: count,
            });
        }
        let mut interleaved = Vec::with_capacity(frames * channels.len());
        for frame in 0..frames {
            for channel in channels {
                interleaved.push(channel[frame]);
            }
        }
        Self::from_interleaved(interleaved, count, sample_rate, bit_depth)
    }

    /// Number of frames (N).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn bit_depth(&self) -> u16 {
        self.bit_depth
    }

    /// Index of the final frame (N - 1).
    pub fn last_frame(&self) -> usize {
        self.frames() - 1
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Raw interleaved samples.
    pub fn interleaved(&self) -> &[f32] {
        &self.samples
    }

    /// Sample value of `channel` at `frame`.
    pub fn sample(&self, frame: usize, channel: u16) -> f32 {
        self.samples[frame * self.channels as usize + channel as usize]
    }

    /// Iterate over one channel's samples in frame order.
    pub fn channel(&self, channel: u16) -> impl Iterator<Item = f32> + '_ {
        self.samples
            .iter()
            .skip(channel as usize)
            .step_by(self.channels as usize)
            .copied()
    }
}
