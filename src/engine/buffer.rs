//! Audio Buffer Management
//!
//! The planar audio buffer that flows between graph stages, and the format
//! (rate plus layout) every stage of one graph shares.

use crate::error::{Result, SongxError};

// ============================================================================
// Channel Layout
// ============================================================================

/// Audio channel configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelLayout {
    /// Single channel (mono)
    Mono,
    /// Two channels (stereo: left, right)
    #[default]
    Stereo,
}

impl ChannelLayout {
    /// Returns the number of channels for this layout
    pub fn num_channels(&self) -> usize {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
        }
    }

    /// Create a ChannelLayout from a channel count
    pub fn from_count(count: usize) -> Option<Self> {
        match count {
            1 => Some(ChannelLayout::Mono),
            2 => Some(ChannelLayout::Stereo),
            _ => None,
        }
    }
}

/// Sample rate and channel layout shared by every stage of a graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub layout: ChannelLayout,
}

impl AudioFormat {
    pub fn new(sample_rate: u32, layout: ChannelLayout) -> Self {
        Self {
            sample_rate,
            layout,
        }
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.layout.num_channels()
    }
}

// ============================================================================
// Audio Buffer
// ============================================================================

/// Planar 32-bit float audio buffer
///
/// Each channel is a separate `Vec<f32>`; all channels have the same length.
///
/// # Example
/// ```
/// use songx::engine::buffer::{AudioBuffer, ChannelLayout};
///
/// let buffer = AudioBuffer::new(44100, ChannelLayout::Stereo, 44100);
/// assert_eq!(buffer.channels(), 2);
/// assert_eq!(buffer.len(), 44100);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Sample data: outer Vec is channels, inner Vec is samples
    pub samples: Vec<Vec<f32>>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Create a silent buffer with the given length and layout
    pub fn new(num_samples: usize, layout: ChannelLayout, sample_rate: u32) -> Self {
        Self {
            samples: vec![vec![0.0_f32; num_samples]; layout.num_channels()],
            sample_rate,
        }
    }

    /// Create a silent buffer in the given format
    pub fn with_format(num_samples: usize, format: AudioFormat) -> Self {
        Self::new(num_samples, format.layout, format.sample_rate)
    }

    /// Create an audio buffer from interleaved sample data
    pub fn from_interleaved(
        interleaved: &[f32],
        layout: ChannelLayout,
        sample_rate: u32,
    ) -> Result<Self> {
        let num_channels = layout.num_channels();

        if interleaved.len() % num_channels != 0 {
            return Err(SongxError::UnsupportedFormat {
                format: format!(
                    "interleaved length {} is not divisible by channel count {}",
                    interleaved.len(),
                    num_channels
                ),
            });
        }

        let num_samples = interleaved.len() / num_channels;
        let mut samples = vec![Vec::with_capacity(num_samples); num_channels];

        for frame in interleaved.chunks_exact(num_channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                samples[ch].push(sample);
            }
        }

        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Get the number of channels
    #[inline]
    pub fn channels(&self) -> usize {
        self.samples.len()
    }

    /// Get the number of samples per channel
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.first().map(|ch| ch.len()).unwrap_or(0)
    }

    /// Check if the buffer is empty (no samples)
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the duration in seconds
    #[inline]
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.len() as f64 / self.sample_rate as f64
    }

    /// Get the channel layout
    pub fn channel_layout(&self) -> Option<ChannelLayout> {
        ChannelLayout::from_count(self.channels())
    }

    /// Get the audio format, if the channel count is supported
    pub fn format(&self) -> Option<AudioFormat> {
        self.channel_layout()
            .map(|layout| AudioFormat::new(self.sample_rate, layout))
    }

    /// Immutable access to a channel's samples
    ///
    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.samples[index]
    }

    /// Mutable access to a channel's samples
    ///
    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.samples[index]
    }

    /// Get a sample at the specified channel and index
    #[inline]
    pub fn get_sample(&self, channel: usize, index: usize) -> Option<f32> {
        self.samples
            .get(channel)
            .and_then(|ch| ch.get(index).copied())
    }

    /// Resize every channel to `num_samples`, zero-filling new frames
    pub fn resize(&mut self, num_samples: usize) {
        for channel in &mut self.samples {
            channel.resize(num_samples, 0.0);
        }
    }

    /// Set every sample to zero without changing the length
    pub fn silence(&mut self) {
        for channel in &mut self.samples {
            channel.fill(0.0);
        }
    }

    /// Copy `count` frames from `src[src_start..]` into `self[dst_start..]`
    ///
    /// Channels are matched by index; a mono source feeds every destination
    /// channel. Frames beyond either buffer are skipped.
    pub fn copy_frames_from(
        &mut self,
        src: &AudioBuffer,
        src_start: usize,
        dst_start: usize,
        count: usize,
    ) {
        let count = count
            .min(src.len().saturating_sub(src_start))
            .min(self.len().saturating_sub(dst_start));
        if count == 0 || src.channels() == 0 {
            return;
        }

        for (ch, dst) in self.samples.iter_mut().enumerate() {
            let src_ch = &src.samples[ch.min(src.channels() - 1)];
            dst[dst_start..dst_start + count]
                .copy_from_slice(&src_ch[src_start..src_start + count]);
        }
    }

    /// Check if all samples are finite (not NaN or Infinity)
    pub fn is_finite(&self) -> bool {
        self.samples
            .iter()
            .flat_map(|ch| ch.iter())
            .all(|s| s.is_finite())
    }

}

impl Default for AudioBuffer {
    fn default() -> Self {
        Self::new(0, ChannelLayout::Stereo, 44100)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_buffer(samples: Vec<Vec<f32>>) -> AudioBuffer {
        AudioBuffer {
            samples,
            sample_rate: 44100,
        }
    }

    #[test]
    fn test_channel_layout() {
        assert_eq!(ChannelLayout::Mono.num_channels(), 1);
        assert_eq!(ChannelLayout::Stereo.num_channels(), 2);
        assert_eq!(ChannelLayout::from_count(2), Some(ChannelLayout::Stereo));
        assert_eq!(ChannelLayout::from_count(6), None);
    }

    #[test]
    fn test_buffer_from_interleaved_stereo() {
        let interleaved = vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6];
        let buffer =
            AudioBuffer::from_interleaved(&interleaved, ChannelLayout::Stereo, 44100).unwrap();

        assert_eq!(buffer.channels(), 2);
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.get_sample(0, 1), Some(0.3));
        assert_eq!(buffer.get_sample(1, 1), Some(0.4));
    }

    #[test]
    fn test_buffer_from_interleaved_invalid() {
        let result = AudioBuffer::from_interleaved(&[0.1, 0.2, 0.3], ChannelLayout::Stereo, 44100);
        assert!(result.is_err());
    }

    #[test]
    fn test_copy_frames_mono_to_stereo() {
        let src = create_test_buffer(vec![vec![1.0, 2.0, 3.0, 4.0]]);
        let mut dst = AudioBuffer::new(3, ChannelLayout::Stereo, 44100);

        dst.copy_frames_from(&src, 2, 1, 10);

        assert_eq!(dst.channel(0), &[0.0, 3.0, 4.0]);
        assert_eq!(dst.channel(1), &[0.0, 3.0, 4.0]);
    }

    #[test]
    fn test_resize_zero_fills() {
        let mut a = create_test_buffer(vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
        a.resize(4);
        assert_eq!(a.channel(1), &[3.0, 4.0, 0.0, 0.0]);
        a.resize(1);
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn test_is_finite() {
        assert!(create_test_buffer(vec![vec![-2.0, 0.5]]).is_finite());
        assert!(!create_test_buffer(vec![vec![0.0, f32::NAN]]).is_finite());
    }

    #[test]
    fn test_format_requires_supported_layout() {
        let stereo = AudioBuffer::new(8, ChannelLayout::Stereo, 48000);
        assert_eq!(
            stereo.format(),
            Some(AudioFormat::new(48000, ChannelLayout::Stereo))
        );
        let surround = create_test_buffer(vec![vec![0.0]; 6]);
        assert_eq!(surround.format(), None);
    }

    #[test]
    fn test_duration() {
        let buffer = AudioBuffer::new(22050, ChannelLayout::Mono, 44100);
        assert!((buffer.duration_secs() - 0.5).abs() < 1e-9);
    }
}
