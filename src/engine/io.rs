//! Audio file I/O
//!
//! Decoding goes through symphonia so every container the picker can hand us
//! (WAV, AIFF, FLAC, MP3, M4A/AAC/ALAC, OGG) lands in the same planar f32
//! [`AudioBuffer`]. Writing uses hound: renders stream batches into a WAV file
//! through [`AudioFileWriter`].

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavSpec, WavWriter};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::engine::buffer::{AudioBuffer, AudioFormat, ChannelLayout};
use crate::error::{Result, SongxError};

/// Sample encoding of a written file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportSampleFormat {
    /// 16-bit integer, the distribution format
    #[default]
    Pcm16,
    Pcm24,
    /// 32-bit float, used for intermediate renders
    Float32,
}

impl ExportSampleFormat {
    pub fn bits_per_sample(&self) -> u16 {
        match self {
            ExportSampleFormat::Pcm16 => 16,
            ExportSampleFormat::Pcm24 => 24,
            ExportSampleFormat::Float32 => 32,
        }
    }

    fn wav_spec(&self, format: AudioFormat) -> WavSpec {
        WavSpec {
            channels: format.channels() as u16,
            sample_rate: format.sample_rate,
            bits_per_sample: self.bits_per_sample(),
            sample_format: match self {
                ExportSampleFormat::Float32 => SampleFormat::Float,
                _ => SampleFormat::Int,
            },
        }
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode an audio file into memory
///
/// # Errors
/// * `FileNotFound` - the path does not exist
/// * `Decode` - the container or codec could not be read
/// * `UnsupportedFormat` - more than two channels
/// * `EmptyAudio` - the file decoded to zero frames
pub fn decode_file(path: &Path) -> Result<AudioBuffer> {
    if !path.exists() {
        return Err(SongxError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let decode_err = |reason: String| SongxError::Decode {
        path: path.to_path_buf(),
        reason,
    };

    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| decode_err(format!("failed to probe format: {}", e)))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| decode_err("no audio track found".to_string()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| decode_err("unknown sample rate".to_string()))?;
    let channels = codec_params.channels.map(|c| c.count()).unwrap_or(2);
    let layout = ChannelLayout::from_count(channels).ok_or_else(|| {
        SongxError::UnsupportedFormat {
            format: format!("{}-channel audio (only mono/stereo supported)", channels),
        }
    })?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| decode_err(format!("failed to create decoder: {}", e)))?;

    let mut interleaved: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(decode_err(format!("packet read error: {}", e))),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let buf = sample_buf.get_or_insert_with(|| {
                    SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec())
                });
                if buf.capacity() < decoded.capacity() * decoded.spec().channels.count() {
                    *buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
                }
                buf.copy_interleaved_ref(decoded);
                interleaved.extend_from_slice(buf.samples());
            }
            Err(SymphoniaError::DecodeError(e)) => {
                // Corrupt packets are skipped, the rest of the file still plays
                warn!("Skipping undecodable packet in {:?}: {}", path, e);
            }
            Err(e) => return Err(decode_err(format!("decode error: {}", e))),
        }
    }

    let buffer = AudioBuffer::from_interleaved(&interleaved, layout, sample_rate)?;
    if buffer.is_empty() {
        return Err(SongxError::EmptyAudio {
            path: path.to_path_buf(),
        });
    }

    debug!(
        "Decoded {:?}: {} frames, {} Hz, {} ch",
        path,
        buffer.len(),
        sample_rate,
        channels
    );
    Ok(buffer)
}

// ============================================================================
// Writing
// ============================================================================

/// Streaming WAV writer
///
/// Dropping the writer without calling [`finalize`](Self::finalize) leaves
/// an unusable file; callers delete it on their error path.
pub struct AudioFileWriter {
    writer: WavWriter<BufWriter<File>>,
    path: PathBuf,
    sample_format: ExportSampleFormat,
    format: AudioFormat,
    frames_written: u64,
    scratch: Vec<f32>,
}

impl AudioFileWriter {
    pub fn create(path: &Path, format: AudioFormat, sample_format: ExportSampleFormat) -> Result<Self> {
        let writer = WavWriter::create(path, sample_format.wav_spec(format))
            .map_err(|e| write_err(path, e))?;
        Ok(Self {
            writer,
            path: path.to_path_buf(),
            sample_format,
            format,
            frames_written: 0,
            scratch: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Append every frame of `buffer`
    pub fn write(&mut self, buffer: &AudioBuffer) -> Result<()> {
        self.write_frames(buffer, buffer.len())
    }

    /// Append the first `frames` frames of `buffer`
    pub fn write_frames(&mut self, buffer: &AudioBuffer, frames: usize) -> Result<()> {
        let frames = frames.min(buffer.len());
        let channels = self.format.channels();
        self.scratch.clear();
        for i in 0..frames {
            for ch in 0..channels {
                let src = ch.min(buffer.channels().saturating_sub(1));
                self.scratch.push(buffer.get_sample(src, i).unwrap_or(0.0));
            }
        }
        self.write_interleaved_samples()?;
        self.frames_written += frames as u64;
        Ok(())
    }

    /// Append already-interleaved samples
    pub fn write_interleaved(&mut self, samples: &[f32]) -> Result<()> {
        self.scratch.clear();
        self.scratch.extend_from_slice(samples);
        self.write_interleaved_samples()?;
        self.frames_written += (samples.len() / self.format.channels()) as u64;
        Ok(())
    }

    fn write_interleaved_samples(&mut self) -> Result<()> {
        let path = &self.path;
        match self.sample_format {
            ExportSampleFormat::Pcm16 => {
                for &sample in &self.scratch {
                    let scaled = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
                    self.writer.write_sample(scaled).map_err(|e| write_err(path, e))?;
                }
            }
            ExportSampleFormat::Pcm24 => {
                for &sample in &self.scratch {
                    // 24-bit stored as i32 in hound
                    let scaled = (sample * 8388607.0).clamp(-8388608.0, 8388607.0) as i32;
                    self.writer.write_sample(scaled).map_err(|e| write_err(path, e))?;
                }
            }
            ExportSampleFormat::Float32 => {
                for &sample in &self.scratch {
                    self.writer.write_sample(sample).map_err(|e| write_err(path, e))?;
                }
            }
        }
        Ok(())
    }

    /// Flush and patch the header; returns frames written
    pub fn finalize(self) -> Result<u64> {
        let frames = self.frames_written;
        let path = self.path;
        self.writer.finalize().map_err(|e| write_err(&path, e))?;
        Ok(frames)
    }
}

fn write_err(path: &Path, e: hound::Error) -> SongxError {
    SongxError::FileWrite {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

/// Write a whole buffer to a WAV file
pub fn write_wav(buffer: &AudioBuffer, path: &Path, sample_format: ExportSampleFormat) -> Result<()> {
    let format = buffer.format().ok_or_else(|| SongxError::UnsupportedFormat {
        format: format!("{}-channel buffer", buffer.channels()),
    })?;
    let mut writer = AudioFileWriter::create(path, format, sample_format)?;
    writer.write(buffer)?;
    writer.finalize()?;
    Ok(())
}

// ============================================================================
// Test signals
// ============================================================================

/// Generate a mono sine wave
pub fn generate_test_tone(frequency: f32, duration_secs: f32, sample_rate: u32) -> AudioBuffer {
    let num_samples = (duration_secs * sample_rate as f32) as usize;
    let mut buffer = AudioBuffer::new(num_samples, ChannelLayout::Mono, sample_rate);

    let angular_freq = 2.0 * std::f32::consts::PI * frequency / sample_rate as f32;
    for (i, sample) in buffer.samples[0].iter_mut().enumerate() {
        *sample = 0.5 * (angular_freq * i as f32).sin();
    }

    buffer
}

/// Generate a stereo test tone with different frequencies per channel
pub fn generate_stereo_test_tone(
    freq_left: f32,
    freq_right: f32,
    duration_secs: f32,
    sample_rate: u32,
) -> AudioBuffer {
    let num_samples = (duration_secs * sample_rate as f32) as usize;
    let mut buffer = AudioBuffer::new(num_samples, ChannelLayout::Stereo, sample_rate);

    for (ch, freq) in [freq_left, freq_right].into_iter().enumerate() {
        let angular_freq = 2.0 * std::f32::consts::PI * freq / sample_rate as f32;
        for (i, sample) in buffer.samples[ch].iter_mut().enumerate() {
            *sample = 0.5 * (angular_freq * i as f32).sin();
        }
    }

    buffer
}
