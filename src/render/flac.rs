//! FLAC encoding
//!
//! Lossless compression of the published artifact through flacenc. Samples
//! are quantized to the export bit depth, interleaved and encoded in fixed
//! size blocks. The compression level picks the block size the way the
//! reference encoder's presets do: levels 0-2 use short blocks.

use std::path::Path;

use flacenc::bitsink::ByteSink;
use flacenc::component::BitRepr;
use flacenc::config::Encoder as EncoderConfig;
use flacenc::encode_with_fixed_block_size;
use flacenc::error::Verify;
use flacenc::source::MemSource;
use log::debug;

use crate::engine::buffer::AudioBuffer;
use crate::engine::io::ExportSampleFormat;
use crate::error::{Result, SongxError};

/// Highest accepted compression level
pub const MAX_COMPRESSION_LEVEL: u8 = 8;

const SHORT_BLOCK_SIZE: usize = 1152;
const LONG_BLOCK_SIZE: usize = 4096;

/// Frames per FLAC block for a compression level
pub fn block_size_for_level(level: u8) -> usize {
    if level <= 2 {
        SHORT_BLOCK_SIZE
    } else {
        LONG_BLOCK_SIZE
    }
}

fn encode_err(reason: String) -> SongxError {
    SongxError::Transcode { reason }
}

#[inline]
fn quantize(sample: f32, bits: usize) -> i32 {
    let clamped = if sample.is_finite() { sample.clamp(-1.0, 1.0) } else { 0.0 };
    match bits {
        16 => (clamped * 32767.0) as i32,
        _ => (clamped * 8388607.0) as i32,
    }
}

/// Encode `audio` into an in-memory FLAC stream
///
/// # Errors
/// * `UnsupportedFormat` - float samples or an unsupported channel count
/// * `Transcode` - the encoder rejected the stream
pub fn encode_flac(audio: &AudioBuffer, sample_format: ExportSampleFormat, level: u8) -> Result<Vec<u8>> {
    let bits = match sample_format {
        ExportSampleFormat::Pcm16 => 16,
        ExportSampleFormat::Pcm24 => 24,
        ExportSampleFormat::Float32 => {
            return Err(SongxError::UnsupportedFormat {
                format: "32-bit float FLAC".to_string(),
            })
        }
    };
    let format = audio.format().ok_or_else(|| SongxError::UnsupportedFormat {
        format: format!("{}-channel FLAC", audio.channels()),
    })?;
    let channels = format.channels();

    let mut interleaved = Vec::with_capacity(audio.len() * channels);
    for i in 0..audio.len() {
        for ch in 0..channels {
            interleaved.push(quantize(audio.channel(ch)[i], bits));
        }
    }

    let config = EncoderConfig::default()
        .into_verified()
        .map_err(|e| encode_err(format!("invalid FLAC config: {:?}", e)))?;
    let source = MemSource::from_samples(&interleaved, channels, bits, format.sample_rate as usize);
    let block_size = block_size_for_level(level);
    let stream = encode_with_fixed_block_size(&config, source, block_size)
        .map_err(|e| encode_err(format!("FLAC encoding failed: {:?}", e)))?;

    let mut sink = ByteSink::new();
    stream
        .write(&mut sink)
        .map_err(|e| encode_err(format!("cannot serialize FLAC stream: {:?}", e)))?;
    let bytes = sink.into_inner();
    debug!(
        "FLAC: {} frames, {}-bit, block {} -> {} bytes",
        audio.len(),
        bits,
        block_size,
        bytes.len()
    );
    Ok(bytes)
}

/// Encode `audio` into a FLAC file at `path`; returns frames written
pub fn write_flac(
    audio: &AudioBuffer,
    path: &Path,
    sample_format: ExportSampleFormat,
    level: u8,
) -> Result<u64> {
    let bytes = encode_flac(audio, sample_format, level)?;
    std::fs::write(path, bytes).map_err(|e| SongxError::FileWrite {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(audio.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::io::{decode_file, generate_stereo_test_tone, generate_test_tone};
    use approx::assert_abs_diff_eq;
    use tempfile::TempDir;

    #[test]
    fn test_block_size_follows_level() {
        assert_eq!(block_size_for_level(0), 1152);
        assert_eq!(block_size_for_level(2), 1152);
        assert_eq!(block_size_for_level(5), 4096);
        assert_eq!(block_size_for_level(8), 4096);
    }

    #[test]
    fn test_stream_starts_with_marker() {
        let tone = generate_test_tone(440.0, 0.1, 44100);
        let bytes = encode_flac(&tone, ExportSampleFormat::Pcm16, 5).unwrap();
        assert_eq!(&bytes[..4], b"fLaC");
    }

    #[test]
    fn test_float_is_rejected() {
        let tone = generate_test_tone(440.0, 0.1, 44100);
        let err = encode_flac(&tone, ExportSampleFormat::Float32, 5).unwrap_err();
        assert!(matches!(err, SongxError::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_written_file_decodes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("tone.flac");
        let tone = generate_stereo_test_tone(220.0, 330.0, 0.5, 22050);

        let frames = write_flac(&tone, &path, ExportSampleFormat::Pcm24, 8).unwrap();
        assert_eq!(frames, 11025);

        let decoded = decode_file(&path).unwrap();
        assert_eq!(decoded.len(), tone.len());
        assert_eq!(decoded.channels(), 2);
        for i in (0..tone.len()).step_by(101) {
            assert_abs_diff_eq!(decoded.channel(1)[i], tone.channel(1)[i], epsilon = 1e-4);
        }
    }
}
