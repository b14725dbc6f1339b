//! Offline rendering
//!
//! A render job materializes the current effect settings into a file in two
//! steps: the offline renderer drives a private effect graph faster than real
//! time into a 32-bit float WAV intermediate, then the transcoder compresses
//! that into the published artifact.

pub mod flac;
pub mod job;
pub mod offline;
pub mod transcode;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::engine::io::ExportSampleFormat;
use crate::error::{Result, SongxError};

pub use job::{EngineFactory, RenderHandle, RenderJob, RenderOutcome, RenderRequest};
pub use offline::{render_to_file, ManualRender, OfflineEngine, RenderStatus};
pub use flac::{encode_flac, write_flac, MAX_COMPRESSION_LEVEL};
pub use transcode::Transcoder;

/// Codec of the published artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportCodec {
    /// Lossless compressed FLAC
    #[default]
    Flac,
    /// Uncompressed WAV
    Wav,
}

impl ExportCodec {
    /// File extension the library uses for this codec
    pub fn extension(&self) -> &'static str {
        match self {
            ExportCodec::Flac => "flac",
            ExportCodec::Wav => "wav",
        }
    }
}

/// Time-pitch algorithm applied by the transcoder's audio mix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimePitchAlgorithm {
    /// Rate and pitch move together; exact at unity
    #[default]
    Varispeed,
    /// Rate and pitch independent
    Spectral,
}

/// Transcoder settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub codec: ExportCodec,
    /// Bit depth of the artifact; FLAC takes only the integer formats
    pub sample_format: ExportSampleFormat,
    /// FLAC effort, 0 (fastest) to 8 (smallest)
    pub compression_level: u8,
    pub time_pitch_algorithm: TimePitchAlgorithm,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            codec: ExportCodec::Flac,
            sample_format: ExportSampleFormat::Pcm16,
            compression_level: 5,
            time_pitch_algorithm: TimePitchAlgorithm::Varispeed,
        }
    }
}

impl ExportSettings {
    /// # Errors
    /// `InvalidConfig` for float FLAC or a level above [`MAX_COMPRESSION_LEVEL`]
    pub fn validate(&self) -> Result<()> {
        if self.codec == ExportCodec::Flac && self.sample_format == ExportSampleFormat::Float32 {
            return Err(SongxError::InvalidConfig {
                reason: "FLAC stores integer samples, use pcm16 or pcm24".to_string(),
            });
        }
        if self.compression_level > MAX_COMPRESSION_LEVEL {
            return Err(SongxError::InvalidConfig {
                reason: format!(
                    "compression_level {} is above {}",
                    self.compression_level, MAX_COMPRESSION_LEVEL
                ),
            });
        }
        Ok(())
    }
}

/// Cooperative cancellation flag shared with a running job
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_settings_defaults() {
        let settings = ExportSettings::default();
        assert_eq!(settings.codec, ExportCodec::Flac);
        assert_eq!(settings.codec.extension(), "flac");
        assert_eq!(settings.sample_format, ExportSampleFormat::Pcm16);
        assert_eq!(settings.time_pitch_algorithm, TimePitchAlgorithm::Varispeed);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_settings_json() {
        let settings: ExportSettings =
            serde_json::from_str(r#"{"codec":"wav","sample_format":"float32"}"#).unwrap();
        assert_eq!(settings.codec, ExportCodec::Wav);
        assert_eq!(settings.sample_format, ExportSampleFormat::Float32);
        assert_eq!(settings.compression_level, 5);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_float_flac_is_rejected() {
        let settings = ExportSettings {
            sample_format: ExportSampleFormat::Float32,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(SongxError::InvalidConfig { .. })
        ));

        let too_high = ExportSettings {
            compression_level: 9,
            ..Default::default()
        };
        assert!(too_high.validate().is_err());
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
