//! Engine configuration
//!
//! Loaded from JSON; every field has a default so a partial file is fine.

use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SongxError};
use crate::render::{ExportCodec, ExportSettings};

/// Environment variable overriding [`EngineConfig::documents_dir`]
pub const DOCUMENTS_DIR_ENV: &str = "SONGX_DOCUMENTS_DIR";

/// Default offline render batch size
pub const DEFAULT_MAX_RENDER_FRAMES: usize = 4096;

fn default_documents_dir() -> PathBuf {
    dirs::document_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Configuration shared by the live session, the render job and the library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Root under which the output directory lives
    pub documents_dir: PathBuf,
    /// Name of the dedicated output directory
    pub output_folder: String,
    /// Prefix of final rendered artifacts
    pub output_prefix: String,
    /// Extension of final artifacts; must match the export codec
    pub output_extension: String,
    /// Maximum frames per offline render call
    pub max_render_frames: usize,
    /// Seconds moved by a skip
    pub skip_seconds: f64,
    /// Clock driver period in milliseconds
    pub tick_interval_ms: u64,
    /// Live pull block size
    pub block_frames: usize,
    pub export: ExportSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            documents_dir: default_documents_dir(),
            output_folder: "Edited Songs".to_string(),
            output_prefix: "SongX_".to_string(),
            output_extension: ExportCodec::default().extension().to_string(),
            max_render_frames: DEFAULT_MAX_RENDER_FRAMES,
            skip_seconds: 5.0,
            tick_interval_ms: 16,
            block_frames: 512,
            export: ExportSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Default configuration rooted at `documents_dir`
    pub fn with_documents_dir(documents_dir: impl Into<PathBuf>) -> Self {
        Self {
            documents_dir: documents_dir.into(),
            ..Self::default()
        }
    }

    /// Read and validate a JSON config file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SongxError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let json = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&json)?;
        config.validate()?;
        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Load from `path` if given, falling back to defaults on any problem
    pub fn load_or_default(path: Option<&Path>) -> Self {
        match path {
            Some(path) => match Self::load(path) {
                Ok(config) => config,
                Err(e) => {
                    warn!("Using default config, {:?} unusable: {}", path, e);
                    Self::default()
                }
            },
            None => Self::default(),
        }
    }

    /// Apply `SONGX_DOCUMENTS_DIR` if set
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(dir) = std::env::var_os(DOCUMENTS_DIR_ENV) {
            if !dir.is_empty() {
                self.documents_dir = PathBuf::from(dir);
            }
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| {
            Err(SongxError::InvalidConfig {
                reason: reason.to_string(),
            })
        };
        if self.max_render_frames == 0 {
            return invalid("max_render_frames must be > 0");
        }
        if self.block_frames == 0 {
            return invalid("block_frames must be > 0");
        }
        if self.tick_interval_ms == 0 {
            return invalid("tick_interval_ms must be > 0");
        }
        if !self.skip_seconds.is_finite() || self.skip_seconds <= 0.0 {
            return invalid("skip_seconds must be a positive number");
        }
        if self.output_prefix.is_empty() {
            return invalid("output_prefix must not be empty");
        }
        if self.output_extension.is_empty() || self.output_extension.contains('.') {
            return invalid("output_extension must be a bare extension such as \"flac\"");
        }
        if !self
            .output_extension
            .eq_ignore_ascii_case(self.export.codec.extension())
        {
            return invalid(&format!(
                "output_extension \"{}\" does not match the {:?} codec",
                self.output_extension, self.export.codec
            ));
        }
        self.export.validate()?;
        if self.output_folder.is_empty() {
            return invalid("output_folder must not be empty");
        }
        Ok(())
    }

    /// `<documents>/<output_folder>`
    pub fn output_dir(&self) -> PathBuf {
        self.documents_dir.join(&self.output_folder)
    }

    /// Save as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| SongxError::FileWrite {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.output_prefix, "SongX_");
        assert_eq!(config.output_folder, "Edited Songs");
        assert_eq!(config.max_render_frames, 4096);
        assert_eq!(config.output_extension, "flac");
    }

    #[test]
    fn test_save_load_partial() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("songx.json");
        std::fs::write(&path, r#"{ "max_render_frames": 1024, "skip_seconds": 10.0 }"#).unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.max_render_frames, 1024);
        assert_eq!(config.skip_seconds, 10.0);
        assert_eq!(config.output_prefix, "SongX_");

        let out = temp.path().join("saved.json");
        config.save(&out).unwrap();
        assert_eq!(EngineConfig::load(&out).unwrap(), config);
    }

    #[test]
    fn test_load_missing_file() {
        let err = EngineConfig::load(Path::new("/nonexistent/songx.json")).unwrap_err();
        assert_eq!(err.error_code(), "FILE_NOT_FOUND");
    }

    #[test]
    fn test_invalid_batch_size_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.json");
        std::fs::write(&path, r#"{ "max_render_frames": 0 }"#).unwrap();

        assert!(matches!(
            EngineConfig::load(&path),
            Err(SongxError::InvalidConfig { .. })
        ));
        let fallback = EngineConfig::load_or_default(Some(&path));
        assert_eq!(fallback.max_render_frames, DEFAULT_MAX_RENDER_FRAMES);
    }

    #[test]
    fn test_output_dir() {
        let config = EngineConfig::with_documents_dir("/tmp/docs");
        assert_eq!(config.output_dir(), PathBuf::from("/tmp/docs/Edited Songs"));
    }

    #[test]
    fn test_extension_must_match_codec() {
        let mut config = EngineConfig {
            output_extension: "wav".to_string(),
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SongxError::InvalidConfig { .. })
        ));

        config.export.codec = ExportCodec::Wav;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_dotted_extension_rejected() {
        let config = EngineConfig {
            output_extension: ".wav".to_string(),
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
