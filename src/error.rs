//! Error handling for Song-X
//!
//! Errors are grouped the way the engine reacts to them: resource errors abort
//! the operation and leave state untouched, engine errors leave the session
//! idle, render errors are reported through the job's completion channel.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for Song-X operations
pub type Result<T> = std::result::Result<T, SongxError>;

/// Main error type for Song-X operations
#[derive(Error, Debug)]
pub enum SongxError {
    // Resource Errors
    #[error("File not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("Access denied for security-scoped resource: {}", path.display())]
    AccessDenied { path: PathBuf },

    #[error("Failed to decode {}: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },

    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Audio contains no samples: {}", path.display())]
    EmptyAudio { path: PathBuf },

    #[error("Directory creation failed: {}: {source}", path.display())]
    DirectoryCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {}: {reason}", path.display())]
    FileWrite { path: PathBuf, reason: String },

    // Engine Errors
    #[error("Audio engine failed to start: {reason}")]
    EngineStart { reason: String },

    #[error("Audio engine is not configured")]
    EngineNotConfigured,

    #[error("No source track loaded")]
    NoSource,

    // Render Errors
    #[error("Offline render failed at frame {frame}: {reason}")]
    Render { frame: u64, reason: String },

    #[error("Offline render cancelled at frame {frame}")]
    RenderCancelled { frame: u64 },

    #[error("Failed to create export session: {reason}")]
    ExportSessionCreation { reason: String },

    #[error("Transcode failed: {reason}")]
    Transcode { reason: String },

    // Parameter Errors
    #[error("Invalid parameter {param}={value} (expected {expected})")]
    InvalidParameter {
        param: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("Unknown preset: {name}")]
    UnknownPreset { name: String },

    // Configuration Errors
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SongxError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            SongxError::FileNotFound { .. } => "FILE_NOT_FOUND",
            SongxError::AccessDenied { .. } => "ACCESS_DENIED",
            SongxError::Decode { .. } => "DECODE_ERROR",
            SongxError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            SongxError::EmptyAudio { .. } => "EMPTY_AUDIO",
            SongxError::DirectoryCreate { .. } => "DIRECTORY_CREATE_ERROR",
            SongxError::FileWrite { .. } => "FILE_WRITE_ERROR",
            SongxError::EngineStart { .. } => "ENGINE_START_ERROR",
            SongxError::EngineNotConfigured => "ENGINE_NOT_CONFIGURED",
            SongxError::NoSource => "NO_SOURCE",
            SongxError::Render { .. } => "RENDER_ERROR",
            SongxError::RenderCancelled { .. } => "RENDER_CANCELLED",
            SongxError::ExportSessionCreation { .. } => "EXPORT_SESSION_ERROR",
            SongxError::Transcode { .. } => "TRANSCODE_ERROR",
            SongxError::InvalidParameter { .. } => "INVALID_PARAMETER",
            SongxError::UnknownPreset { .. } => "UNKNOWN_PRESET",
            SongxError::InvalidConfig { .. } => "INVALID_CONFIG",
            SongxError::Io(_) => "IO_ERROR",
            SongxError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if the session can keep going after this error
    ///
    /// Everything except configuration mistakes is recoverable: a failed
    /// engine start leaves the session idle and the caller may pick again.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, SongxError::InvalidConfig { .. })
    }

    /// Check if this error came out of a render job
    pub fn is_render_failure(&self) -> bool {
        matches!(
            self,
            SongxError::Render { .. }
                | SongxError::RenderCancelled { .. }
                | SongxError::ExportSessionCreation { .. }
                | SongxError::Transcode { .. }
        )
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            SongxError::FileNotFound { .. } => vec![
                "Check the file path is correct",
                "Verify the file hasn't been moved or deleted",
            ],
            SongxError::AccessDenied { .. } => vec![
                "Pick the file again to renew access",
                "Copy the file into the app's documents folder",
            ],
            SongxError::Decode { .. } | SongxError::UnsupportedFormat { .. } => vec![
                "Check if the file plays in another application",
                "Supported formats: WAV, AIFF, FLAC, MP3, M4A (AAC/ALAC), OGG",
            ],
            SongxError::EngineStart { .. } => vec![
                "Pick the song again to rebuild the audio engine",
                "Check that an audio output device is available",
            ],
            SongxError::Render { .. } | SongxError::Transcode { .. } => vec![
                "Try saving again",
                "Free up disk space",
            ],
            SongxError::NoSource => vec!["Pick a song first"],
            SongxError::DirectoryCreate { .. } | SongxError::FileWrite { .. } => vec![
                "Check write permissions on the documents folder",
                "Free up disk space",
            ],
            _ => vec![],
        }
    }
}
