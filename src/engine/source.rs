//! Source Track
//!
//! The immutable, fully decoded file of one editing session. Re-opened from
//! disk every time it is picked; nothing is cached across picks.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{error, info};
use serde::{Deserialize, Serialize};

use crate::engine::buffer::{AudioBuffer, AudioFormat};
use crate::engine::io::decode_file;
use crate::engine::scope::{ScopedAccess, SecurityScope};
use crate::error::{Result, SongxError};

/// Summary of a source track, safe to publish to observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackInfo {
    /// Display name (file stem)
    pub name: String,
    pub path: PathBuf,
    pub sample_rate: u32,
    pub channels: usize,
    pub total_frames: u64,
}

impl TrackInfo {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.total_frames as f64 / self.sample_rate as f64
    }
}

/// A decoded user-chosen file
#[derive(Debug, Clone)]
pub struct SourceTrack {
    name: String,
    path: PathBuf,
    format: AudioFormat,
    audio: Arc<AudioBuffer>,
}

impl SourceTrack {
    /// Open `path` inside a security-scoped access bracket and decode it
    ///
    /// Access is released before returning, whether decoding worked or not.
    pub fn open(path: &Path, scope: Arc<dyn SecurityScope>) -> Result<Self> {
        let access = ScopedAccess::begin(scope, path)?;
        let decoded = decode_file(access.path());
        drop(access);

        let audio = decoded.map_err(|e| {
            error!("Failed to open source {:?}: {}", path, e);
            e
        })?;
        let track = Self::from_buffer(track_name(path), path.to_path_buf(), audio)?;
        info!(
            "Opened source \"{}\": {} frames at {} Hz",
            track.name,
            track.total_frames(),
            track.sample_rate()
        );
        Ok(track)
    }

    /// Wrap already-decoded audio
    pub fn from_buffer(name: impl Into<String>, path: PathBuf, audio: AudioBuffer) -> Result<Self> {
        let format = audio.format().ok_or_else(|| SongxError::UnsupportedFormat {
            format: format!("{}-channel audio", audio.channels()),
        })?;
        if audio.is_empty() {
            return Err(SongxError::EmptyAudio { path });
        }
        Ok(Self {
            name: name.into(),
            path,
            format,
            audio: Arc::new(audio),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn sample_rate(&self) -> u32 {
        self.format.sample_rate
    }

    pub fn total_frames(&self) -> u64 {
        self.audio.len() as u64
    }

    pub fn duration_secs(&self) -> f64 {
        self.audio.duration_secs()
    }

    /// Shared handle to the decoded samples
    pub fn audio(&self) -> Arc<AudioBuffer> {
        Arc::clone(&self.audio)
    }

    pub fn info(&self) -> TrackInfo {
        TrackInfo {
            name: self.name.clone(),
            path: self.path.clone(),
            sample_rate: self.sample_rate(),
            channels: self.format.channels(),
            total_frames: self.total_frames(),
        }
    }
}

/// Display name of a track: the file name without its extension
pub fn track_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Untitled".to_string())
}
