//! Post-Render Transcoder
//!
//! Compresses the float intermediate into the export codec (FLAC by default)
//! at the final artifact path. Any stale artifact there is deleted first. The
//! new file is written to a hidden sibling and renamed into place, so a failed
//! export never leaves a truncated file at the final path.
//!
//! On success the intermediate is deleted; on failure it is kept for diagnosis.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use log::{error, info};

use crate::dsp::{FrameSource, TimePitch};
use crate::engine::buffer::AudioBuffer;
use crate::engine::io::{decode_file, write_wav};
use crate::error::{Result, SongxError};
use crate::library::delete_if_exists;
use crate::render::flac::write_flac;
use crate::render::{ExportCodec, ExportSettings, TimePitchAlgorithm};

/// Frames converted per write
const CHUNK_FRAMES: usize = 8192;

/// Reads consecutive frames out of a decoded intermediate
struct BufferReader<'a> {
    audio: &'a AudioBuffer,
    position: usize,
}

impl FrameSource for BufferReader<'_> {
    fn fill(&mut self, out: &mut AudioBuffer) {
        out.silence();
        let count = out.len();
        out.copy_frames_from(self.audio, self.position, 0, count);
        self.position += count;
    }
}

#[derive(Debug, Clone, Default)]
pub struct Transcoder {
    settings: ExportSettings,
}

impl Transcoder {
    pub fn new(settings: ExportSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    /// Export `input` to `output`; returns the frames written
    ///
    /// # Errors
    /// * `InvalidConfig` - the settings cannot be exported
    /// * `ExportSessionCreation` - the intermediate cannot be read
    /// * `Transcode` - encoding or publishing the artifact failed
    pub fn transcode(&self, input: &Path, output: &Path) -> Result<u64> {
        self.settings.validate()?;
        delete_if_exists(output);

        let audio = decode_file(input).map_err(|e| {
            error!("Cannot open {:?} for export: {}", input, e);
            SongxError::ExportSessionCreation {
                reason: e.to_string(),
            }
        })?;

        let staging = staging_path(output);
        let frames = match self.export(&audio, &staging) {
            Ok(frames) => frames,
            Err(e) => {
                delete_if_exists(&staging);
                error!("Export of {:?} failed, intermediate kept: {}", input, e);
                return Err(SongxError::Transcode {
                    reason: e.to_string(),
                });
            }
        };

        if let Err(e) = std::fs::rename(&staging, output) {
            delete_if_exists(&staging);
            error!("Could not publish {:?}: {}", output, e);
            return Err(SongxError::Transcode {
                reason: format!("rename to {}: {}", output.display(), e),
            });
        }

        delete_if_exists(input);
        info!("Exported {:?} ({} frames)", output, frames);
        Ok(frames)
    }

    fn export(&self, audio: &AudioBuffer, path: &Path) -> Result<u64> {
        let mixed = self.audio_mix(audio)?;
        match self.settings.codec {
            ExportCodec::Flac => write_flac(
                &mixed,
                path,
                self.settings.sample_format,
                self.settings.compression_level,
            ),
            ExportCodec::Wav => {
                write_wav(&mixed, path, self.settings.sample_format)?;
                Ok(mixed.len() as u64)
            }
        }
    }

    /// Apply the time-pitch algorithm at unity rate
    ///
    /// Varispeed is a plain pass-through; spectral goes through the time-pitch
    /// stage and keeps the length.
    fn audio_mix<'a>(&self, audio: &'a AudioBuffer) -> Result<Cow<'a, AudioBuffer>> {
        if self.settings.time_pitch_algorithm == TimePitchAlgorithm::Varispeed {
            return Ok(Cow::Borrowed(audio));
        }
        let format = audio.format().ok_or_else(|| SongxError::UnsupportedFormat {
            format: format!("{}-channel intermediate", audio.channels()),
        })?;
        let mut stage = TimePitch::new();
        stage.configure(format.sample_rate, format.layout);
        let mut reader = BufferReader { audio, position: 0 };
        let mut mixed = AudioBuffer::with_format(audio.len(), format);
        let mut chunk = AudioBuffer::with_format(CHUNK_FRAMES, format);
        let mut written = 0;
        while written < audio.len() {
            let count = CHUNK_FRAMES.min(audio.len() - written);
            chunk.resize(count);
            stage.render(&mut chunk, &mut reader);
            mixed.copy_frames_from(&chunk, 0, written, count);
            written += count;
        }
        Ok(Cow::Owned(mixed))
    }
}

fn staging_path(output: &Path) -> PathBuf {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    output.with_file_name(format!(".{}.partial", name))
}
