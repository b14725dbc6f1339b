//! Offline Renderer
//!
//! Drives a private effect graph in manual mode: the caller asks for up to one
//! batch of frames at a time and the engine's manual clock advances by what it
//! rendered. The loop runs until the clock reaches the target length
//! (`source_frames / rate`), writing every successful batch to a 32-bit float
//! intermediate file.
//!
//! Transient statuses skip the iteration. A hard error or a cancellation aborts
//! the job and removes the partial intermediate.

use std::path::Path;

use log::{debug, error, info, trace, warn};

use crate::engine::buffer::{AudioBuffer, AudioFormat};
use crate::engine::graph::EffectGraph;
use crate::engine::io::{AudioFileWriter, ExportSampleFormat};
use crate::engine::source::SourceTrack;
use crate::error::{Result, SongxError};
use crate::library::delete_if_exists;
use crate::params::EffectParameters;
use crate::render::CancelToken;

/// Consecutive transient statuses tolerated before the render counts as stalled
pub const MAX_TRANSIENT_RETRIES: u32 = 10_000;

/// Outcome of one manual render call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderStatus {
    /// The buffer holds the requested frames
    Success,
    /// Input could not supply data yet; retry
    InsufficientData,
    /// The engine could not render right now; retry
    CannotDoInCurrentContext,
    /// Unrecoverable failure
    Error(String),
}

/// A graph that renders on demand instead of against a device clock
pub trait ManualRender {
    fn format(&self) -> AudioFormat;

    /// Largest frame count one call may request
    fn max_frames(&self) -> usize;

    /// Frames rendered so far
    fn sample_time(&self) -> u64;

    /// Render `frames` frames into `buffer`, resizing it to fit
    fn render_offline(&mut self, frames: usize, buffer: &mut AudioBuffer) -> RenderStatus;

    fn stop(&mut self);
}

/// Manual-mode engine over a freshly built [`EffectGraph`]
#[derive(Debug)]
pub struct OfflineEngine {
    graph: EffectGraph,
    max_frames: usize,
    sample_time: u64,
}

impl OfflineEngine {
    /// Wire a new graph for `source`, apply `params` and start playing
    /// the whole file
    pub fn new(source: &SourceTrack, params: &EffectParameters, max_frames: usize) -> Result<Self> {
        let max_frames = max_frames.max(1);
        let mut graph = EffectGraph::new();
        graph.configure(source.format(), max_frames);
        graph.push_parameters(params);
        graph.player_mut().attach(source.audio());
        graph.player_mut().schedule_segment(0, source.total_frames());
        graph.start()?;
        graph.player_mut().play();
        debug!(
            "Offline engine ready: {} Hz, max {} frames per call",
            source.sample_rate(),
            max_frames
        );
        Ok(Self {
            graph,
            max_frames,
            sample_time: 0,
        })
    }
}

impl ManualRender for OfflineEngine {
    fn format(&self) -> AudioFormat {
        // configured in `new`
        self.graph
            .format()
            .unwrap_or_else(|| AudioFormat::new(44100, Default::default()))
    }

    fn max_frames(&self) -> usize {
        self.max_frames
    }

    fn sample_time(&self) -> u64 {
        self.sample_time
    }

    fn render_offline(&mut self, frames: usize, buffer: &mut AudioBuffer) -> RenderStatus {
        if frames > self.max_frames {
            return RenderStatus::Error(format!(
                "requested {} frames, maximum is {}",
                frames, self.max_frames
            ));
        }
        if !self.graph.is_running() {
            return RenderStatus::CannotDoInCurrentContext;
        }
        buffer.resize(frames);
        self.graph.render(buffer);
        self.sample_time += frames as u64;
        RenderStatus::Success
    }

    fn stop(&mut self) {
        self.graph.stop();
    }
}

/// Render `target_length` frames from `engine` into a float WAV at `path`
///
/// Returns the number of frames written. On failure or cancellation the
/// partial file is removed. The engine is stopped in every case.
pub fn render_to_file<R: ManualRender + ?Sized>(
    engine: &mut R,
    target_length: u64,
    path: &Path,
    cancel: &CancelToken,
) -> Result<u64> {
    info!(
        "Offline render of {} frames to {:?}",
        target_length, path
    );
    let mut writer = AudioFileWriter::create(path, engine.format(), ExportSampleFormat::Float32)?;
    let result = drive(engine, target_length, &mut writer, cancel);
    engine.stop();

    match result.and_then(|()| writer.finalize()) {
        Ok(frames) => {
            info!("Offline render finished: {} frames", frames);
            Ok(frames)
        }
        Err(e) => {
            error!("Offline render aborted: {}", e);
            delete_if_exists(path);
            Err(e)
        }
    }
}

fn drive<R: ManualRender + ?Sized>(
    engine: &mut R,
    target_length: u64,
    writer: &mut AudioFileWriter,
    cancel: &CancelToken,
) -> Result<()> {
    let mut buffer = AudioBuffer::with_format(engine.max_frames(), engine.format());
    let mut transient = 0u32;

    while engine.sample_time() < target_length {
        let frame = engine.sample_time();
        if cancel.is_cancelled() {
            return Err(SongxError::RenderCancelled { frame });
        }

        let remaining = target_length - frame;
        let frames = remaining.min(engine.max_frames() as u64) as usize;

        match engine.render_offline(frames, &mut buffer) {
            RenderStatus::Success => {
                transient = 0;
                writer.write_frames(&buffer, frames)?;
                trace!("Rendered {} frames at {}", frames, frame);
            }
            RenderStatus::InsufficientData | RenderStatus::CannotDoInCurrentContext => {
                transient += 1;
                if transient == 1 {
                    warn!("Transient render status at frame {}, retrying", frame);
                }
                if transient >= MAX_TRANSIENT_RETRIES {
                    return Err(SongxError::Render {
                        frame,
                        reason: format!("no progress after {} attempts", transient),
                    });
                }
            }
            RenderStatus::Error(reason) => {
                return Err(SongxError::Render { frame, reason });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::io::{decode_file, generate_test_tone};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn source(seconds: f32, sr: u32) -> SourceTrack {
        SourceTrack::from_buffer(
            "tone",
            PathBuf::from("tone.wav"),
            generate_test_tone(440.0, seconds, sr),
        )
        .unwrap()
    }

    /// Plays back a scripted status list, then succeeds
    struct Scripted {
        statuses: Vec<RenderStatus>,
        sample_time: u64,
        stopped: bool,
    }

    impl ManualRender for Scripted {
        fn format(&self) -> AudioFormat {
            AudioFormat::new(1000, Default::default())
        }

        fn max_frames(&self) -> usize {
            100
        }

        fn sample_time(&self) -> u64 {
            self.sample_time
        }

        fn render_offline(&mut self, frames: usize, buffer: &mut AudioBuffer) -> RenderStatus {
            let status = if self.statuses.is_empty() {
                RenderStatus::Success
            } else {
                self.statuses.remove(0)
            };
            if status == RenderStatus::Success {
                buffer.resize(frames);
                self.sample_time += frames as u64;
            }
            status
        }

        fn stop(&mut self) {
            self.stopped = true;
        }
    }

    #[test]
    fn test_render_length_follows_rate() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("fast.wav");
        let track = source(2.0, 8000);
        let params = EffectParameters {
            rate: 2.0,
            ..Default::default()
        };
        let target = params.target_length(track.total_frames());
        let mut engine = OfflineEngine::new(&track, &params, 4096).unwrap();

        let frames = render_to_file(&mut engine, target, &path, &CancelToken::new()).unwrap();
        assert_eq!(frames, 8000);
        assert_eq!(decode_file(&path).unwrap().len(), 8000);
    }

    #[test]
    fn test_transient_statuses_are_skipped() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("retry.wav");
        let mut engine = Scripted {
            statuses: vec![
                RenderStatus::InsufficientData,
                RenderStatus::Success,
                RenderStatus::CannotDoInCurrentContext,
            ],
            sample_time: 0,
            stopped: false,
        };

        let frames = render_to_file(&mut engine, 250, &path, &CancelToken::new()).unwrap();
        assert_eq!(frames, 250);
        assert!(engine.stopped);
    }

    #[test]
    fn test_hard_error_removes_partial_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.wav");
        let mut engine = Scripted {
            statuses: vec![
                RenderStatus::Success,
                RenderStatus::Error("device lost".to_string()),
            ],
            sample_time: 0,
            stopped: false,
        };

        let err = render_to_file(&mut engine, 1000, &path, &CancelToken::new()).unwrap_err();
        match err {
            SongxError::Render { frame, reason } => {
                assert_eq!(frame, 100);
                assert_eq!(reason, "device lost");
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(!path.exists());
        assert!(engine.stopped);
    }

    #[test]
    fn test_cancelled_render_leaves_nothing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cancelled.wav");
        let track = source(1.0, 8000);
        let mut engine = OfflineEngine::new(&track, &EffectParameters::default(), 256).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = render_to_file(&mut engine, 8000, &path, &cancel).unwrap_err();
        assert!(matches!(err, SongxError::RenderCancelled { frame: 0 }));
        assert!(!path.exists());
    }

    #[test]
    fn test_oversized_request_is_an_error() {
        let track = source(0.1, 8000);
        let mut engine = OfflineEngine::new(&track, &EffectParameters::default(), 64).unwrap();
        let mut buffer = AudioBuffer::with_format(64, engine.format());
        assert!(matches!(
            engine.render_offline(65, &mut buffer),
            RenderStatus::Error(_)
        ));
        assert_eq!(engine.sample_time(), 0);
    }
}
