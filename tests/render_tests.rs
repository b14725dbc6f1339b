//! Render Tests
//!
//! End-to-end offline render + transcode through the session API.

use std::path::{Path, PathBuf};
use std::time::Duration;

use approx::assert_abs_diff_eq;
use songx::engine::io::{decode_file, generate_test_tone, write_wav, ExportSampleFormat};
use songx::engine::source::SourceTrack;
use songx::engine::AudioBuffer;
use songx::library::Library;
use songx::render::{
    CancelToken, ManualRender, OfflineEngine, RenderJob, RenderRequest, RenderStatus,
};
use songx::{EffectParameters, EffectPreset, EngineConfig, Session, SessionEvent, SongxError};
use tempfile::TempDir;

fn write_song(dir: &Path, name: &str, seconds: f32, sample_rate: u32) -> PathBuf {
    let path = dir.join(format!("{}.wav", name));
    let tone = generate_test_tone(440.0, seconds, sample_rate);
    write_wav(&tone, &path, ExportSampleFormat::Pcm16).unwrap();
    path
}

fn session(temp: &TempDir) -> Session {
    Session::builder(EngineConfig::with_documents_dir(temp.path().join("Documents")))
        .build()
        .unwrap()
}

fn render_with(temp: &TempDir, seconds: f32, params: EffectParameters) -> (PathBuf, u64) {
    let mut session = session(temp);
    let input = write_song(temp.path(), "Song", seconds, 44100);
    session.pick_source(&input).unwrap();
    session.set_effect_parameters(params).unwrap();
    let outcome = session.render_and_export().unwrap().wait().unwrap();
    (outcome.final_path, outcome.frames)
}

// === Render Length Tests ===

#[test]
fn test_rate_two_halves_length() {
    let temp = TempDir::new().unwrap();
    let params = EffectParameters {
        rate: 2.0,
        ..Default::default()
    };
    let (path, frames) = render_with(&temp, 10.0, params);

    assert_eq!(frames, 220_500);
    let audio = decode_file(&path).unwrap();
    assert_abs_diff_eq!(audio.duration_secs(), 5.0, epsilon = 1e-3);
}

#[test]
fn test_rate_half_doubles_length() {
    let temp = TempDir::new().unwrap();
    let params = EffectParameters {
        rate: 0.5,
        ..Default::default()
    };
    let (path, frames) = render_with(&temp, 10.0, params);

    assert_eq!(frames, 882_000);
    assert_abs_diff_eq!(decode_file(&path).unwrap().duration_secs(), 20.0, epsilon = 1e-3);
}

#[test]
fn test_nightcore_scenario() {
    let temp = TempDir::new().unwrap();
    let mut session = session(&temp);
    let input = write_song(temp.path(), "Mono Track", 30.0, 44100);
    session.pick_source(&input).unwrap();

    let params = session.select_effect(EffectPreset::Nightcore);
    assert_eq!(params.rate, 1.15);
    assert_eq!(params.pitch, 300.0);
    assert_eq!(params.low_pass_frequency, 5500.0);
    assert!(params.filter_enabled);

    let outcome = session.render_and_export().unwrap().wait().unwrap();
    let library = session.library();

    assert_eq!(outcome.final_path, library.final_output_path("Mono Track"));
    assert!(outcome
        .final_path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("SongX_"));
    assert!(outcome.final_path.exists());
    assert!(!library.intermediate_path("Mono Track").exists());
    assert_abs_diff_eq!(outcome.duration_secs(), 30.0 / 1.15, epsilon = 0.01);

    let audio = decode_file(&outcome.final_path).unwrap();
    assert_eq!(audio.channels(), 1);
    assert_eq!(audio.sample_rate, 44100);
}

#[test]
fn test_published_flac_is_smaller_than_source() {
    let temp = TempDir::new().unwrap();
    let mut session = session(&temp);
    let input = write_song(temp.path(), "Packed", 5.0, 44100);
    session.pick_source(&input).unwrap();

    let outcome = session.render_and_export().unwrap().wait().unwrap();
    let path = &outcome.final_path;
    assert_eq!(path.extension().unwrap(), "flac");

    let bytes = std::fs::read(path).unwrap();
    assert_eq!(&bytes[..4], b"fLaC");
    let source_len = std::fs::metadata(&input).unwrap().len();
    assert!((bytes.len() as u64) < source_len);

    let audio = decode_file(path).unwrap();
    assert_eq!(audio.len(), 220_500);
    assert_eq!(outcome.frames, 220_500);
}

// === Failure Tests ===

/// Offline engine that fails hard after a number of batches
struct FailAfter {
    inner: OfflineEngine,
    batches_left: u32,
}

impl ManualRender for FailAfter {
    fn format(&self) -> songx::engine::AudioFormat {
        self.inner.format()
    }

    fn max_frames(&self) -> usize {
        self.inner.max_frames()
    }

    fn sample_time(&self) -> u64 {
        self.inner.sample_time()
    }

    fn render_offline(&mut self, frames: usize, buffer: &mut AudioBuffer) -> RenderStatus {
        if self.batches_left == 0 {
            return RenderStatus::Error("simulated render failure".to_string());
        }
        self.batches_left -= 1;
        self.inner.render_offline(frames, buffer)
    }

    fn stop(&mut self) {
        self.inner.stop()
    }
}

fn request(temp: &TempDir, seconds: f32) -> RenderRequest {
    let library = Library::new(temp.path().join("Edited Songs"), "SongX_", "flac");
    library.ensure_output_directory().unwrap();
    let input = write_song(temp.path(), "Broken", seconds, 22050);
    RenderRequest {
        source: SourceTrack::open(&input, std::sync::Arc::new(songx::engine::Unsandboxed)).unwrap(),
        params: EffectParameters::default(),
        intermediate_path: library.intermediate_path("Broken"),
        final_path: library.final_output_path("Broken"),
        max_render_frames: 4096,
        export: Default::default(),
    }
}

#[test]
fn test_hard_render_error_publishes_nothing() {
    let temp = TempDir::new().unwrap();
    let req = request(&temp, 2.0);
    let final_path = req.final_path.clone();
    let intermediate = req.intermediate_path.clone();
    let (tx, rx) = crossbeam_channel::unbounded();

    let handle = RenderJob::new(req)
        .with_engine_factory(Box::new(|r: &RenderRequest| -> songx::Result<Box<dyn ManualRender + Send>> {
            let inner = OfflineEngine::new(&r.source, &r.params, r.max_render_frames)?;
            Ok(Box::new(FailAfter {
                inner,
                batches_left: 3,
            }))
        }))
        .on_complete(Box::new(move |result: &songx::Result<songx::RenderOutcome>| {
            tx.send(result.as_ref().err().map(|e| e.to_string())).unwrap();
        }))
        .spawn()
        .unwrap();

    let err = handle.wait().unwrap_err();
    match err {
        SongxError::Render { frame, ref reason } => {
            assert_eq!(frame, 3 * 4096);
            assert_eq!(reason, "simulated render failure");
        }
        ref other => panic!("unexpected error {:?}", other),
    }
    assert!(err.is_render_failure());
    assert!(!final_path.exists());
    assert!(!intermediate.exists());

    let reported = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(reported.unwrap().contains("simulated render failure"));
}

#[test]
fn test_cancelled_job_leaves_no_final_file() {
    let temp = TempDir::new().unwrap();
    let req = request(&temp, 1.0);
    let final_path = req.final_path.clone();
    let cancel = CancelToken::new();
    cancel.cancel();

    let err = RenderJob::new(req).run(&cancel).unwrap_err();
    assert!(matches!(err, SongxError::RenderCancelled { .. }));
    assert!(!final_path.exists());
}

// === Library Replacement Tests ===

#[test]
fn test_second_render_replaces_first() {
    let temp = TempDir::new().unwrap();
    let mut session = session(&temp);
    let input = write_song(temp.path(), "Repeat", 2.0, 22050);
    session.pick_source(&input).unwrap();

    let first = session.render_and_export().unwrap().wait().unwrap();
    session.set_rate(2.0).unwrap();
    let second = session.render_and_export().unwrap().wait().unwrap();

    assert_eq!(first.final_path, second.final_path);
    assert_eq!(first.frames, 44_100);
    assert_eq!(second.frames, 22_050);

    let outputs = session.list_rendered_outputs();
    assert_eq!(outputs, vec![second.final_path.clone()]);
    assert_eq!(decode_file(&second.final_path).unwrap().len(), 22_050);
    assert!(session.is_shareable());
}

#[test]
fn test_parameters_snapshot_at_render_start() {
    let temp = TempDir::new().unwrap();
    let mut session = session(&temp);
    let input = write_song(temp.path(), "Snapshot", 3.0, 22050);
    session.pick_source(&input).unwrap();
    session.set_rate(1.5).unwrap();

    let handle = session.render_and_export().unwrap();
    session.set_rate(0.5).unwrap();
    let outcome = handle.wait().unwrap();

    assert_eq!(outcome.frames, 44_100);
}

#[test]
fn test_render_finished_event() {
    let temp = TempDir::new().unwrap();
    let mut session = session(&temp);
    let events = session.subscribe();
    let input = write_song(temp.path(), "Evented", 0.5, 22050);
    session.pick_source(&input).unwrap();

    let outcome = session.render_and_export().unwrap().wait().unwrap();
    let finished = events
        .try_iter()
        .find_map(|event| match event {
            SessionEvent::RenderFinished(result) => Some(result),
            _ => None,
        })
        .expect("render event published");
    assert_eq!(finished, Ok(outcome.final_path));
}

#[test]
fn test_playback_resumes_after_render() {
    let temp = TempDir::new().unwrap();
    let mut session = session(&temp);
    let input = write_song(temp.path(), "Again", 1.0, 22050);
    session.pick_source(&input).unwrap();
    session.play_or_pause().unwrap();

    session.render_and_export().unwrap().wait().unwrap();
    assert!(!session.is_playing());

    session.play_or_pause().unwrap();
    assert!(session.is_playing());
    assert!(session.live_graph().lock().is_running());
}
