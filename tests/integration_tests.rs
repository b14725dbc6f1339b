//! Integration Tests
//!
//! Session-level tests for transport, parameters and the library.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use songx::engine::io::{generate_stereo_test_tone, write_wav, ExportSampleFormat};
use songx::engine::output::ThreadedOutput;
use songx::engine::{AudioBuffer, ChannelLayout, TransportState};
use songx::library::delete_if_exists;
use songx::{EffectParameters, EffectPreset, EngineConfig, ReverbPreset, Session, SessionEvent};
use tempfile::TempDir;
use test_case::test_case;

const SR: u32 = 8000;

fn write_song(dir: &Path, name: &str, seconds: f32) -> PathBuf {
    let path = dir.join(format!("{}.wav", name));
    let tone = generate_stereo_test_tone(220.0, 330.0, seconds, SR);
    write_wav(&tone, &path, ExportSampleFormat::Pcm16).unwrap();
    path
}

fn loaded_session(temp: &TempDir, seconds: f32) -> Session {
    let mut session = Session::builder(EngineConfig::with_documents_dir(temp.path()))
        .build()
        .unwrap();
    session
        .pick_source(&write_song(temp.path(), "Song", seconds))
        .unwrap();
    session
}

fn pull(session: &Session, frames: usize) {
    let mut out = AudioBuffer::new(frames, ChannelLayout::Stereo, SR);
    session.live_graph().lock().render(&mut out);
}

// === Seek Tests ===

#[test_case(2.0, 3.0, 40_000 ; "forward")]
#[test_case(6.0, -2.5, 28_000 ; "backward")]
#[test_case(1.0, -5.0, 0 ; "clamped at start")]
#[test_case(9.0, 0.5, 76_000 ; "near end")]
fn test_seek_from_position(played_secs: f64, delta: f64, expected: u64) {
    let temp = TempDir::new().unwrap();
    let mut session = loaded_session(&temp, 10.0);
    session.play_or_pause().unwrap();
    pull(&session, (played_secs * SR as f64) as usize);
    session.tick();

    session.seek(delta);
    assert_eq!(session.snapshot().current_frame, expected);
    assert!(session.is_playing());

    let region = session.live_graph().lock().player().scheduled_region().unwrap();
    assert_eq!(region.start_frame, expected);
    assert_eq!(region.frame_count, 80_000 - expected);
}

#[test]
fn test_seek_between_ticks_starts_from_played_position() {
    let temp = TempDir::new().unwrap();
    let mut session = loaded_session(&temp, 10.0);
    session.play_or_pause().unwrap();
    pull(&session, 16_000);

    session.seek(1.0);
    assert_eq!(session.snapshot().current_frame, 24_000);
}

#[test]
fn test_seek_past_end_does_not_reschedule() {
    let temp = TempDir::new().unwrap();
    let mut session = loaded_session(&temp, 10.0);

    session.seek(30.0);
    let snapshot = session.snapshot();
    assert_eq!(snapshot.current_frame, 80_000);
    assert_eq!(snapshot.state, TransportState::Finished);
    assert!(session.live_graph().lock().player().scheduled_region().is_none());
}

#[test]
fn test_skip_uses_configured_interval() {
    let temp = TempDir::new().unwrap();
    let mut session = loaded_session(&temp, 10.0);

    session.skip(true);
    assert_eq!(session.snapshot().current_frame, 40_000);
    session.skip(false);
    session.skip(false);
    assert_eq!(session.snapshot().current_frame, 0);
}

#[test]
fn test_scrub_and_time_display() {
    let temp = TempDir::new().unwrap();
    let mut session = loaded_session(&temp, 10.0);

    session.scrub(0.25);
    let snapshot = session.snapshot();
    assert_eq!(snapshot.current_frame, 20_000);
    assert_eq!(snapshot.time.elapsed_text(), "0:02");
    assert_eq!(snapshot.time.remaining_text(), "0:07");
}

#[test]
fn test_pause_preserves_position() {
    let temp = TempDir::new().unwrap();
    let mut session = loaded_session(&temp, 10.0);
    session.play_or_pause().unwrap();
    pull(&session, 8000);
    session.play_or_pause().unwrap();
    pull(&session, 8000);

    let snapshot = session.tick();
    assert_eq!(snapshot.state, TransportState::Paused);
    assert_eq!(snapshot.current_frame, 8000);
}

// === Live Playback Tests ===

#[test]
fn test_threaded_playback_reaches_end() {
    let temp = TempDir::new().unwrap();
    let mut config = EngineConfig::with_documents_dir(temp.path());
    config.tick_interval_ms = 5;
    let mut session = Session::builder(config)
        .output(Box::new(ThreadedOutput::new(256)))
        .threaded_clock(true)
        .build()
        .unwrap();
    let events = session.subscribe();
    session
        .pick_source(&write_song(temp.path(), "Short", 0.3))
        .unwrap();
    session.play_or_pause().unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while session.transport_state() != TransportState::Finished && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
        session.pump();
    }

    assert_eq!(session.transport_state(), TransportState::Finished);
    assert_eq!(session.snapshot().current_frame, 0);
    let saw_progress = events.try_iter().any(|event| {
        matches!(event, SessionEvent::Playback(s) if s.is_playing && s.current_frame > 0)
    });
    assert!(saw_progress);
}

// === Parameter Tests ===

#[test]
fn test_reset_to_defaults_from_any_state() {
    let temp = TempDir::new().unwrap();
    let mut session = loaded_session(&temp, 1.0);
    session
        .set_effect_parameters(EffectParameters {
            rate: 0.3,
            pitch: -900.0,
            reverb_mix: 80.0,
            reverb_preset: ReverbPreset::Cathedral,
            low_pass_frequency: 200.0,
            filter_enabled: true,
        })
        .unwrap();
    session.select_effect(EffectPreset::SlowedReverbed);

    session.reset_to_defaults();
    let params = session.parameters();
    assert_eq!(params, EffectParameters::default());
    assert_eq!(params.reverb_preset, ReverbPreset::MediumRoom);
    assert_eq!(session.live_graph().lock().parameters(), params);
}

#[test]
fn test_selecting_effect_twice_toggles_off() {
    let temp = TempDir::new().unwrap();
    let mut session = loaded_session(&temp, 1.0);

    let applied = session.select_effect(EffectPreset::Nightcore);
    assert_eq!(applied.rate, 1.15);
    assert_eq!(session.selected_effect(), Some(EffectPreset::Nightcore));

    let toggled = session.select_effect(EffectPreset::Nightcore);
    assert_eq!(toggled, EffectParameters::default());
    assert_eq!(session.selected_effect(), None);
}

#[test]
fn test_invalid_parameters_leave_state_unchanged() {
    let temp = TempDir::new().unwrap();
    let mut session = loaded_session(&temp, 1.0);
    session.set_rate(1.25).unwrap();

    assert!(session.set_rate(2.5).is_err());
    assert!(session.set_low_pass_frequency(f32::NAN).is_err());
    assert_eq!(session.parameters().rate, 1.25);
    assert_eq!(session.parameters().low_pass_frequency, 1500.0);
}

// === Library Tests ===

#[test]
fn test_output_directory_created_once() {
    let temp = TempDir::new().unwrap();
    let config = EngineConfig::with_documents_dir(temp.path());
    let first = Session::builder(config.clone()).build().unwrap();
    let second = Session::builder(config).build().unwrap();

    first.library().ensure_output_directory().unwrap();
    assert_eq!(first.library().output_dir(), second.library().output_dir());
    let dirs = std::fs::read_dir(temp.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .count();
    assert_eq!(dirs, 1);
}

#[test]
fn test_delete_missing_path_is_noop() {
    let temp = TempDir::new().unwrap();
    assert!(!delete_if_exists(&temp.path().join("nothing.wav")));
    assert!(!delete_if_exists(&temp.path().join("nested/nothing.wav")));
}

#[test]
fn test_listing_only_shows_final_artifacts() {
    let temp = TempDir::new().unwrap();
    let session = loaded_session(&temp, 0.5);
    let dir = session.library().output_dir().to_path_buf();
    std::fs::write(dir.join("SongX_A.flac"), b"a").unwrap();
    std::fs::write(dir.join("A.wav"), b"a").unwrap();
    std::fs::write(dir.join("SongX_B.wav"), b"b").unwrap();

    assert_eq!(session.list_rendered_outputs(), vec![dir.join("SongX_A.flac")]);
    assert_eq!(
        session.open_in_files_app(&dir.join("SongX_A.flac")),
        format!("shareddocuments://{}", dir.display())
    );
}
