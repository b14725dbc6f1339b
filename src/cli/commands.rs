//! CLI Command Implementations
//!
//! Each command builds its own session from the resolved configuration.

use std::path::Path;
use std::time::{Duration, Instant};

use log::{info, warn};

use crate::cli::{EffectArgs, LocationArgs};
use crate::config::EngineConfig;
use crate::engine::clock::PlayerTime;
use crate::engine::io::decode_file;
use crate::engine::output::backend_by_name;
use crate::engine::transport::TransportState;
use crate::error::Result;
use crate::params::{EffectPreset, ReverbPreset};
use crate::session::Session;

/// Resolve configuration: file (or defaults), environment, then flags
pub fn resolve_config(location: &LocationArgs) -> Result<EngineConfig> {
    let mut config = EngineConfig::load_or_default(location.config.as_deref()).with_env_overrides();
    if let Some(documents) = &location.documents {
        config.documents_dir = documents.clone();
    }
    config.validate()?;
    Ok(config)
}

/// Apply a preset and then any explicit overrides
fn apply_effects(session: &mut Session, effects: &EffectArgs) -> Result<()> {
    if let Some(name) = &effects.preset {
        let preset: EffectPreset = name.parse()?;
        session.select_effect(preset);
        info!("Applied effect preset {}", preset);
    }
    if let Some(name) = &effects.reverb_preset {
        let preset: ReverbPreset = name.parse()?;
        session.set_reverb_preset(preset);
    }
    if let Some(rate) = effects.rate {
        session.set_rate(rate)?;
    }
    if let Some(pitch) = effects.pitch {
        session.set_pitch(pitch)?;
    }
    if let Some(mix) = effects.reverb {
        session.set_reverb_mix(mix)?;
    }
    if let Some(frequency) = effects.frequency {
        session.set_low_pass_frequency(frequency)?;
    }
    if effects.filter {
        session.set_filter_enabled(true);
    }
    Ok(())
}

/// Render `input` into the library.
pub fn render(input: &Path, effects: &EffectArgs, location: &LocationArgs) -> Result<()> {
    let config = resolve_config(location)?;
    let mut session = Session::builder(config).build()?;
    session.pick_source(input)?;
    apply_effects(&mut session, effects)?;

    let params = session.parameters();
    println!(
        "Rendering {} (rate {:.2}, pitch {:+.0} cents, reverb {:.0}%)",
        input.display(),
        params.rate,
        params.pitch,
        params.reverb_mix
    );

    let started = Instant::now();
    let outcome = session.render_and_export()?.wait()?;

    println!("Saved: {}", outcome.final_path.display());
    println!(
        "Length: {} ({} frames) in {:.1}s",
        PlayerTime::new(outcome.duration_secs(), 0.0).elapsed_text(),
        outcome.frames,
        started.elapsed().as_secs_f64()
    );
    Ok(())
}

/// List rendered songs.
pub fn list(location: &LocationArgs) -> Result<()> {
    let config = resolve_config(location)?;
    let session = Session::builder(config).build()?;
    let entries = session.list_library();

    if entries.is_empty() {
        println!("No rendered songs in {}", session.library().output_dir().display());
        return Ok(());
    }

    println!("Rendered songs in {}:", session.library().output_dir().display());
    println!("{:-<60}", "");
    for entry in entries {
        println!(
            "{:<30} {:>10} KB  {}",
            entry.track_name,
            entry.size_bytes / 1024,
            entry.modified.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

/// Show audio file information.
pub fn show_info(input: &Path) -> Result<()> {
    info!("Reading audio info: {}", input.display());
    let audio = decode_file(input)?;

    println!("File: {}", input.display());
    println!("Sample rate: {} Hz", audio.sample_rate);
    println!("Channels: {}", audio.channels());
    println!("Frames: {}", audio.len());
    println!(
        "Duration: {} ({:.2}s)",
        PlayerTime::new(audio.duration_secs(), 0.0).elapsed_text(),
        audio.duration_secs()
    );
    Ok(())
}

/// List effect and reverb presets.
pub fn show_presets() -> Result<()> {
    println!("Effect presets:");
    for preset in EffectPreset::ALL {
        let p = preset.apply(Default::default());
        println!(
            "  {:<20} {:<18} rate {:.2}  pitch {:+5.0}  reverb {:>3.0}%  cutoff {:>5.0} Hz",
            preset.id(),
            preset.display_name(),
            p.rate,
            p.pitch,
            p.reverb_mix,
            p.low_pass_frequency
        );
    }
    println!();
    println!("Reverb presets:");
    for preset in ReverbPreset::ALL {
        println!("  {:<20} {}", preset.id(), preset.display_name());
    }
    Ok(())
}

/// Preview a song, printing progress until it ends or `seconds` pass.
pub fn play(
    input: &Path,
    effects: &EffectArgs,
    seconds: f64,
    output: &str,
    location: &LocationArgs,
) -> Result<()> {
    let config = resolve_config(location)?;
    let backend = backend_by_name(output, config.block_frames)?;
    let tick = Duration::from_millis(config.tick_interval_ms);
    let mut session = Session::builder(config)
        .output(backend)
        .threaded_clock(true)
        .build()?;

    let track = session.pick_source(input)?;
    apply_effects(&mut session, effects)?;
    println!("Playing {} through {} output", track.name, output);

    session.play_or_pause()?;
    let deadline = Instant::now() + Duration::from_secs_f64(seconds.max(0.0));
    let mut last_print = Instant::now();

    while Instant::now() < deadline {
        std::thread::sleep(tick);
        session.pump();
        let snapshot = session.snapshot();
        if last_print.elapsed() >= Duration::from_millis(500) {
            println!(
                "{} / -{}  [{:>5.1}%]",
                snapshot.time.elapsed_text(),
                snapshot.time.remaining_text(),
                snapshot.progress * 100.0
            );
            last_print = Instant::now();
        }
        if snapshot.state == TransportState::Finished {
            println!("Finished");
            break;
        }
    }

    if session.is_playing() {
        session.play_or_pause()?;
    }
    session.close();
    Ok(())
}

/// Delete a rendered song.
pub fn delete(name: &str, location: &LocationArgs) -> Result<()> {
    let config = resolve_config(location)?;
    let session = Session::builder(config).build()?;
    let path = session.library().final_output_path(name);

    if session.library().delete_output(name) {
        println!("Deleted: {}", path.display());
    } else {
        warn!("No rendered song named {}", name);
        println!("Nothing to delete at {}", path.display());
    }
    Ok(())
}
