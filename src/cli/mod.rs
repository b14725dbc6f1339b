//! CLI Module
//!
//! Command-line front end for Song-X: render, preview and manage rendered songs.

pub mod commands;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Song-X - speed, pitch, reverb and filter editing for songs
#[derive(Parser, Debug)]
#[command(name = "songx")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Where the library lives
#[derive(Args, Debug, Clone, Default)]
pub struct LocationArgs {
    /// JSON configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Documents directory (overrides config and SONGX_DOCUMENTS_DIR)
    #[arg(long)]
    pub documents: Option<PathBuf>,
}

/// Effect settings applied on top of an optional preset
#[derive(Args, Debug, Clone, Default)]
pub struct EffectArgs {
    /// Named effect preset (e.g. nightcore, "Slowed & Reverbed")
    #[arg(long)]
    pub preset: Option<String>,

    /// Playback rate, 0.0 to 2.0
    #[arg(long)]
    pub rate: Option<f32>,

    /// Pitch shift in cents, -1200 to 1200
    #[arg(long, allow_hyphen_values = true)]
    pub pitch: Option<f32>,

    /// Reverb wet/dry mix in percent
    #[arg(long)]
    pub reverb: Option<f32>,

    /// Reverb room (e.g. medium-room, cathedral)
    #[arg(long)]
    pub reverb_preset: Option<String>,

    /// Low-pass cutoff in Hz, 0 to 6000
    #[arg(long)]
    pub frequency: Option<f32>,

    /// Enable the low-pass filter
    #[arg(long)]
    pub filter: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render a song with effects into the library
    #[command(name = "render")]
    Render {
        /// Input audio file
        input: PathBuf,

        #[command(flatten)]
        effects: EffectArgs,

        #[command(flatten)]
        location: LocationArgs,
    },

    /// List rendered songs
    #[command(name = "list")]
    List {
        #[command(flatten)]
        location: LocationArgs,
    },

    /// Show audio file information
    #[command(name = "info")]
    Info {
        /// Input audio file
        input: PathBuf,
    },

    /// List effect and reverb presets
    #[command(name = "presets")]
    Presets,

    /// Preview a song with effects, printing progress
    #[command(name = "play")]
    Play {
        /// Input audio file
        input: PathBuf,

        #[command(flatten)]
        effects: EffectArgs,

        /// Seconds to play before stopping
        #[arg(long, default_value_t = 10.0)]
        seconds: f64,

        /// Output backend: threaded, or device when built with it
        #[arg(long, default_value = "threaded")]
        output: String,

        #[command(flatten)]
        location: LocationArgs,
    },

    /// Delete a rendered song by track name
    #[command(name = "delete")]
    Delete {
        /// Track name (without prefix or extension)
        name: String,

        #[command(flatten)]
        location: LocationArgs,
    },
}
