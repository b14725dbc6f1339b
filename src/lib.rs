//! Song-X - Song Speed, Pitch and Reverb Editing Engine
//!
//! Song-X plays a user-picked song through a fixed effect chain and renders
//! the result to disk:
//! 1. Live preview - source player, reverb, low-pass filter and time-pitch
//!    stages pulled by an output backend, with play/pause/seek transport
//! 2. Offline render - the same chain driven faster than real time into a
//!    file, then transcoded into the library
//!
//! # Architecture
//!
//! - [`session::Session`] is the entry point; it owns every component
//! - [`engine`] holds the live graph, transport and clock
//! - [`render`] holds the offline renderer, transcoder and render jobs
//! - [`library::Library`] manages the output directory

pub mod cli;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod library;
pub mod params;
pub mod render;
pub mod session;

pub use config::EngineConfig;
pub use error::{Result, SongxError};
pub use library::{Library, LibraryEntry};
pub use params::{EffectParameters, EffectPreset, ParameterStore, ReverbPreset};
pub use render::{RenderHandle, RenderJob, RenderOutcome};
pub use session::{Session, SessionBuilder, SessionEvent};
