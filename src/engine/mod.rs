//! Audio Engine Module
//!
//! Everything that plays the source track live:
//! - Audio buffers, decoding and WAV writing
//! - Source tracks and security-scoped access
//! - The effect graph and its output backends
//! - Transport state machine and clock driver

pub mod buffer;
pub mod clock;
pub mod graph;
pub mod io;
pub mod output;
pub mod player;
pub mod scope;
pub mod source;
pub mod transport;

pub use buffer::{AudioBuffer, AudioFormat, ChannelLayout};
pub use clock::{ClockDriver, PlayerTime};
pub use graph::{EffectGraph, SharedGraph};
pub use io::{
    decode_file, generate_stereo_test_tone, generate_test_tone, write_wav, AudioFileWriter,
    ExportSampleFormat,
};
pub use output::{backend_by_name, ManualOutput, OutputBackend, ThreadedOutput};
pub use player::{Player, ScheduledRegion};
pub use scope::{ScopedAccess, SecurityScope, Unsandboxed};
pub use source::{track_name, SourceTrack, TrackInfo};
pub use transport::{ControlEvent, PlaybackSnapshot, Transport, TransportState};

#[cfg(feature = "device")]
pub use output::CpalOutput;
