//! DSP stages
//!
//! The processing stages of the effect graph, in signal order:
//! reverb → low-pass filter → time-pitch.

mod effect;
mod filter;
mod reverb;
mod time_pitch;

pub use effect::Effect;
pub use filter::{LowPassFilter, MIN_CUTOFF_HZ};
pub use reverb::Reverb;
pub use time_pitch::{FrameSource, TimePitch};
