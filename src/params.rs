//! Effect Parameter Store
//!
//! Holds the single active set of effect values for a session. Values are
//! pure data; the session writes them through to the live graph on every
//! change, so the store and the running graph never drift apart.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SongxError};

/// Playback-rate range accepted from callers
pub const RATE_RANGE: (f32, f32) = (0.0, 2.0);
/// Pitch range in cents
pub const PITCH_RANGE: (f32, f32) = (-1200.0, 1200.0);
/// Reverb wet/dry mix range in percent
pub const REVERB_MIX_RANGE: (f32, f32) = (0.0, 100.0);
/// Low-pass cutoff range in Hz
pub const FREQUENCY_RANGE: (f32, f32) = (0.0, 6000.0);

/// Slowest rate the time-pitch stage actually runs at
///
/// A rate of 0.0 is accepted from the slider but would mean "never
/// advance"; both the live unit and the offline target length use this floor.
pub const MIN_EFFECTIVE_RATE: f32 = 1.0 / 32.0;

const RATE_SCALE: u64 = 1_000_000;

// ============================================================================
// Reverb presets
// ============================================================================

/// Factory reverb rooms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReverbPreset {
    SmallRoom,
    #[default]
    MediumRoom,
    LargeRoom,
    MediumHall,
    LargeHall,
    Plate,
    MediumChamber,
    LargeChamber,
    Cathedral,
    LargeRoom2,
    MediumHall2,
    MediumHall3,
    LargeHall2,
}

/// Room character a reverb preset loads into the reverb stage
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoomCharacter {
    /// 0 (tiny) to 1 (huge)
    pub room_size: f32,
    /// 0 (bright) to 1 (dark)
    pub damping: f32,
    /// 0 (mono) to 1 (full stereo)
    pub width: f32,
    /// Pre-delay in milliseconds
    pub pre_delay_ms: f32,
}

impl ReverbPreset {
    pub const ALL: [ReverbPreset; 13] = [
        ReverbPreset::SmallRoom,
        ReverbPreset::MediumRoom,
        ReverbPreset::LargeRoom,
        ReverbPreset::MediumHall,
        ReverbPreset::LargeHall,
        ReverbPreset::Plate,
        ReverbPreset::MediumChamber,
        ReverbPreset::LargeChamber,
        ReverbPreset::Cathedral,
        ReverbPreset::LargeRoom2,
        ReverbPreset::MediumHall2,
        ReverbPreset::MediumHall3,
        ReverbPreset::LargeHall2,
    ];

    /// Human-readable name shown in the preset picker
    pub fn display_name(&self) -> &'static str {
        match self {
            ReverbPreset::SmallRoom => "Small Room",
            ReverbPreset::MediumRoom => "Medium Room",
            ReverbPreset::LargeRoom => "Large Room",
            ReverbPreset::MediumHall => "Medium Hall",
            ReverbPreset::LargeHall => "Large Hall",
            ReverbPreset::Plate => "Plate",
            ReverbPreset::MediumChamber => "Medium Chamber",
            ReverbPreset::LargeChamber => "Large Chamber",
            ReverbPreset::Cathedral => "Cathedral",
            ReverbPreset::LargeRoom2 => "Large Room 2",
            ReverbPreset::MediumHall2 => "Medium Hall 2",
            ReverbPreset::MediumHall3 => "Medium Hall 3",
            ReverbPreset::LargeHall2 => "Large Hall 2",
        }
    }

    /// Stable identifier used by the CLI and config files
    pub fn id(&self) -> &'static str {
        match self {
            ReverbPreset::SmallRoom => "small-room",
            ReverbPreset::MediumRoom => "medium-room",
            ReverbPreset::LargeRoom => "large-room",
            ReverbPreset::MediumHall => "medium-hall",
            ReverbPreset::LargeHall => "large-hall",
            ReverbPreset::Plate => "plate",
            ReverbPreset::MediumChamber => "medium-chamber",
            ReverbPreset::LargeChamber => "large-chamber",
            ReverbPreset::Cathedral => "cathedral",
            ReverbPreset::LargeRoom2 => "large-room2",
            ReverbPreset::MediumHall2 => "medium-hall2",
            ReverbPreset::MediumHall3 => "medium-hall3",
            ReverbPreset::LargeHall2 => "large-hall2",
        }
    }

    pub fn character(&self) -> RoomCharacter {
        let (room_size, damping, width, pre_delay_ms) = match self {
            ReverbPreset::SmallRoom => (0.30, 0.60, 0.70, 2.0),
            ReverbPreset::MediumRoom => (0.50, 0.50, 0.80, 5.0),
            ReverbPreset::LargeRoom => (0.70, 0.45, 0.90, 10.0),
            ReverbPreset::MediumHall => (0.75, 0.40, 1.00, 15.0),
            ReverbPreset::LargeHall => (0.85, 0.35, 1.00, 25.0),
            ReverbPreset::Plate => (0.60, 0.20, 1.00, 0.0),
            ReverbPreset::MediumChamber => (0.65, 0.55, 0.85, 8.0),
            ReverbPreset::LargeChamber => (0.78, 0.50, 0.90, 12.0),
            ReverbPreset::Cathedral => (0.97, 0.25, 1.00, 40.0),
            ReverbPreset::LargeRoom2 => (0.72, 0.30, 0.95, 8.0),
            ReverbPreset::MediumHall2 => (0.78, 0.45, 1.00, 18.0),
            ReverbPreset::MediumHall3 => (0.80, 0.30, 1.00, 20.0),
            ReverbPreset::LargeHall2 => (0.90, 0.40, 1.00, 30.0),
        };
        RoomCharacter {
            room_size,
            damping,
            width,
            pre_delay_ms,
        }
    }
}

impl fmt::Display for ReverbPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for ReverbPreset {
    type Err = SongxError;

    fn from_str(s: &str) -> Result<Self> {
        let needle = s.trim();
        ReverbPreset::ALL
            .iter()
            .copied()
            .find(|p| p.id().eq_ignore_ascii_case(needle) || p.display_name().eq_ignore_ascii_case(needle))
            .ok_or_else(|| SongxError::UnknownPreset {
                name: s.to_string(),
            })
    }
}

// ============================================================================
// Effect parameters
// ============================================================================

/// Current effect values of a session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectParameters {
    /// Playback rate ratio, 0.0 to 2.0
    pub rate: f32,
    /// Pitch shift in cents, -1200 to 1200
    pub pitch: f32,
    /// Reverb wet/dry mix in percent, 0 to 100
    pub reverb_mix: f32,
    pub reverb_preset: ReverbPreset,
    /// Low-pass cutoff in Hz, 0 to 6000
    pub low_pass_frequency: f32,
    /// Low-pass stage is bypassed when false
    pub filter_enabled: bool,
}

impl Default for EffectParameters {
    fn default() -> Self {
        Self {
            rate: 1.0,
            pitch: 0.0,
            reverb_mix: 0.0,
            reverb_preset: ReverbPreset::MediumRoom,
            low_pass_frequency: 1500.0,
            filter_enabled: false,
        }
    }
}

fn check_range(param: &'static str, value: f32, range: (f32, f32), expected: &'static str) -> Result<()> {
    if !value.is_finite() || value < range.0 || value > range.1 {
        return Err(SongxError::InvalidParameter {
            param,
            value: value.to_string(),
            expected,
        });
    }
    Ok(())
}

impl EffectParameters {
    /// Validate all values are within their slider ranges
    pub fn validate(&self) -> Result<()> {
        check_range("rate", self.rate, RATE_RANGE, "0.0 to 2.0")?;
        check_range("pitch", self.pitch, PITCH_RANGE, "-1200 to 1200 cents")?;
        check_range("reverb_mix", self.reverb_mix, REVERB_MIX_RANGE, "0 to 100 %")?;
        check_range(
            "low_pass_frequency",
            self.low_pass_frequency,
            FREQUENCY_RANGE,
            "0 to 6000 Hz",
        )?;
        Ok(())
    }

    /// Rate the time-pitch stage runs at (never below [`MIN_EFFECTIVE_RATE`])
    pub fn effective_rate(&self) -> f32 {
        self.rate.max(MIN_EFFECTIVE_RATE)
    }

    /// Pitch as a frequency ratio
    pub fn pitch_ratio(&self) -> f32 {
        2.0_f32.powf(self.pitch / 1200.0)
    }

    /// Output length in frames when rendering `source_frames` at this rate
    ///
    /// A rate above 1 produces a shorter file, below 1 a longer one. The
    /// rate is read at millionth precision so a slider value such as 0.8
    /// divides exactly instead of through its nearest f32.
    pub fn target_length(&self, source_frames: u64) -> u64 {
        let micro_rate = (self.effective_rate() as f64 * RATE_SCALE as f64).round() as u128;
        let frames = source_frames as u128 * RATE_SCALE as u128 / micro_rate.max(1);
        frames.min(u64::MAX as u128) as u64
    }
}

// ============================================================================
// Named effect presets
// ============================================================================

/// One-tap effect presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EffectPreset {
    Nightcore,
    SlowedReverbed,
    SpedUp,
    Bathroom,
}

impl EffectPreset {
    pub const ALL: [EffectPreset; 4] = [
        EffectPreset::Nightcore,
        EffectPreset::SlowedReverbed,
        EffectPreset::SpedUp,
        EffectPreset::Bathroom,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            EffectPreset::Nightcore => "Nightcore",
            EffectPreset::SlowedReverbed => "Slowed & Reverbed",
            EffectPreset::SpedUp => "Sped Up",
            EffectPreset::Bathroom => "Bathroom Effect",
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            EffectPreset::Nightcore => "nightcore",
            EffectPreset::SlowedReverbed => "slowed-reverbed",
            EffectPreset::SpedUp => "sped-up",
            EffectPreset::Bathroom => "bathroom",
        }
    }

    /// Apply this preset on top of `base`
    ///
    /// The reverb room is not part of a preset and is carried over.
    pub fn apply(&self, base: EffectParameters) -> EffectParameters {
        let (reverb_mix, rate, pitch, low_pass_frequency) = match self {
            EffectPreset::Nightcore => (0.0, 1.15, 300.0, 5500.0),
            EffectPreset::SlowedReverbed => (15.0, 0.85, -200.0, 5500.0),
            EffectPreset::SpedUp => (15.0, 1.15, 200.0, 5500.0),
            EffectPreset::Bathroom => (0.0, 1.0, 0.0, 750.0),
        };
        EffectParameters {
            rate,
            pitch,
            reverb_mix,
            low_pass_frequency,
            filter_enabled: true,
            ..base
        }
    }
}

impl fmt::Display for EffectPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for EffectPreset {
    type Err = SongxError;

    fn from_str(s: &str) -> Result<Self> {
        let needle = s.trim();
        EffectPreset::ALL
            .iter()
            .copied()
            .find(|p| p.id().eq_ignore_ascii_case(needle) || p.display_name().eq_ignore_ascii_case(needle))
            .ok_or_else(|| SongxError::UnknownPreset {
                name: s.to_string(),
            })
    }
}

// ============================================================================
// Parameter store
// ============================================================================

/// Single active parameter set plus the "selected effect" marker
///
/// No history: every setter overwrites, `reset_to_defaults` hard-sets.
#[derive(Debug, Clone, Default)]
pub struct ParameterStore {
    current: EffectParameters,
    selected: Option<EffectPreset>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current values
    pub fn current(&self) -> EffectParameters {
        self.current
    }

    pub fn selected_effect(&self) -> Option<EffectPreset> {
        self.selected
    }

    /// Replace all values at once
    pub fn set(&mut self, params: EffectParameters) -> Result<()> {
        params.validate()?;
        self.current = params;
        Ok(())
    }

    pub fn set_rate(&mut self, rate: f32) -> Result<()> {
        self.set(EffectParameters {
            rate,
            ..self.current
        })
    }

    pub fn set_pitch(&mut self, pitch: f32) -> Result<()> {
        self.set(EffectParameters {
            pitch,
            ..self.current
        })
    }

    pub fn set_reverb_mix(&mut self, reverb_mix: f32) -> Result<()> {
        self.set(EffectParameters {
            reverb_mix,
            ..self.current
        })
    }

    pub fn set_reverb_preset(&mut self, reverb_preset: ReverbPreset) {
        self.current.reverb_preset = reverb_preset;
    }

    pub fn set_low_pass_frequency(&mut self, low_pass_frequency: f32) -> Result<()> {
        self.set(EffectParameters {
            low_pass_frequency,
            ..self.current
        })
    }

    pub fn set_filter_enabled(&mut self, filter_enabled: bool) {
        self.current.filter_enabled = filter_enabled;
    }

    /// Hard-set every value to its default and clear the selected effect
    pub fn reset_to_defaults(&mut self) {
        self.current = EffectParameters::default();
        self.selected = None;
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    /// Reset only rate, pitch and reverb mix
    ///
    /// Cutoff, filter flag and reverb room survive.
    pub fn reset_transport_values(&mut self) {
        let defaults = EffectParameters::default();
        self.current.rate = defaults.rate;
        self.current.pitch = defaults.pitch;
        self.current.reverb_mix = defaults.reverb_mix;
    }

    /// Select a named effect, or deselect it when it is already selected
    ///
    /// Selecting the same effect twice in a row returns every value to its
    /// default and clears the marker.
    pub fn select_effect(&mut self, preset: EffectPreset) -> EffectParameters {
        if self.selected == Some(preset) {
            self.reset_to_defaults();
        } else {
            self.selected = Some(preset);
            self.current = preset.apply(self.current);
        }
        self.current
    }
}
