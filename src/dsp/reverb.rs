//! Reverb stage
//!
//! Freeverb network:
//! - 8 parallel comb filters for early reflections
//! - 4 series allpass filters for diffusion
//! - Stereo width control
//! - Pre-delay buffer
//!
//! The room character comes from a [`ReverbPreset`]; the amount of reverb is
//! a wet/dry percentage where 0 leaves the signal untouched.

use super::effect::Effect;
use crate::engine::AudioBuffer;
use crate::impl_effect_common;
use crate::params::{EffectParameters, ReverbPreset, RoomCharacter};

// ============================================================================
// Freeverb Constants
// ============================================================================

/// Reference sample rate for Freeverb delays
const REFERENCE_SAMPLE_RATE: f64 = 44100.0;

/// Comb filter delays at 44100 Hz (8 filters)
const COMB_DELAYS: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];

/// Allpass filter delays at 44100 Hz (4 filters)
const ALLPASS_DELAYS: [usize; 4] = [556, 441, 341, 225];

/// Stereo spread offset in samples (for right channel)
const STEREO_SPREAD: usize = 23;

const ALLPASS_GAIN: f32 = 0.5;

/// Room size to comb feedback mapping
const ROOM_SCALE: f32 = 0.28;
const ROOM_OFFSET: f32 = 0.7;

const DAMP_SCALE: f32 = 0.4;

/// Input attenuation before the comb bank
const FIXED_GAIN: f32 = 0.015;

/// Makeup gain on the wet path
const WET_SCALE: f32 = 3.0;

/// Upper bound of any preset's pre-delay
const MAX_PRE_DELAY_MS: f32 = 100.0;

// ============================================================================
// Filter Components
// ============================================================================

/// Low-pass feedback comb filter
#[derive(Debug, Clone)]
struct CombFilter {
    buffer: Vec<f32>,
    write_pos: usize,
    mask: usize,
    filter_state: f32,
    feedback: f32,
    damp1: f32,
    damp2: f32,
}

impl CombFilter {
    fn new(delay_size: usize) -> Self {
        let size = delay_size.next_power_of_two();
        Self {
            buffer: vec![0.0; size],
            write_pos: 0,
            mask: size - 1,
            filter_state: 0.0,
            feedback: 0.5,
            damp1: 0.5,
            damp2: 0.5,
        }
    }

    fn set_coefficients(&mut self, feedback: f32, damp1: f32, damp2: f32) {
        self.feedback = feedback;
        self.damp1 = damp1;
        self.damp2 = damp2;
    }

    #[inline]
    fn process(&mut self, input: f32, delay: usize) -> f32 {
        let read_pos = (self.write_pos + self.mask + 1 - delay) & self.mask;
        let output = self.buffer[read_pos];

        // one-pole low-pass in the feedback path
        self.filter_state = output * self.damp1 + self.filter_state * self.damp2;
        self.buffer[self.write_pos] = input + self.filter_state * self.feedback;
        self.write_pos = (self.write_pos + 1) & self.mask;

        output
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.filter_state = 0.0;
        self.write_pos = 0;
    }
}

/// Schroeder allpass used for diffusion
#[derive(Debug, Clone)]
struct AllpassFilter {
    buffer: Vec<f32>,
    write_pos: usize,
    mask: usize,
}

impl AllpassFilter {
    fn new(delay_size: usize) -> Self {
        let size = delay_size.next_power_of_two();
        Self {
            buffer: vec![0.0; size],
            write_pos: 0,
            mask: size - 1,
        }
    }

    #[inline]
    fn process(&mut self, input: f32, delay: usize) -> f32 {
        let read_pos = (self.write_pos + self.mask + 1 - delay) & self.mask;
        let delayed = self.buffer[read_pos];

        let output = delayed - ALLPASS_GAIN * input;
        self.buffer[self.write_pos] = input + ALLPASS_GAIN * output;
        self.write_pos = (self.write_pos + 1) & self.mask;

        output
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

#[derive(Debug, Clone)]
struct PreDelayBuffer {
    buffer: Vec<f32>,
    write_pos: usize,
    mask: usize,
}

impl PreDelayBuffer {
    fn new(max_size: usize) -> Self {
        let size = max_size.next_power_of_two();
        Self {
            buffer: vec![0.0; size],
            write_pos: 0,
            mask: size - 1,
        }
    }

    #[inline]
    fn process(&mut self, input: f32, delay_samples: usize) -> f32 {
        self.buffer[self.write_pos] = input;
        let read_pos = (self.write_pos + self.mask + 1 - delay_samples) & self.mask;
        let output = self.buffer[read_pos];
        self.write_pos = (self.write_pos + 1) & self.mask;
        output
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

// ============================================================================
// Reverb stage
// ============================================================================

/// Freeverb-based reverb with factory rooms and a percentage wet/dry mix
#[derive(Debug, Clone)]
pub struct Reverb {
    preset: ReverbPreset,
    character: RoomCharacter,
    /// Wet/dry mix, 0 to 100 percent
    wet_dry_mix: f32,
    bypassed: bool,
    sample_rate: f64,

    comb_left: [CombFilter; 8],
    allpass_left: [AllpassFilter; 4],
    comb_right: [CombFilter; 8],
    allpass_right: [AllpassFilter; 4],
    pre_delay_left: PreDelayBuffer,
    pre_delay_right: PreDelayBuffer,

    scaled_comb_delays_left: [usize; 8],
    scaled_comb_delays_right: [usize; 8],
    scaled_allpass_delays_left: [usize; 4],
    scaled_allpass_delays_right: [usize; 4],
    pre_delay_samples: usize,
}

impl Reverb {
    pub fn new() -> Self {
        Self::with_preset(ReverbPreset::default())
    }

    pub fn with_preset(preset: ReverbPreset) -> Self {
        let mut reverb = Self {
            preset,
            character: preset.character(),
            wet_dry_mix: 0.0,
            bypassed: false,
            sample_rate: REFERENCE_SAMPLE_RATE,
            comb_left: std::array::from_fn(|i| CombFilter::new(COMB_DELAYS[i] + 1)),
            allpass_left: std::array::from_fn(|i| AllpassFilter::new(ALLPASS_DELAYS[i] + 1)),
            comb_right: std::array::from_fn(|i| CombFilter::new(COMB_DELAYS[i] + STEREO_SPREAD + 1)),
            allpass_right: std::array::from_fn(|i| {
                AllpassFilter::new(ALLPASS_DELAYS[i] + STEREO_SPREAD + 1)
            }),
            pre_delay_left: PreDelayBuffer::new(1),
            pre_delay_right: PreDelayBuffer::new(1),
            scaled_comb_delays_left: COMB_DELAYS,
            scaled_comb_delays_right: std::array::from_fn(|i| COMB_DELAYS[i] + STEREO_SPREAD),
            scaled_allpass_delays_left: ALLPASS_DELAYS,
            scaled_allpass_delays_right: std::array::from_fn(|i| ALLPASS_DELAYS[i] + STEREO_SPREAD),
            pre_delay_samples: 0,
        };
        reverb.resize_buffers();
        reverb.scale_delays();
        reverb.update_pre_delay();
        reverb
    }

    pub fn preset(&self) -> ReverbPreset {
        self.preset
    }

    pub fn wet_dry_mix(&self) -> f32 {
        self.wet_dry_mix
    }

    /// Load a factory room, keeping the tail already in the delay lines
    pub fn load_preset(&mut self, preset: ReverbPreset) {
        if preset == self.preset {
            return;
        }
        self.preset = preset;
        self.character = preset.character();
        self.update_coefficients();
        self.update_pre_delay();
    }

    /// Set the wet/dry mix in percent (clamped to 0..=100)
    pub fn set_wet_dry_mix(&mut self, percent: f32) {
        self.wet_dry_mix = if percent.is_finite() {
            percent.clamp(0.0, 100.0)
        } else {
            0.0
        };
    }

    fn update_coefficients(&mut self) {
        let feedback = self.character.room_size * ROOM_SCALE + ROOM_OFFSET;
        let damp2 = self.character.damping * DAMP_SCALE;
        let damp1 = 1.0 - damp2;

        for comb in self.comb_left.iter_mut().chain(self.comb_right.iter_mut()) {
            comb.set_coefficients(feedback, damp1, damp2);
        }
    }

    fn update_pre_delay(&mut self) {
        let ms = self.character.pre_delay_ms.min(MAX_PRE_DELAY_MS);
        self.pre_delay_samples = ((ms / 1000.0) * self.sample_rate as f32) as usize;
    }

    fn scale_delays(&mut self) {
        let scale = self.sample_rate / REFERENCE_SAMPLE_RATE;

        for i in 0..8 {
            self.scaled_comb_delays_left[i] = ((COMB_DELAYS[i] as f64 * scale) as usize).max(1);
            self.scaled_comb_delays_right[i] =
                (((COMB_DELAYS[i] + STEREO_SPREAD) as f64 * scale) as usize).max(1);
        }
        for i in 0..4 {
            self.scaled_allpass_delays_left[i] =
                ((ALLPASS_DELAYS[i] as f64 * scale) as usize).max(1);
            self.scaled_allpass_delays_right[i] =
                (((ALLPASS_DELAYS[i] + STEREO_SPREAD) as f64 * scale) as usize).max(1);
        }
    }

    fn resize_buffers(&mut self) {
        let scale = self.sample_rate / REFERENCE_SAMPLE_RATE;

        for i in 0..8 {
            let left = ((COMB_DELAYS[i] as f64 * scale) as usize + 1).max(16);
            let right = (((COMB_DELAYS[i] + STEREO_SPREAD) as f64 * scale) as usize + 1).max(16);
            self.comb_left[i] = CombFilter::new(left);
            self.comb_right[i] = CombFilter::new(right);
        }
        for i in 0..4 {
            let left = ((ALLPASS_DELAYS[i] as f64 * scale) as usize + 1).max(16);
            let right =
                (((ALLPASS_DELAYS[i] + STEREO_SPREAD) as f64 * scale) as usize + 1).max(16);
            self.allpass_left[i] = AllpassFilter::new(left);
            self.allpass_right[i] = AllpassFilter::new(right);
        }

        let max_pre_delay = ((MAX_PRE_DELAY_MS / 1000.0) * self.sample_rate as f32) as usize + 1;
        self.pre_delay_left = PreDelayBuffer::new(max_pre_delay);
        self.pre_delay_right = PreDelayBuffer::new(max_pre_delay);

        self.update_coefficients();
    }

    #[inline]
    fn wet_left(&mut self, input: f32) -> f32 {
        let delayed = if self.pre_delay_samples > 0 {
            self.pre_delay_left.process(input, self.pre_delay_samples)
        } else {
            input
        };
        let mut sum = 0.0;
        for j in 0..8 {
            sum += self.comb_left[j].process(delayed, self.scaled_comb_delays_left[j]);
        }
        for j in 0..4 {
            sum = self.allpass_left[j].process(sum, self.scaled_allpass_delays_left[j]);
        }
        sum
    }

    #[inline]
    fn wet_right(&mut self, input: f32) -> f32 {
        let delayed = if self.pre_delay_samples > 0 {
            self.pre_delay_right.process(input, self.pre_delay_samples)
        } else {
            input
        };
        let mut sum = 0.0;
        for j in 0..8 {
            sum += self.comb_right[j].process(delayed, self.scaled_comb_delays_right[j]);
        }
        for j in 0..4 {
            sum = self.allpass_right[j].process(sum, self.scaled_allpass_delays_right[j]);
        }
        sum
    }

    fn process_mono(&mut self, samples: &mut [f32], mix: f32) {
        let dry = 1.0 - mix;
        for sample in samples.iter_mut() {
            let input = *sample;
            let wet = self.wet_left(input * FIXED_GAIN) * WET_SCALE;
            *sample = input * dry + wet * mix;
        }
    }

    fn process_stereo(&mut self, left: &mut [f32], right: &mut [f32], mix: f32) {
        let dry = 1.0 - mix;
        let width = self.character.width;
        // width=0 gives both sides the mono sum, width=1 full separation
        let wet1 = mix * WET_SCALE * (1.0 + width) / 2.0;
        let wet2 = mix * WET_SCALE * (1.0 - width) / 2.0;

        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let input_left = *l;
            let input_right = *r;
            let feed = (input_left + input_right) * 0.5 * FIXED_GAIN;

            let out_left = self.wet_left(feed);
            let out_right = self.wet_right(feed);

            *l = input_left * dry + out_left * wet1 + out_right * wet2;
            *r = input_right * dry + out_right * wet1 + out_left * wet2;
        }
    }
}

impl Default for Reverb {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for Reverb {
    fn process(&mut self, buffer: &mut AudioBuffer) {
        // A zero mix is an exact passthrough
        if self.bypassed || self.wet_dry_mix <= 0.0 {
            return;
        }
        let mix = self.wet_dry_mix / 100.0;

        match buffer.samples.as_mut_slice() {
            [] => {}
            [mono] => self.process_mono(mono, mix),
            [left, right, ..] => self.process_stereo(left, right, mix),
        }
    }

    fn prepare(&mut self, sample_rate: u32, _max_block_size: usize) {
        self.sample_rate = sample_rate.max(1) as f64;
        self.resize_buffers();
        self.scale_delays();
        self.update_pre_delay();
    }

    fn reset(&mut self) {
        for comb in self.comb_left.iter_mut().chain(self.comb_right.iter_mut()) {
            comb.clear();
        }
        for allpass in self.allpass_left.iter_mut().chain(self.allpass_right.iter_mut()) {
            allpass.clear();
        }
        self.pre_delay_left.clear();
        self.pre_delay_right.clear();
    }

    fn apply_parameters(&mut self, params: &EffectParameters) {
        self.load_preset(params.reverb_preset);
        self.set_wet_dry_mix(params.reverb_mix);
    }

    impl_effect_common!("reverb", "Reverb");
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ChannelLayout;

    fn impulse(layout: ChannelLayout, len: usize) -> AudioBuffer {
        let mut buffer = AudioBuffer::new(len, layout, 44100);
        for ch in 0..buffer.channels() {
            buffer.channel_mut(ch)[0] = 1.0;
        }
        buffer
    }

    #[test]
    fn test_zero_mix_is_passthrough() {
        let mut reverb = Reverb::new();
        reverb.prepare(44100, 512);

        let mut buffer = impulse(ChannelLayout::Stereo, 4410);
        let original = buffer.clone();
        reverb.process(&mut buffer);

        assert_eq!(buffer, original);
    }

    #[test]
    fn test_reverb_produces_tail() {
        let mut reverb = Reverb::new();
        reverb.prepare(44100, 512);
        reverb.set_wet_dry_mix(50.0);

        let mut buffer = impulse(ChannelLayout::Stereo, 44100);
        reverb.process(&mut buffer);

        // After the impulse the tail should have energy
        let tail_energy: f32 = buffer.channel(0)[2000..].iter().map(|s| s * s).sum();
        assert!(tail_energy > 0.0, "Reverb should produce a tail");
        assert!(buffer.is_finite());
    }

    #[test]
    fn test_full_wet_removes_dry() {
        let mut reverb = Reverb::new();
        reverb.prepare(44100, 512);
        reverb.set_wet_dry_mix(100.0);

        let mut buffer = impulse(ChannelLayout::Mono, 64);
        reverb.process(&mut buffer);

        // The shortest comb delay is far longer than 64 samples
        assert_eq!(buffer.channel(0)[0], 0.0);
    }

    #[test]
    fn test_mix_is_clamped() {
        let mut reverb = Reverb::new();
        reverb.set_wet_dry_mix(150.0);
        assert_eq!(reverb.wet_dry_mix(), 100.0);
        reverb.set_wet_dry_mix(f32::NAN);
        assert_eq!(reverb.wet_dry_mix(), 0.0);
    }

    #[test]
    fn test_reset_clears_tail() {
        let mut reverb = Reverb::new();
        reverb.prepare(44100, 512);
        reverb.set_wet_dry_mix(100.0);

        let mut buffer = impulse(ChannelLayout::Stereo, 4410);
        reverb.process(&mut buffer);
        reverb.reset();

        let mut silence = AudioBuffer::new(4410, ChannelLayout::Stereo, 44100);
        reverb.process(&mut silence);
        assert!(silence.channel(0).iter().all(|s| *s == 0.0));
        assert!(silence.channel(1).iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_apply_parameters_loads_preset() {
        let mut reverb = Reverb::new();
        let params = EffectParameters {
            reverb_mix: 30.0,
            reverb_preset: ReverbPreset::Cathedral,
            ..Default::default()
        };
        reverb.apply_parameters(&params);
        assert_eq!(reverb.preset(), ReverbPreset::Cathedral);
        assert_eq!(reverb.wet_dry_mix(), 30.0);
    }

    #[test]
    fn test_bigger_room_rings_longer() {
        let tail = |preset: ReverbPreset| {
            let mut reverb = Reverb::with_preset(preset);
            reverb.prepare(44100, 512);
            reverb.set_wet_dry_mix(100.0);
            let mut buffer = impulse(ChannelLayout::Mono, 88200);
            reverb.process(&mut buffer);
            buffer.channel(0)[44100..].iter().map(|s| s * s).sum::<f32>()
        };
        assert!(tail(ReverbPreset::Cathedral) > tail(ReverbPreset::SmallRoom));
    }
}
