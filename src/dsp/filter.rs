//! Low-pass filter stage
//!
//! A single resonant low-pass biquad (Audio EQ Cookbook) with a bypass flag.
//! Cutoff and bypass change between render calls without clearing history.

use std::f64::consts::PI;

use super::effect::Effect;
use crate::engine::AudioBuffer;
use crate::impl_effect_common;
use crate::params::EffectParameters;

/// Lowest cutoff the filter will run at; a 0 Hz slider value maps here
pub const MIN_CUTOFF_HZ: f32 = 20.0;

/// Butterworth Q
const DEFAULT_Q: f64 = std::f64::consts::FRAC_1_SQRT_2;

/// Biquad filter coefficients, normalized by a0
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct BiquadCoeffs {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl BiquadCoeffs {
    /// Low-pass coefficients
    /// Reference: https://www.w3.org/2011/audio/audio-eq-cookbook.html
    fn low_pass(sample_rate: f64, frequency: f64, q: f64) -> Self {
        // Clamp frequency below Nyquist
        let nyquist_guard = (sample_rate / 2.0 - 1.0).max(MIN_CUTOFF_HZ as f64);
        let freq = frequency.clamp(MIN_CUTOFF_HZ as f64, nyquist_guard);
        let q = q.clamp(0.1, 10.0);

        let w0 = 2.0 * PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * q);

        let b0 = (1.0 - cos_w0) / 2.0;
        let b1 = 1.0 - cos_w0;
        let b2 = (1.0 - cos_w0) / 2.0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;

        BiquadCoeffs {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }
}

/// Biquad state for one channel
#[derive(Debug, Clone, Copy, Default)]
struct BiquadState {
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl BiquadState {
    #[inline]
    fn process(&mut self, input: f64, coeffs: &BiquadCoeffs) -> f64 {
        let output = coeffs.b0 * input + coeffs.b1 * self.x1 + coeffs.b2 * self.x2
            - coeffs.a1 * self.y1
            - coeffs.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;

        output
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Low-pass stage of the effect graph
#[derive(Debug, Clone)]
pub struct LowPassFilter {
    frequency: f32,
    q: f64,
    bypassed: bool,
    sample_rate: u32,
    coeffs: BiquadCoeffs,
    /// One state per channel; stereo covers every layout the graph accepts
    states: [BiquadState; 2],
}

impl LowPassFilter {
    /// New filter at `frequency` Hz, bypassed until enabled
    pub fn new(frequency: f32) -> Self {
        let mut filter = Self {
            frequency,
            q: DEFAULT_Q,
            bypassed: true,
            sample_rate: 44100,
            coeffs: BiquadCoeffs::default(),
            states: [BiquadState::default(); 2],
        };
        filter.update_coefficients();
        filter
    }

    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    /// Cutoff actually used after clamping
    pub fn effective_frequency(&self) -> f32 {
        let nyquist_guard = (self.sample_rate as f32 / 2.0 - 1.0).max(MIN_CUTOFF_HZ);
        self.frequency.clamp(MIN_CUTOFF_HZ, nyquist_guard)
    }

    pub fn set_frequency(&mut self, frequency: f32) {
        let frequency = if frequency.is_finite() { frequency } else { MIN_CUTOFF_HZ };
        if frequency != self.frequency {
            self.frequency = frequency;
            self.update_coefficients();
        }
    }

    fn update_coefficients(&mut self) {
        self.coeffs =
            BiquadCoeffs::low_pass(self.sample_rate as f64, self.frequency as f64, self.q);
    }
}

impl Default for LowPassFilter {
    fn default() -> Self {
        Self::new(EffectParameters::default().low_pass_frequency)
    }
}

impl Effect for LowPassFilter {
    fn process(&mut self, buffer: &mut AudioBuffer) {
        if self.bypassed {
            return;
        }
        let coeffs = self.coeffs;
        for (channel, state) in buffer.samples.iter_mut().zip(self.states.iter_mut()) {
            for sample in channel.iter_mut() {
                *sample = state.process(*sample as f64, &coeffs) as f32;
            }
        }
    }

    fn prepare(&mut self, sample_rate: u32, _max_block_size: usize) {
        self.sample_rate = sample_rate.max(1);
        self.update_coefficients();
        self.reset();
    }

    fn reset(&mut self) {
        for state in &mut self.states {
            state.reset();
        }
    }

    fn apply_parameters(&mut self, params: &EffectParameters) {
        self.set_frequency(params.low_pass_frequency);
        self.set_bypassed(!params.filter_enabled);
    }

    impl_effect_common!("low_pass", "Low-Pass Filter");
}
