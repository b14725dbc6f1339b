//! Time-pitch stage
//!
//! Two passes over a streaming signal:
//! 1. Overlap-add time stretch (Hann grains, 50% synthesis overlap). The
//!    analysis hop is `hop * rate / pitch`, so the stretch factor is
//!    `pitch / rate`.
//! 2. Linear-interpolation resampling with step `pitch`, which restores the
//!    duration and shifts the pitch.
//!
//! Net effect: the source is consumed at `rate` input frames per output
//! frame, and the pitch moves by `pitch` cents independently of the rate.
//!
//! Unlike the in-place [`Effect`](super::Effect) stages this one changes the
//! number of frames, so it pulls its input from a [`FrameSource`].

use crate::engine::{AudioBuffer, ChannelLayout};
use crate::params::{EffectParameters, MIN_EFFECTIVE_RATE};

/// Grain length in seconds (2048 frames at 44.1 kHz)
const GRAIN_SECONDS: f64 = 0.0465;

const MIN_GRAIN: usize = 64;

/// Anything that can fill a buffer with consecutive frames
pub trait FrameSource {
    /// Fill every frame of `out`
    fn fill(&mut self, out: &mut AudioBuffer);
}

/// Rate and pitch stage of the effect graph
#[derive(Debug, Clone)]
pub struct TimePitch {
    rate: f32,
    pitch_cents: f32,
    sample_rate: u32,
    channels: usize,
    grain: usize,
    hop: usize,
    window: Vec<f32>,

    /// Upstream frames not yet fully consumed by the analysis window
    input: Vec<Vec<f32>>,
    /// Fractional analysis position into `input`
    analysis_pos: f64,
    accumulator: Vec<Vec<f32>>,
    /// Stretched frames waiting for the resampler
    stretched: Vec<Vec<f32>>,
    /// Fractional read position into `stretched`
    resample_pos: f64,
    /// False until the first grain after a reset
    primed: bool,
    scratch: AudioBuffer,
}

impl TimePitch {
    pub fn new() -> Self {
        let mut stage = Self {
            rate: 1.0,
            pitch_cents: 0.0,
            sample_rate: 0,
            channels: 0,
            grain: 0,
            hop: 0,
            window: Vec::new(),
            input: Vec::new(),
            analysis_pos: 0.0,
            accumulator: Vec::new(),
            stretched: Vec::new(),
            resample_pos: 0.0,
            primed: false,
            scratch: AudioBuffer::default(),
        };
        stage.configure(44100, ChannelLayout::Stereo);
        stage
    }

    /// Size grains and queues for a source format; clears all history
    pub fn configure(&mut self, sample_rate: u32, layout: ChannelLayout) {
        let sample_rate = sample_rate.max(1);
        let grain = (((sample_rate as f64 * GRAIN_SECONDS) as usize).max(MIN_GRAIN)) & !1;
        let hop = grain / 2;

        self.sample_rate = sample_rate;
        self.channels = layout.num_channels();
        self.grain = grain;
        self.hop = hop;
        // periodic Hann: w[i] + w[i + hop] == 1
        self.window = (0..grain)
            .map(|i| {
                0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / grain as f64).cos()) as f32
            })
            .collect();
        self.input = vec![Vec::with_capacity(grain * 4); self.channels];
        self.accumulator = vec![vec![0.0; grain]; self.channels];
        self.stretched = vec![Vec::with_capacity(grain * 2); self.channels];
        self.scratch = AudioBuffer::new(hop, layout, sample_rate);
        self.reset();
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    pub fn pitch_cents(&self) -> f32 {
        self.pitch_cents
    }

    /// Set the playback rate (floored at [`MIN_EFFECTIVE_RATE`])
    pub fn set_rate(&mut self, rate: f32) {
        self.rate = if rate.is_finite() {
            rate.max(MIN_EFFECTIVE_RATE)
        } else {
            1.0
        };
    }

    pub fn set_pitch_cents(&mut self, cents: f32) {
        self.pitch_cents = if cents.is_finite() {
            cents.clamp(-2400.0, 2400.0)
        } else {
            0.0
        };
    }

    pub fn apply_parameters(&mut self, params: &EffectParameters) {
        self.set_rate(params.rate);
        self.set_pitch_cents(params.pitch);
    }

    /// Drop queued audio and filter history
    pub fn reset(&mut self) {
        for ch in &mut self.input {
            ch.clear();
        }
        for ch in &mut self.stretched {
            ch.clear();
        }
        for ch in &mut self.accumulator {
            ch.fill(0.0);
        }
        self.analysis_pos = 0.0;
        self.resample_pos = 0.0;
        self.primed = false;
    }

    fn pitch_ratio(&self) -> f64 {
        2.0_f64.powf(self.pitch_cents as f64 / 1200.0)
    }

    fn is_unity(&self) -> bool {
        (self.rate - 1.0).abs() < 1e-6 && self.pitch_cents.abs() < 1e-3
    }

    /// Unity settings with nothing queued: samples pass through untouched
    pub fn is_passthrough(&self) -> bool {
        self.is_unity() && !self.primed
    }

    /// Frames of upstream audio held inside the stage
    pub fn queued_input_frames(&self) -> usize {
        self.input.first().map_or(0, Vec::len)
    }

    /// Fill `out` with processed frames, pulling from `upstream` as needed
    pub fn render(&mut self, out: &mut AudioBuffer, upstream: &mut dyn FrameSource) {
        if self.is_passthrough() {
            upstream.fill(out);
            return;
        }

        let frames = out.len();
        let channels = self.channels.min(out.channels());
        let step = self.pitch_ratio();

        for i in 0..frames {
            let idx = self.resample_pos as usize;
            while self.stretched_len() < idx + 2 {
                self.synthesize_grain(upstream);
            }
            let frac = (self.resample_pos - idx as f64) as f32;
            for ch in 0..channels {
                let s = &self.stretched[ch];
                out.samples[ch][i] = s[idx] + (s[idx + 1] - s[idx]) * frac;
            }
            self.resample_pos += step;
        }
        for ch in channels..out.channels() {
            out.samples[ch].fill(0.0);
        }

        let consumed = (self.resample_pos as usize).min(self.stretched_len());
        for ch in &mut self.stretched {
            ch.drain(..consumed);
        }
        self.resample_pos -= consumed as f64;
    }

    fn stretched_len(&self) -> usize {
        self.stretched.first().map_or(0, Vec::len)
    }

    /// Overlap-add one grain and emit one synthesis hop
    fn synthesize_grain(&mut self, upstream: &mut dyn FrameSource) {
        let grain = self.grain;
        let hop = self.hop;
        let analysis_hop = hop as f64 * (self.rate as f64 / self.pitch_ratio());

        let start = self.analysis_pos as usize;
        self.ensure_input(start + grain, upstream);

        for ch in 0..self.channels {
            let input = &self.input[ch][start..start + grain];
            let acc = &mut self.accumulator[ch];
            for i in 0..grain {
                // nothing overlaps the first half of the first grain
                let w = if !self.primed && i < hop {
                    1.0
                } else {
                    self.window[i]
                };
                acc[i] += input[i] * w;
            }
            self.stretched[ch].extend_from_slice(&acc[..hop]);
            acc.copy_within(hop.., 0);
            acc[grain - hop..].fill(0.0);
        }
        self.primed = true;

        self.analysis_pos += analysis_hop;
        let drop = (self.analysis_pos as usize).min(self.queued_input_frames());
        for ch in &mut self.input {
            ch.drain(..drop);
        }
        self.analysis_pos -= drop as f64;
    }

    fn ensure_input(&mut self, needed: usize, upstream: &mut dyn FrameSource) {
        while self.queued_input_frames() < needed {
            upstream.fill(&mut self.scratch);
            for (ch, queue) in self.input.iter_mut().enumerate() {
                queue.extend_from_slice(self.scratch.channel(ch));
            }
        }
    }
}

impl Default for TimePitch {
    fn default() -> Self {
        Self::new()
    }
}
