//! Effect graph
//!
//! Fixed chain: player → reverb → low-pass filter → time-pitch → output.
//! The same type backs the live preview and the offline renderer; each owns
//! its own instance and they never share one.
//!
//! Rendering is pull-based: the output asks the time-pitch stage for frames,
//! which pulls as many source frames as the current rate needs through the
//! player, reverb and filter.

use std::sync::Arc;

use crossbeam_channel::Sender;
use log::{debug, info};
use parking_lot::Mutex;

use crate::dsp::{Effect, FrameSource, LowPassFilter, Reverb, TimePitch};
use crate::engine::buffer::{AudioBuffer, AudioFormat};
use crate::engine::player::Player;
use crate::engine::transport::ControlEvent;
use crate::error::{Result, SongxError};
use crate::params::EffectParameters;

/// Live graph shared between the control thread and the output's pull thread
pub type SharedGraph = Arc<Mutex<EffectGraph>>;

/// Stages ahead of the time-pitch unit, exposed as its input
struct Upstream<'a> {
    player: &'a mut Player,
    reverb: &'a mut Reverb,
    filter: &'a mut LowPassFilter,
}

impl FrameSource for Upstream<'_> {
    fn fill(&mut self, out: &mut AudioBuffer) {
        self.player.render(out);
        self.reverb.process(out);
        self.filter.process(out);
    }
}

#[derive(Debug)]
pub struct EffectGraph {
    format: Option<AudioFormat>,
    max_block_size: usize,
    running: bool,
    params: EffectParameters,
    player: Player,
    reverb: Reverb,
    filter: LowPassFilter,
    time_pitch: TimePitch,
}

impl Default for EffectGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl EffectGraph {
    pub fn new() -> Self {
        let params = EffectParameters::default();
        let mut graph = Self {
            format: None,
            max_block_size: 4096,
            running: false,
            params,
            player: Player::new(),
            reverb: Reverb::new(),
            filter: LowPassFilter::default(),
            time_pitch: TimePitch::new(),
        };
        graph.push_parameters(&params);
        graph
    }

    pub fn into_shared(self) -> SharedGraph {
        Arc::new(Mutex::new(self))
    }

    /// Wire every stage for `format`
    ///
    /// The topology never changes; configuring again only re-prepares stages.
    pub fn configure(&mut self, format: AudioFormat, max_block_size: usize) {
        self.stop();
        self.format = Some(format);
        self.max_block_size = max_block_size.max(1);
        self.reverb.prepare(format.sample_rate, self.max_block_size);
        self.filter.prepare(format.sample_rate, self.max_block_size);
        self.time_pitch.configure(format.sample_rate, format.layout);
        let params = self.params;
        self.push_parameters(&params);
        debug!(
            "Graph configured: {} Hz, {} ch, block {}",
            format.sample_rate,
            format.channels(),
            self.max_block_size
        );
    }

    pub fn format(&self) -> Option<AudioFormat> {
        self.format
    }

    pub fn is_configured(&self) -> bool {
        self.format.is_some()
    }

    /// Activate the graph
    ///
    /// # Errors
    /// `EngineNotConfigured` if `configure` was never called.
    pub fn start(&mut self) -> Result<()> {
        if self.format.is_none() {
            return Err(SongxError::EngineNotConfigured);
        }
        if !self.running {
            self.running = true;
            info!("Effect graph started");
        }
        Ok(())
    }

    /// Deactivate, stop the player and clear all stage history
    pub fn stop(&mut self) {
        self.player.stop();
        self.reset_stages();
        if self.running {
            self.running = false;
            info!("Effect graph stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Push effect values into the running stages without rewiring
    pub fn push_parameters(&mut self, params: &EffectParameters) {
        self.params = *params;
        self.reverb.apply_parameters(params);
        self.filter.apply_parameters(params);
        self.time_pitch.apply_parameters(params);
    }

    pub fn parameters(&self) -> EffectParameters {
        self.params
    }

    pub fn player(&self) -> &Player {
        &self.player
    }

    pub fn player_mut(&mut self) -> &mut Player {
        &mut self.player
    }

    pub fn set_completion_sender(&mut self, sender: Sender<ControlEvent>) {
        self.player.set_completion_sender(sender);
    }

    /// Player sample time, or `None` while the graph is not running
    pub fn player_sample_time(&self) -> Option<u64> {
        self.running.then(|| self.player.sample_time())
    }

    /// Clear stage history, e.g. before playing from a new position
    pub fn reset_stages(&mut self) {
        self.reverb.reset();
        self.filter.reset();
        self.time_pitch.reset();
    }

    /// Pull `out.len()` processed frames; silence while stopped
    pub fn render(&mut self, out: &mut AudioBuffer) {
        if !self.running {
            out.silence();
            return;
        }
        let mut upstream = Upstream {
            player: &mut self.player,
            reverb: &mut self.reverb,
            filter: &mut self.filter,
        };
        self.time_pitch.render(out, &mut upstream);
    }
}
