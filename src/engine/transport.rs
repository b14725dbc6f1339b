//! Transport Controller
//!
//! Play/pause/seek/skip state machine driving the live graph's player and the
//! clock driver together.
//!
//! Position model: the player reports a sample time counted from its last
//! stop; `seek_frame` is where that stop left the playhead. The position is
//! `seek_frame + sample_time`, clamped to `[0, total_frames]`. Every seek
//! stops the player before scheduling the remainder of the file, so only one
//! scheduled region is ever live, and its completion is matched by
//! generation.

use std::fmt;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::engine::clock::{ClockDriver, PlayerTime};
use crate::engine::graph::EffectGraph;

/// Notifications delivered to the control thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// Clock driver period elapsed
    Tick,
    /// The player exhausted the region scheduled with `generation`
    ScheduleCompleted { generation: u64 },
}

/// Transport states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransportState {
    /// No region scheduled (also the state without a source)
    #[default]
    Idle,
    /// A region is scheduled and the player is not running
    Scheduled,
    Playing,
    Paused,
    /// Playback ran to the end of the file
    Finished,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportState::Idle => write!(f, "Idle"),
            TransportState::Scheduled => write!(f, "Scheduled"),
            TransportState::Playing => write!(f, "Playing"),
            TransportState::Paused => write!(f, "Paused"),
            TransportState::Finished => write!(f, "Finished"),
        }
    }
}

/// Published playback state, derived on every tick
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PlaybackSnapshot {
    pub state: TransportState,
    pub is_playing: bool,
    /// Clamped position in source frames
    pub current_frame: u64,
    /// Frame the player was last started from
    pub seek_frame: u64,
    pub total_frames: u64,
    pub sample_rate: u32,
    /// `current_frame / total_frames`, in `[0, 1]`
    pub progress: f64,
    pub time: PlayerTime,
}

/// Transport for the currently loaded source
#[derive(Debug, Clone, Default)]
pub struct Transport {
    state: TransportState,
    loaded: bool,
    total_frames: u64,
    sample_rate: u32,
    seek_frame: u64,
    current_position: u64,
    needs_file_scheduled: bool,
    scheduled_generation: Option<u64>,
}

impl Transport {
    pub fn new() -> Self {
        Self {
            needs_file_scheduled: true,
            ..Self::default()
        }
    }

    /// Take over a freshly attached source of `total_frames` at `sample_rate`
    pub fn load(&mut self, total_frames: u64, sample_rate: u32) {
        *self = Self {
            loaded: true,
            total_frames,
            sample_rate,
            ..Self::new()
        };
    }

    /// Forget the source; transport operations become no-ops
    pub fn unload(&mut self) {
        *self = Self::new();
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    pub fn current_position(&self) -> u64 {
        self.current_position
    }

    pub fn seek_frame(&self) -> u64 {
        self.seek_frame
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn needs_file_scheduled(&self) -> bool {
        self.needs_file_scheduled
    }

    /// Schedule the whole file from the start if nothing valid is scheduled
    pub fn schedule_file(&mut self, graph: &mut EffectGraph) {
        if !self.loaded || !self.needs_file_scheduled {
            return;
        }
        self.needs_file_scheduled = false;
        self.seek_frame = 0;
        let generation = graph.player_mut().schedule_segment(0, self.total_frames);
        self.scheduled_generation = Some(generation);
        if matches!(self.state, TransportState::Idle | TransportState::Finished) {
            self.state = TransportState::Scheduled;
        }
        debug!("Scheduled file, generation {}", generation);
    }

    /// Toggle between playing and paused
    pub fn play_or_pause(&mut self, graph: &mut EffectGraph, clock: &ClockDriver) {
        if !self.loaded {
            return;
        }
        if self.state == TransportState::Playing {
            clock.pause();
            graph.player_mut().pause();
            self.state = TransportState::Paused;
        } else {
            self.schedule_file(graph);
            clock.resume();
            graph.player_mut().play();
            self.state = TransportState::Playing;
        }
        debug!("Transport {}", self.state);
    }

    /// Move the playhead by `delta_secs`
    pub fn seek(&mut self, delta_secs: f64, graph: &mut EffectGraph, clock: &ClockDriver) {
        if !self.loaded || !delta_secs.is_finite() {
            return;
        }
        // The last tick may be a full period old while the player has run on.
        self.current_position = self.sampled_position(graph);
        let offset = (delta_secs * self.sample_rate as f64) as i64;
        let target = self.current_position as i64 + offset;
        self.seek_to_frame(target, graph, clock);
    }

    /// Jump to an absolute fraction of the track
    pub fn scrub(&mut self, fraction: f64, graph: &mut EffectGraph, clock: &ClockDriver) {
        if !self.loaded || !fraction.is_finite() {
            return;
        }
        let target = (fraction.clamp(0.0, 1.0) * self.total_frames as f64) as i64;
        self.seek_to_frame(target, graph, clock);
    }

    fn seek_to_frame(&mut self, target: i64, graph: &mut EffectGraph, clock: &ClockDriver) {
        self.seek_frame = target.clamp(0, self.total_frames as i64) as u64;
        self.current_position = self.seek_frame;

        let was_playing = graph.player().is_playing();
        graph.player_mut().stop();
        graph.reset_stages();

        if self.current_position < self.total_frames {
            self.needs_file_scheduled = false;
            let frame_count = self.total_frames - self.seek_frame;
            let generation = graph
                .player_mut()
                .schedule_segment(self.seek_frame, frame_count);
            self.scheduled_generation = Some(generation);
            self.update_display(graph, clock);

            if was_playing {
                graph.player_mut().play();
                self.state = TransportState::Playing;
            } else {
                self.state = TransportState::Scheduled;
            }
            debug!(
                "Seeked to frame {} ({} frames scheduled)",
                self.seek_frame, frame_count
            );
        } else {
            // Landing on the end schedules nothing; a playing transport is
            // finished by the next tick, an idle one is finished now.
            self.needs_file_scheduled = true;
            self.scheduled_generation = None;
            if !was_playing && self.state != TransportState::Playing {
                self.state = TransportState::Finished;
            }
            debug!("Seek reached end of file, nothing scheduled");
        }
    }

    /// Sample the graph position; drives the Finished transition at the end
    pub fn update_display(&mut self, graph: &mut EffectGraph, clock: &ClockDriver) -> PlaybackSnapshot {
        if !self.loaded {
            return self.snapshot();
        }
        self.current_position = self.sampled_position(graph);

        if self.current_position >= self.total_frames {
            graph.player_mut().stop();
            graph.reset_stages();
            self.seek_frame = 0;
            self.current_position = 0;
            self.needs_file_scheduled = true;
            self.scheduled_generation = None;
            self.state = TransportState::Finished;
            clock.pause();
            info!("Playback finished");
        }
        self.snapshot()
    }

    fn sampled_position(&self, graph: &EffectGraph) -> u64 {
        let played = graph.player_sample_time().unwrap_or(0);
        (self.seek_frame + played).min(self.total_frames)
    }

    /// Re-arm scheduling when the live region's completion arrives
    ///
    /// Completions of superseded regions are ignored.
    pub fn on_schedule_completed(&mut self, generation: u64) {
        if self.scheduled_generation == Some(generation) {
            self.scheduled_generation = None;
            self.needs_file_scheduled = true;
            debug!("Scheduled region {} completed", generation);
        } else {
            debug!("Ignoring stale completion {}", generation);
        }
    }

    /// Clear playback state and re-arm scheduling; stops the graph
    pub fn reset(&mut self, graph: &mut EffectGraph, clock: &ClockDriver) {
        clock.pause();
        graph.stop();
        self.state = TransportState::Idle;
        self.seek_frame = 0;
        self.current_position = 0;
        self.needs_file_scheduled = true;
        self.scheduled_generation = None;
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        let progress = if self.total_frames > 0 {
            self.current_position as f64 / self.total_frames as f64
        } else {
            0.0
        };
        let time = if self.sample_rate > 0 {
            let elapsed = self.current_position as f64 / self.sample_rate as f64;
            let duration = self.total_frames as f64 / self.sample_rate as f64;
            PlayerTime::new(elapsed, duration - elapsed)
        } else {
            PlayerTime::ZERO
        };
        PlaybackSnapshot {
            state: self.state,
            is_playing: self.is_playing(),
            current_frame: self.current_position,
            seek_frame: self.seek_frame,
            total_frames: self.total_frames,
            sample_rate: self.sample_rate,
            progress,
            time,
        }
    }
}
