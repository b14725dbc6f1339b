//! Editing session
//!
//! The collaborator-facing surface: pick a song, preview it live with effects,
//! seek around, render it to the library. Every component is passed in or
//! built by [`SessionBuilder`]; nothing is process-global.
//!
//! Threading: the session lives on the control thread. The output backend
//! pulls the live graph from its own thread, scheduling completions and clock
//! ticks arrive as [`ControlEvent`]s and are applied by [`Session::pump`].
//! State changes go out to subscribers as [`SessionEvent`]s.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use log::{debug, error, info};
use parking_lot::Mutex;

use crate::config::EngineConfig;
use crate::engine::clock::ClockDriver;
use crate::engine::graph::{EffectGraph, SharedGraph};
use crate::engine::output::{ManualOutput, OutputBackend};
use crate::engine::scope::{SecurityScope, Unsandboxed};
use crate::engine::source::{SourceTrack, TrackInfo};
use crate::engine::transport::{ControlEvent, PlaybackSnapshot, Transport, TransportState};
use crate::error::{Result, SongxError};
use crate::library::{Library, LibraryEntry};
use crate::params::{EffectParameters, EffectPreset, ParameterStore, ReverbPreset};
use crate::render::{RenderHandle, RenderJob, RenderRequest};

/// Notifications published to subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Playback(PlaybackSnapshot),
    ParametersChanged(EffectParameters),
    SourceChanged(Option<TrackInfo>),
    /// Final artifact path, or the error text
    RenderFinished(std::result::Result<PathBuf, String>),
}

/// Subscriber list shared with render threads
#[derive(Clone, Default)]
struct Subscribers(Arc<Mutex<Vec<Sender<SessionEvent>>>>);

impl Subscribers {
    fn add(&self) -> Receiver<SessionEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.0.lock().push(tx);
        rx
    }

    /// Deliver to everyone, dropping disconnected subscribers
    fn publish(&self, event: SessionEvent) {
        self.0.lock().retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn len(&self) -> usize {
        self.0.lock().len()
    }
}

pub struct SessionBuilder {
    config: EngineConfig,
    scope: Arc<dyn SecurityScope>,
    output: Option<Box<dyn OutputBackend>>,
    threaded_clock: bool,
}

impl SessionBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            scope: Arc::new(Unsandboxed),
            output: None,
            threaded_clock: false,
        }
    }

    pub fn security_scope(mut self, scope: Arc<dyn SecurityScope>) -> Self {
        self.scope = scope;
        self
    }

    /// Output backend; defaults to [`ManualOutput`]
    pub fn output(mut self, output: Box<dyn OutputBackend>) -> Self {
        self.output = Some(output);
        self
    }

    /// Drive ticks from a clock thread instead of explicit [`Session::tick`] calls
    pub fn threaded_clock(mut self, threaded: bool) -> Self {
        self.threaded_clock = threaded;
        self
    }

    /// Validate the config, create the output directory and wire everything
    pub fn build(self) -> Result<Session> {
        self.config.validate()?;
        let library = Library::from_config(&self.config);
        library.ensure_output_directory()?;

        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        let clock = if self.threaded_clock {
            ClockDriver::spawn(
                Duration::from_millis(self.config.tick_interval_ms),
                events_tx.clone(),
            )?
        } else {
            ClockDriver::manual()
        };

        let mut graph = EffectGraph::new();
        graph.set_completion_sender(events_tx);

        Ok(Session {
            library,
            scope: self.scope,
            output: self
                .output
                .unwrap_or_else(|| Box::new(ManualOutput::new())),
            clock,
            graph: graph.into_shared(),
            transport: Transport::new(),
            params: ParameterStore::new(),
            source: None,
            events: events_rx,
            subscribers: Subscribers::default(),
            config: self.config,
        })
    }
}

pub struct Session {
    config: EngineConfig,
    library: Library,
    scope: Arc<dyn SecurityScope>,
    output: Box<dyn OutputBackend>,
    clock: ClockDriver,
    graph: SharedGraph,
    transport: Transport,
    params: ParameterStore,
    source: Option<SourceTrack>,
    events: Receiver<ControlEvent>,
    subscribers: Subscribers,
}

impl Session {
    pub fn builder(config: EngineConfig) -> SessionBuilder {
        SessionBuilder::new(config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn library(&self) -> &Library {
        &self.library
    }

    /// The live graph, e.g. for pulling frames by hand
    pub fn live_graph(&self) -> SharedGraph {
        Arc::clone(&self.graph)
    }

    pub fn track_info(&self) -> Option<TrackInfo> {
        self.source.as_ref().map(SourceTrack::info)
    }

    pub fn parameters(&self) -> EffectParameters {
        self.params.current()
    }

    pub fn selected_effect(&self) -> Option<EffectPreset> {
        self.params.selected_effect()
    }

    pub fn transport_state(&self) -> TransportState {
        self.transport.state()
    }

    pub fn is_playing(&self) -> bool {
        self.transport.is_playing()
    }

    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        self.subscribers.add()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn publish_playback(&self) {
        self.subscribers
            .publish(SessionEvent::Playback(self.transport.snapshot()));
    }

    fn publish_parameters(&self) {
        self.subscribers
            .publish(SessionEvent::ParametersChanged(self.params.current()));
    }

    // ------------------------------------------------------------------
    // Source
    // ------------------------------------------------------------------

    /// Open a user-picked file and make it the session's track
    ///
    /// On a resource error the previous track stays installed. On an engine
    /// start error the session is left idle with no track.
    pub fn pick_source(&mut self, path: &Path) -> Result<TrackInfo> {
        let track = SourceTrack::open(path, Arc::clone(&self.scope))?;

        self.stop_live();
        if let Err(e) = self.install(&track) {
            error!("Engine start failed for \"{}\": {}", track.name(), e);
            self.uninstall();
            return Err(e);
        }

        let info = track.info();
        self.source = Some(track);
        info!("Session source is now \"{}\"", info.name);
        self.subscribers
            .publish(SessionEvent::SourceChanged(Some(info.clone())));
        self.publish_playback();
        Ok(info)
    }

    fn install(&mut self, track: &SourceTrack) -> Result<()> {
        // the backend sizes its blocks from the graph format
        self.output.stop();
        {
            let mut graph = self.graph.lock();
            graph.configure(track.format(), self.config.block_frames);
            graph.push_parameters(&self.params.current());
            graph.player_mut().attach(track.audio());
        }
        self.output.start(Arc::clone(&self.graph))?;

        let mut graph = self.graph.lock();
        graph.start()?;
        self.transport.load(track.total_frames(), track.sample_rate());
        self.transport.schedule_file(&mut graph);
        Ok(())
    }

    fn uninstall(&mut self) {
        self.output.stop();
        {
            let mut graph = self.graph.lock();
            graph.stop();
            graph.player_mut().detach();
        }
        self.transport.unload();
        self.source = None;
        self.subscribers.publish(SessionEvent::SourceChanged(None));
    }

    fn stop_live(&mut self) {
        let mut graph = self.graph.lock();
        self.transport.reset(&mut graph, &self.clock);
    }

    // ------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------

    /// Toggle playback; a no-op without a track
    ///
    /// Restarts the graph and output if a render or reset stopped them.
    pub fn play_or_pause(&mut self) -> Result<()> {
        if self.source.is_none() {
            return Ok(());
        }
        if !self.output.is_running() {
            self.output.start(Arc::clone(&self.graph))?;
        }
        {
            let mut graph = self.graph.lock();
            graph.start()?;
            self.transport.play_or_pause(&mut graph, &self.clock);
        }
        self.publish_playback();
        Ok(())
    }

    /// Move the playhead by `delta_secs`
    pub fn seek(&mut self, delta_secs: f64) {
        {
            let mut graph = self.graph.lock();
            self.transport.seek(delta_secs, &mut graph, &self.clock);
        }
        if self.source.is_some() {
            self.publish_playback();
        }
    }

    /// Seek by the configured skip interval
    pub fn skip(&mut self, forward: bool) {
        let delta = if forward {
            self.config.skip_seconds
        } else {
            -self.config.skip_seconds
        };
        self.seek(delta);
    }

    /// Jump to a fraction of the track
    pub fn scrub(&mut self, fraction: f64) {
        {
            let mut graph = self.graph.lock();
            self.transport.scrub(fraction, &mut graph, &self.clock);
        }
        if self.source.is_some() {
            self.publish_playback();
        }
    }

    /// Sample the position once and publish it
    pub fn tick(&mut self) -> PlaybackSnapshot {
        let snapshot = {
            let mut graph = self.graph.lock();
            self.transport.update_display(&mut graph, &self.clock)
        };
        self.subscribers.publish(SessionEvent::Playback(snapshot));
        snapshot
    }

    /// Apply queued control events; returns how many were handled
    ///
    /// Any number of queued ticks collapse into one position sample.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        let mut ticked = false;
        while let Ok(event) = self.events.try_recv() {
            handled += 1;
            match event {
                ControlEvent::Tick => ticked = true,
                ControlEvent::ScheduleCompleted { generation } => {
                    self.transport.on_schedule_completed(generation)
                }
            }
        }
        if ticked {
            self.tick();
        }
        handled
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.transport.snapshot()
    }

    // ------------------------------------------------------------------
    // Parameters
    // ------------------------------------------------------------------

    fn push_live(&mut self) {
        let params = self.params.current();
        self.graph.lock().push_parameters(&params);
        self.publish_parameters();
    }

    /// Replace every effect value and push it to the live graph
    ///
    /// Invalid values are rejected and nothing changes.
    pub fn set_effect_parameters(&mut self, params: EffectParameters) -> Result<()> {
        self.params.set(params)?;
        self.push_live();
        Ok(())
    }

    pub fn set_rate(&mut self, rate: f32) -> Result<()> {
        self.params.set_rate(rate)?;
        self.push_live();
        Ok(())
    }

    pub fn set_pitch(&mut self, cents: f32) -> Result<()> {
        self.params.set_pitch(cents)?;
        self.push_live();
        Ok(())
    }

    pub fn set_reverb_mix(&mut self, mix: f32) -> Result<()> {
        self.params.set_reverb_mix(mix)?;
        self.push_live();
        Ok(())
    }

    pub fn set_reverb_preset(&mut self, preset: ReverbPreset) {
        self.params.set_reverb_preset(preset);
        self.push_live();
    }

    pub fn set_low_pass_frequency(&mut self, hz: f32) -> Result<()> {
        self.params.set_low_pass_frequency(hz)?;
        self.push_live();
        Ok(())
    }

    pub fn set_filter_enabled(&mut self, enabled: bool) {
        self.params.set_filter_enabled(enabled);
        self.push_live();
    }

    /// Toggle a named effect; selecting it again restores defaults
    pub fn select_effect(&mut self, preset: EffectPreset) -> EffectParameters {
        let params = self.params.select_effect(preset);
        self.push_live();
        params
    }

    /// Every effect value back to its default, applied live
    pub fn reset_to_defaults(&mut self) {
        self.params.reset_to_defaults();
        self.push_live();
    }

    /// Stop playback, clear the position and reset rate, pitch and reverb
    pub fn reset(&mut self) {
        self.stop_live();
        self.params.reset_transport_values();
        self.push_live();
        self.publish_playback();
    }

    /// Leave the editing screen: reset and drop the track
    pub fn close(&mut self) {
        self.reset();
        self.params.clear_selection();
        if self.source.is_some() {
            self.uninstall();
        }
    }

    // ------------------------------------------------------------------
    // Rendering and library
    // ------------------------------------------------------------------

    /// Final artifact path for the current track
    pub fn final_output_path(&self) -> Option<PathBuf> {
        self.source
            .as_ref()
            .map(|track| self.library.final_output_path(track.name()))
    }

    /// Whether the current track has a rendered artifact to share
    pub fn is_shareable(&self) -> bool {
        self.final_output_path().map_or(false, |p| p.exists())
    }

    /// Render the current track with a snapshot of the current parameters
    ///
    /// Live playback stops first. The outcome is delivered through the handle
    /// and as [`SessionEvent::RenderFinished`].
    pub fn render_and_export(&mut self) -> Result<RenderHandle> {
        let track = self.source.clone().ok_or(SongxError::NoSource)?;
        self.library.ensure_output_directory()?;

        self.stop_live();
        self.publish_playback();

        let request = RenderRequest {
            intermediate_path: self.library.intermediate_path(track.name()),
            final_path: self.library.final_output_path(track.name()),
            source: track,
            params: self.params.current(),
            max_render_frames: self.config.max_render_frames,
            export: self.config.export,
        };
        debug!("Render snapshot: {:?}", request.params);

        let subscribers = self.subscribers.clone();
        RenderJob::new(request)
            .on_complete(Box::new(move |result: &Result<crate::render::RenderOutcome>| {
                let event = match result {
                    Ok(outcome) => Ok(outcome.final_path.clone()),
                    Err(e) => Err(e.to_string()),
                };
                subscribers.publish(SessionEvent::RenderFinished(event));
            }))
            .spawn()
    }

    pub fn list_rendered_outputs(&self) -> Vec<PathBuf> {
        self.library.list_output_paths()
    }

    pub fn list_library(&self) -> Vec<LibraryEntry> {
        self.library.list_outputs()
    }

    /// Files-app URI revealing `path`
    pub fn open_in_files_app(&self, path: &Path) -> String {
        let uri = self.library.reveal_uri(path);
        info!("Revealing {}", uri);
        uri
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.output.stop();
        self.clock.shutdown();
    }
}
