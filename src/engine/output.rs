//! Output backends
//!
//! The backend owns the pull side of the live graph: it repeatedly locks the
//! shared graph and asks it for the next block. Three flavours:
//! - [`ManualOutput`]: the caller pulls; deterministic, used by tests.
//! - [`ThreadedOutput`]: a named thread pulling at real-time pace into a
//!   null sink, for headless preview.
//! - `CpalOutput` (feature `device`): a real output device.

use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{select, Sender};
use log::{debug, info, warn};

use crate::engine::buffer::{AudioBuffer, AudioFormat};
use crate::engine::graph::SharedGraph;
use crate::error::{Result, SongxError};

/// Something that drives the live graph
pub trait OutputBackend: Send {
    /// Begin pulling from `graph`
    ///
    /// # Errors
    /// `EngineStart` if the backend cannot run.
    fn start(&mut self, graph: SharedGraph) -> Result<()>;

    fn stop(&mut self);

    fn is_running(&self) -> bool;

    fn name(&self) -> &'static str;
}

fn graph_format(graph: &SharedGraph) -> Result<AudioFormat> {
    graph.lock().format().ok_or_else(|| SongxError::EngineStart {
        reason: "graph has no format".to_string(),
    })
}

/// Caller-driven backend
#[derive(Default)]
pub struct ManualOutput {
    graph: Option<SharedGraph>,
    format: Option<AudioFormat>,
}

impl ManualOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render the next `frames` frames; silence when not started
    pub fn pull(&mut self, frames: usize) -> AudioBuffer {
        match (&self.graph, self.format) {
            (Some(graph), Some(format)) => {
                let mut out = AudioBuffer::with_format(frames, format);
                graph.lock().render(&mut out);
                out
            }
            _ => AudioBuffer::new(frames, Default::default(), 44100),
        }
    }
}

impl OutputBackend for ManualOutput {
    fn start(&mut self, graph: SharedGraph) -> Result<()> {
        self.format = Some(graph_format(&graph)?);
        self.graph = Some(graph);
        Ok(())
    }

    fn stop(&mut self) {
        self.graph = None;
        self.format = None;
    }

    fn is_running(&self) -> bool {
        self.graph.is_some()
    }

    fn name(&self) -> &'static str {
        "manual"
    }
}

/// Real-time paced pull thread writing into a null sink
pub struct ThreadedOutput {
    block_frames: usize,
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ThreadedOutput {
    pub fn new(block_frames: usize) -> Self {
        Self {
            block_frames: block_frames.max(1),
            stop: None,
            handle: None,
        }
    }

    pub fn block_frames(&self) -> usize {
        self.block_frames
    }
}

impl OutputBackend for ThreadedOutput {
    fn start(&mut self, graph: SharedGraph) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }
        let format = graph_format(&graph)?;
        let block_frames = self.block_frames;
        let period =
            Duration::from_secs_f64(block_frames as f64 / format.sample_rate.max(1) as f64);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);

        let handle = std::thread::Builder::new()
            .name("songx-output".to_string())
            .spawn(move || {
                let mut block = AudioBuffer::with_format(block_frames, format);
                let ticker = crossbeam_channel::tick(period);
                loop {
                    select! {
                        recv(ticker) -> _ => graph.lock().render(&mut block),
                        recv(stop_rx) -> _ => break,
                    }
                }
            })
            .map_err(|e| SongxError::EngineStart {
                reason: format!("failed to spawn output thread: {}", e),
            })?;

        info!(
            "Threaded output started: {} frames every {:?}",
            block_frames, period
        );
        self.stop = Some(stop_tx);
        self.handle = Some(handle);
        Ok(())
    }

    fn stop(&mut self) {
        self.stop.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Output thread panicked");
            }
            debug!("Threaded output stopped");
        }
    }

    fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    fn name(&self) -> &'static str {
        "threaded"
    }
}

impl Drop for ThreadedOutput {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(feature = "device")]
pub use device::CpalOutput;

#[cfg(feature = "device")]
mod device {
    use super::*;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use log::error;

    /// `cpal::Stream` is `!Send`; the handle is only touched by the owning
    /// session, which lives on the control thread.
    struct StreamHandle(#[allow(dead_code)] cpal::Stream);

    // SAFETY: the stream is created, used and dropped by the single owner of
    // `CpalOutput` and never accessed concurrently.
    unsafe impl Send for StreamHandle {}

    fn start_error(e: impl std::fmt::Display) -> SongxError {
        SongxError::EngineStart {
            reason: e.to_string(),
        }
    }

    /// Default output device through cpal
    #[derive(Default)]
    pub struct CpalOutput {
        stream: Option<StreamHandle>,
    }

    impl CpalOutput {
        pub fn new() -> Self {
            Self::default()
        }

        fn build_stream<T>(
            device: &cpal::Device,
            config: &cpal::StreamConfig,
            graph: SharedGraph,
            format: AudioFormat,
        ) -> Result<cpal::Stream>
        where
            T: cpal::SizedSample + cpal::FromSample<f32>,
        {
            let device_channels = config.channels as usize;
            let mut block = AudioBuffer::with_format(0, format);

            device
                .build_output_stream(
                    config,
                    move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                        let frames = data.len() / device_channels.max(1);
                        if block.len() != frames {
                            block.resize(frames);
                        }
                        graph.lock().render(&mut block);
                        for (i, sample) in data.iter_mut().enumerate() {
                            let frame = i / device_channels;
                            let ch = (i % device_channels).min(block.channels() - 1);
                            *sample = T::from_sample(block.get_sample(ch, frame).unwrap_or(0.0));
                        }
                    },
                    |err| error!("Output stream error: {}", err),
                    None,
                )
                .map_err(start_error)
        }
    }

    impl OutputBackend for CpalOutput {
        fn start(&mut self, graph: SharedGraph) -> Result<()> {
            if self.stream.is_some() {
                return Ok(());
            }
            let format = graph_format(&graph)?;
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or_else(|| start_error("no output device available"))?;
            let supported = device.default_output_config().map_err(start_error)?;
            let mut config: cpal::StreamConfig = supported.config();
            config.sample_rate = cpal::SampleRate(format.sample_rate);

            let stream = match supported.sample_format() {
                cpal::SampleFormat::F32 => Self::build_stream::<f32>(&device, &config, graph, format)?,
                cpal::SampleFormat::I16 => Self::build_stream::<i16>(&device, &config, graph, format)?,
                cpal::SampleFormat::U16 => Self::build_stream::<u16>(&device, &config, graph, format)?,
                other => return Err(start_error(format!("unsupported sample format {:?}", other))),
            };
            stream.play().map_err(start_error)?;
            info!("Device output started at {} Hz", format.sample_rate);
            self.stream = Some(StreamHandle(stream));
            Ok(())
        }

        fn stop(&mut self) {
            if self.stream.take().is_some() {
                debug!("Device output stopped");
            }
        }

        fn is_running(&self) -> bool {
            self.stream.is_some()
        }

        fn name(&self) -> &'static str {
            "device"
        }
    }
}

/// Build the backend named in a CLI flag
pub fn backend_by_name(name: &str, block_frames: usize) -> Result<Box<dyn OutputBackend>> {
    match name {
        "manual" => Ok(Box::new(ManualOutput::new())),
        "threaded" | "null" => Ok(Box::new(ThreadedOutput::new(block_frames))),
        #[cfg(feature = "device")]
        "device" => Ok(Box::new(CpalOutput::new())),
        other => Err(SongxError::InvalidConfig {
            reason: format!("unknown output backend: {}", other),
        }),
    }
}
