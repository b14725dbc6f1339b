//! Render Job
//!
//! One offline render plus transcode, run on a background thread. The effect
//! parameters are copied into the request when the job is created, so edits
//! made while it runs do not reach it. The outcome arrives on a channel; there
//! is no retry.

use std::path::PathBuf;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, TryRecvError};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::source::SourceTrack;
use crate::error::{Result, SongxError};
use crate::params::EffectParameters;
use crate::render::offline::{render_to_file, ManualRender, OfflineEngine};
use crate::render::transcode::Transcoder;
use crate::render::{CancelToken, ExportSettings};

/// Builds the manual-render engine for a request
pub type EngineFactory = Box<dyn FnOnce(&RenderRequest) -> Result<Box<dyn ManualRender + Send>> + Send>;

/// Callback run on the job thread with the outcome
pub type CompletionHook = Box<dyn FnOnce(&Result<RenderOutcome>) + Send>;

/// Everything a job needs, captured at render start
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub source: SourceTrack,
    pub params: EffectParameters,
    pub intermediate_path: PathBuf,
    pub final_path: PathBuf,
    pub max_render_frames: usize,
    pub export: ExportSettings,
}

impl RenderRequest {
    /// Frames the offline render produces
    pub fn target_length(&self) -> u64 {
        self.params.target_length(self.source.total_frames())
    }
}

/// A finished job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderOutcome {
    pub id: Uuid,
    pub final_path: PathBuf,
    pub frames: u64,
    pub sample_rate: u32,
}

impl RenderOutcome {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames as f64 / self.sample_rate as f64
    }
}

pub struct RenderJob {
    id: Uuid,
    request: RenderRequest,
    engine_factory: Option<EngineFactory>,
    on_complete: Option<CompletionHook>,
}

impl RenderJob {
    pub fn new(request: RenderRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            engine_factory: None,
            on_complete: None,
        }
    }

    /// Render through a custom engine instead of a fresh [`OfflineEngine`]
    pub fn with_engine_factory(mut self, factory: EngineFactory) -> Self {
        self.engine_factory = Some(factory);
        self
    }

    /// Run `hook` on the job thread once the outcome is known
    pub fn on_complete(mut self, hook: CompletionHook) -> Self {
        self.on_complete = Some(hook);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn request(&self) -> &RenderRequest {
        &self.request
    }

    /// Run to completion on the calling thread
    pub fn run(self, cancel: &CancelToken) -> Result<RenderOutcome> {
        let RenderJob {
            id,
            request,
            engine_factory,
            on_complete,
        } = self;

        let result = execute(id, &request, engine_factory, cancel);
        match &result {
            Ok(outcome) => info!(
                "Render job {} finished: {:?} ({:.2}s)",
                id,
                outcome.final_path,
                outcome.duration_secs()
            ),
            Err(e) => error!("Render job {} failed: {}", id, e),
        }
        if let Some(hook) = on_complete {
            hook(&result);
        }
        result
    }

    /// Run on a background thread
    ///
    /// # Errors
    /// `Render` if the thread cannot be spawned.
    pub fn spawn(self) -> Result<RenderHandle> {
        let id = self.id;
        let cancel = CancelToken::new();
        let job_cancel = cancel.clone();
        let (tx, rx) = crossbeam_channel::bounded(1);

        let thread = std::thread::Builder::new()
            .name(format!("songx-render-{}", id.simple()))
            .spawn(move || {
                let result = self.run(&job_cancel);
                if tx.send(result).is_err() {
                    warn!("Render job {} finished with nobody waiting", id);
                }
            })
            .map_err(|e| SongxError::Render {
                frame: 0,
                reason: format!("failed to spawn render thread: {}", e),
            })?;

        Ok(RenderHandle {
            id,
            cancel,
            receiver: rx,
            thread: Some(thread),
        })
    }
}

fn execute(
    id: Uuid,
    request: &RenderRequest,
    engine_factory: Option<EngineFactory>,
    cancel: &CancelToken,
) -> Result<RenderOutcome> {
    let target = request.target_length();
    info!(
        "Render job {}: \"{}\" at rate {} pitch {} -> {} frames",
        id,
        request.source.name(),
        request.params.rate,
        request.params.pitch,
        target
    );

    let mut engine: Box<dyn ManualRender + Send> = match engine_factory {
        Some(factory) => factory(request)?,
        None => Box::new(OfflineEngine::new(
            &request.source,
            &request.params,
            request.max_render_frames,
        )?),
    };
    let sample_rate = engine.format().sample_rate;
    render_to_file(engine.as_mut(), target, &request.intermediate_path, cancel)?;

    if cancel.is_cancelled() {
        crate::library::delete_if_exists(&request.intermediate_path);
        return Err(SongxError::RenderCancelled { frame: target });
    }

    let frames = Transcoder::new(request.export).transcode(&request.intermediate_path, &request.final_path)?;
    Ok(RenderOutcome {
        id,
        final_path: request.final_path.clone(),
        frames,
        sample_rate,
    })
}

/// Handle to a spawned job
pub struct RenderHandle {
    id: Uuid,
    cancel: CancelToken,
    receiver: Receiver<Result<RenderOutcome>>,
    thread: Option<JoinHandle<()>>,
}

impl RenderHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Ask the job to stop at the next batch
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Block until the job finishes
    pub fn wait(mut self) -> Result<RenderOutcome> {
        let result = self.receiver.recv().unwrap_or_else(|_| {
            Err(SongxError::Render {
                frame: 0,
                reason: "render thread exited without a result".to_string(),
            })
        });
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        result
    }

    /// The outcome, if the job has finished
    pub fn try_result(&self) -> Option<Result<RenderOutcome>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(SongxError::Render {
                frame: 0,
                reason: "render thread exited without a result".to_string(),
            })),
        }
    }
}
