//! Clock/Progress Driver
//!
//! A ticker thread standing in for the display refresh: while unpaused it
//! sends [`ControlEvent::Tick`] at a fixed period. The control thread turns
//! each tick into a position sample. Pausing and resuming only flip a flag
//! and never block.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{select, Sender};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::engine::transport::ControlEvent;
use crate::error::{Result, SongxError};

/// Elapsed and remaining playback time in seconds
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayerTime {
    pub elapsed: f64,
    pub remaining: f64,
}

impl PlayerTime {
    pub const ZERO: PlayerTime = PlayerTime {
        elapsed: 0.0,
        remaining: 0.0,
    };

    pub fn new(elapsed: f64, remaining: f64) -> Self {
        Self { elapsed, remaining }
    }

    /// Elapsed time as `m:ss`
    pub fn elapsed_text(&self) -> String {
        format_minutes_seconds(self.elapsed)
    }

    /// Remaining time as `m:ss`
    pub fn remaining_text(&self) -> String {
        format_minutes_seconds(self.remaining)
    }
}

fn format_minutes_seconds(secs: f64) -> String {
    let total = if secs.is_finite() { secs.max(0.0) as u64 } else { 0 };
    format!("{}:{:02}", total / 60, total % 60)
}

/// Periodic tick source, paused by default
pub struct ClockDriver {
    paused: Arc<AtomicBool>,
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ClockDriver {
    /// Driver without a thread; the owner ticks by hand
    pub fn manual() -> Self {
        Self {
            paused: Arc::new(AtomicBool::new(true)),
            stop: None,
            handle: None,
        }
    }

    /// Spawn the ticker thread
    ///
    /// # Errors
    /// `EngineStart` if the thread cannot be created.
    pub fn spawn(interval: Duration, events: Sender<ControlEvent>) -> Result<Self> {
        let paused = Arc::new(AtomicBool::new(true));
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let thread_paused = Arc::clone(&paused);

        let handle = std::thread::Builder::new()
            .name("songx-clock".to_string())
            .spawn(move || {
                let ticker = crossbeam_channel::tick(interval);
                loop {
                    select! {
                        recv(ticker) -> _ => {
                            if !thread_paused.load(Ordering::Acquire)
                                && events.send(ControlEvent::Tick).is_err()
                            {
                                break;
                            }
                        }
                        recv(stop_rx) -> _ => break,
                    }
                }
                debug!("Clock driver stopped");
            })
            .map_err(|e| SongxError::EngineStart {
                reason: format!("failed to spawn clock thread: {}", e),
            })?;

        debug!("Clock driver started at {:?}", interval);
        Ok(Self {
            paused,
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Whether a ticker thread backs this driver
    pub fn is_threaded(&self) -> bool {
        self.handle.is_some()
    }

    /// Stop the ticker thread and wait for it
    pub fn shutdown(&mut self) {
        self.pause();
        // dropping the sender disconnects the stop channel
        self.stop.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Clock thread panicked");
            }
        }
    }
}

impl Drop for ClockDriver {
    fn drop(&mut self) {
        self.shutdown();
    }
}
