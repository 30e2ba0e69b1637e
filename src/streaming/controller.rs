use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;

use crate::capture::FrameSource;
use crate::output::{PixelFormat, VideoSink};
use crate::pacing::{FrameRate, InvalidRate, SharedFrameRate};
use crate::streaming::worker::{WorkerContext, WorkerExit, WorkerHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Running,
    /// Stop was requested but the worker has not confirmed it yet.
    Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    NotRunning,
    /// The worker did not finish within the stop timeout. It stays tracked
    /// and the session reports `Stopping` until it does.
    TimedOut,
}

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error(transparent)]
    InvalidRate(#[from] InvalidRate),

    #[error("{0}")]
    SinkInitFailed(String),

    #[error("Failed to spawn streaming worker: {0}")]
    Spawn(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    pub capturing: bool,
    pub frame_rate: u32,
    pub state: SessionState,
    /// Why the last worker ended, when it ended on its own.
    pub last_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub pixel_format: PixelFormat,
    pub frame_rate: FrameRate,
    pub stop_timeout: Duration,
    pub profiler: bool,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            pixel_format: PixelFormat::Rgba,
            frame_rate: FrameRate::constant(30),
            stop_timeout: Duration::from_secs(3),
            profiler: false,
        }
    }
}

struct ActiveWorker {
    handle: WorkerHandle,
    stopping: bool,
}

#[derive(Default)]
struct CaptureSession {
    worker: Option<ActiveWorker>,
    next_id: u64,
    last_exit: Option<WorkerExit>,
}

impl CaptureSession {
    /// Drops the worker with `id` after it has stopped, keeping its exit.
    fn finish(&mut self, id: u64, exit: WorkerExit) {
        if self.worker.as_ref().map(|w| w.handle.id()) != Some(id) {
            return;
        }
        if let Some(active) = self.worker.take() {
            active.handle.join();
        }
        self.last_exit = Some(exit);
    }

    /// Clears a worker that has already ended, whatever the cause.
    fn reap(&mut self) {
        let finished = self
            .worker
            .as_ref()
            .and_then(|w| w.handle.exit().map(|exit| (w.handle.id(), exit)));
        if let Some((id, exit)) = finished {
            self.finish(id, exit);
        }
    }
}

/// Lifecycle of the single streaming worker, driven by the control plane.
///
/// Session state lives behind one mutex that is never held across an await;
/// the target rate is shared with the running worker through an atomic.
pub struct CaptureController {
    source: Arc<FrameSource>,
    sink: Arc<dyn VideoSink>,
    pixel_format: PixelFormat,
    profiler: bool,
    frame_rate: SharedFrameRate,
    stop_timeout: Duration,
    session: Mutex<CaptureSession>,
}

impl CaptureController {
    pub fn new(
        source: Arc<FrameSource>,
        sink: Arc<dyn VideoSink>,
        options: ControllerOptions,
    ) -> Self {
        Self {
            source,
            sink,
            pixel_format: options.pixel_format,
            profiler: options.profiler,
            frame_rate: SharedFrameRate::new(options.frame_rate),
            stop_timeout: options.stop_timeout,
            session: Mutex::new(CaptureSession::default()),
        }
    }

    /// Starts a worker, or joins the one already starting. A caller that
    /// finds a worker still opening its sink waits for that outcome, so it
    /// never reports `AlreadyRunning` for a start that then fails.
    pub async fn start(&self) -> Result<StartOutcome, ControlError> {
        let (id, watch, outcome) = {
            let mut session = self.session();
            session.reap();
            if let Some(active) = &session.worker {
                (
                    active.handle.id(),
                    active.handle.watch(),
                    StartOutcome::AlreadyRunning,
                )
            } else {
                let id = session.next_id;
                session.next_id += 1;
                let handle = WorkerHandle::spawn(id, self.worker_context())?;
                let watch = handle.watch();
                session.worker = Some(ActiveWorker {
                    handle,
                    stopping: false,
                });
                session.last_exit = None;
                (id, watch, StartOutcome::Started)
            }
        };

        match watch.started().await {
            Ok(()) => {
                if outcome == StartOutcome::Started {
                    info!("Capture started");
                }
                Ok(outcome)
            }
            Err(exit) => {
                self.session().finish(id, exit.clone());
                Err(ControlError::SinkInitFailed(exit.to_string()))
            }
        }
    }

    pub async fn stop(&self) -> StopOutcome {
        let (id, watch) = {
            let mut session = self.session();
            let Some(active) = session.worker.as_mut() else {
                return StopOutcome::NotRunning;
            };
            if !active.stopping && active.handle.exit().is_some() {
                // ended on its own; nothing left to stop
                session.reap();
                return StopOutcome::NotRunning;
            }
            active.stopping = true;
            active.handle.cancel();
            (active.handle.id(), active.handle.watch())
        };

        match tokio::time::timeout(self.stop_timeout, watch.stopped()).await {
            Ok(exit) => {
                self.session().finish(id, exit);
                info!("Capture stopped");
                StopOutcome::Stopped
            }
            Err(_) => {
                warn!(
                    "Streaming worker {} did not stop within {:?}",
                    id, self.stop_timeout
                );
                StopOutcome::TimedOut
            }
        }
    }

    pub fn set_frame_rate(&self, rate: i64) -> Result<FrameRate, ControlError> {
        let rate = FrameRate::new(rate)?;
        self.frame_rate.store(rate);
        info!("Frame rate set to {}", rate);
        Ok(rate)
    }

    pub fn status(&self) -> Status {
        let session = self.session();
        let (state, exit) = match &session.worker {
            None => (SessionState::Idle, session.last_exit.clone()),
            Some(active) => match active.handle.exit() {
                Some(exit) => (SessionState::Idle, Some(exit)),
                None if active.stopping => (SessionState::Stopping, None),
                None => (SessionState::Running, None),
            },
        };
        Status {
            capturing: state != SessionState::Idle,
            frame_rate: self.frame_rate.load().get(),
            state,
            last_error: exit.and_then(|exit| exit.error()),
        }
    }

    /// Process-exit teardown: the same path as [`CaptureController::stop`],
    /// safe to call any number of times.
    pub async fn shutdown(&self) {
        match self.stop().await {
            StopOutcome::Stopped => info!("Streaming worker shut down"),
            StopOutcome::NotRunning => debug!("No streaming worker to shut down"),
            StopOutcome::TimedOut => warn!("Exiting with streaming worker still winding down"),
        }
    }

    /// Signals the worker to stop without waiting. Usable where awaiting is
    /// not (panic hook, drop).
    pub fn teardown(&self) {
        if let Some(active) = self.session().worker.as_mut() {
            active.stopping = true;
            active.handle.cancel();
        }
    }

    fn worker_context(&self) -> WorkerContext {
        WorkerContext {
            source: self.source.clone(),
            sink: self.sink.clone(),
            pixel_format: self.pixel_format,
            frame_rate: self.frame_rate.clone(),
            profiler: self.profiler,
        }
    }

    fn session(&self) -> MutexGuard<'_, CaptureSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        self.teardown();
    }
}
