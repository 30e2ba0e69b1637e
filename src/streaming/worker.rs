//! The capture-and-send loop.
//!
//! A worker runs on its own OS thread because both the screen source and the
//! sink block. It moves through `Starting → Looping → Stopping → Stopped`,
//! publishing each phase on a watch channel; the final `Stopped` carries the
//! reason the worker ended. Cancellation is checked once per iteration, so a
//! stop takes effect within one frame period plus one send.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::capture::{FrameSource, PixelConverter};
use crate::output::{PixelFormat, SessionGuard, VideoSink};
use crate::pacing::{pace_delay, SharedFrameRate};
use crate::performance_profiler::PerformanceProfiler;

#[derive(Debug, Clone, PartialEq)]
pub enum WorkerPhase {
    Starting,
    Looping,
    Stopping,
    Stopped(WorkerExit),
}

/// Why a worker reached `Stopped`.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerExit {
    Cancelled,
    InitFailed(String),
    SendFailed(String),
    Panicked,
}

impl WorkerExit {
    /// The failure behind an exit nobody asked for.
    pub fn error(&self) -> Option<String> {
        match self {
            WorkerExit::Cancelled => None,
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerExit::Cancelled => write!(f, "stopped on request"),
            WorkerExit::InitFailed(e) | WorkerExit::SendFailed(e) => write!(f, "{}", e),
            WorkerExit::Panicked => write!(f, "streaming worker panicked"),
        }
    }
}

/// Everything a worker needs, cloned into its thread.
#[derive(Clone)]
pub struct WorkerContext {
    pub source: Arc<FrameSource>,
    pub sink: Arc<dyn VideoSink>,
    pub pixel_format: PixelFormat,
    pub frame_rate: SharedFrameRate,
    pub profiler: bool,
}

pub struct WorkerHandle {
    id: u64,
    cancel: CancellationToken,
    phase: watch::Receiver<WorkerPhase>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn spawn(id: u64, context: WorkerContext) -> io::Result<Self> {
        let (phase_tx, phase) = watch::channel(WorkerPhase::Starting);
        let cancel = CancellationToken::new();
        let thread = thread::Builder::new()
            .name(format!("stream-worker-{}", id))
            .spawn({
                let cancel = cancel.clone();
                move || {
                    let exit = run(&context, &cancel, &phase_tx);
                    info!("Streaming worker {} stopped: {}", id, exit);
                    phase_tx.send_replace(WorkerPhase::Stopped(exit));
                }
            })?;

        Ok(Self {
            id,
            cancel,
            phase,
            thread: Some(thread),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Asks the loop to finish after its current iteration. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn watch(&self) -> WorkerWatch {
        WorkerWatch {
            phase: self.phase.clone(),
        }
    }

    /// The exit reason, if the worker has already stopped.
    pub fn exit(&self) -> Option<WorkerExit> {
        self.watch().exit()
    }

    /// Joins the thread. Only call once [`WorkerHandle::exit`] is `Some`,
    /// otherwise this blocks until the loop ends.
    pub fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Streaming worker {} panicked", self.id);
            }
        }
    }
}

/// Observes a worker's phase without owning it.
#[derive(Clone)]
pub struct WorkerWatch {
    phase: watch::Receiver<WorkerPhase>,
}

impl WorkerWatch {
    pub fn exit(&self) -> Option<WorkerExit> {
        match &*self.phase.borrow() {
            WorkerPhase::Stopped(exit) => Some(exit.clone()),
            // sender dropped without reporting: the thread unwound
            _ if self.phase.has_changed().is_err() => Some(WorkerExit::Panicked),
            _ => None,
        }
    }

    /// Resolves once the worker has left `Starting`: `Ok` if it got its sink
    /// and entered the loop, the exit reason if it never did.
    pub async fn started(mut self) -> Result<(), WorkerExit> {
        loop {
            match &*self.phase.borrow_and_update() {
                WorkerPhase::Starting => {}
                WorkerPhase::Stopped(exit @ (WorkerExit::InitFailed(_) | WorkerExit::Panicked)) => {
                    return Err(exit.clone())
                }
                _ => return Ok(()),
            }
            if self.phase.changed().await.is_err() {
                return match self.exit() {
                    Some(exit @ (WorkerExit::InitFailed(_) | WorkerExit::Panicked)) => Err(exit),
                    _ => Ok(()),
                };
            }
        }
    }

    /// Resolves with the exit reason once the worker reaches `Stopped`.
    pub async fn stopped(mut self) -> WorkerExit {
        loop {
            if let WorkerPhase::Stopped(exit) = &*self.phase.borrow_and_update() {
                return exit.clone();
            }
            if self.phase.changed().await.is_err() {
                return self.exit().unwrap_or(WorkerExit::Panicked);
            }
        }
    }
}

fn run(
    context: &WorkerContext,
    cancel: &CancellationToken,
    phase: &watch::Sender<WorkerPhase>,
) -> WorkerExit {
    let region = context.source.region();
    let session = match context
        .sink
        .open(region.width, region.height, context.pixel_format)
    {
        Ok(session) => session,
        Err(e) => {
            error!("{}", e);
            return WorkerExit::InitFailed(e.to_string());
        }
    };
    let mut session = SessionGuard::new(session);
    let mut converter = PixelConverter::new(context.pixel_format, region.width, region.height);
    let mut profiler = PerformanceProfiler::new(context.profiler);

    phase.send_replace(WorkerPhase::Looping);
    info!(
        "Streaming {}x{} as {:?} at {}",
        region.width,
        region.height,
        converter.format(),
        context.frame_rate.load()
    );

    let exit = loop {
        if cancel.is_cancelled() {
            break WorkerExit::Cancelled;
        }
        // read once per iteration: a new rate applies from the next one
        let rate = context.frame_rate.load();
        let started = Instant::now();
        profiler.accept_frame();

        match context.source.capture_frame() {
            Ok(frame) => {
                profiler.done_capture();
                let data = converter.convert(&frame);
                profiler.done_conversion();
                if let Err(e) = session.send(data) {
                    error!("{}", e);
                    break WorkerExit::SendFailed(e.to_string());
                }
                profiler.done_processing(data.len());
            }
            Err(e) => {
                if e.is_transient() {
                    debug!("Skipping frame: {}", e);
                } else {
                    warn!("Skipping frame: {}", e);
                }
                profiler.skipped_frame();
            }
        }

        thread::sleep(pace_delay(rate, started));
    };

    phase.send_replace(WorkerPhase::Stopping);
    match session.close() {
        Ok(()) => info!("Video sink released"),
        Err(e) => warn!("{}", e),
    }
    exit
}
