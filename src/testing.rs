//! In-memory screen and sink doubles shared by the unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::capture::{
    CaptureError, ChannelLayout, DisplayGeometry, FrameSource, RawCapture, Region, ScreenSource,
};
use crate::output::{PixelFormat, SinkError, SinkSession, VideoSink};
use crate::pacing::FrameRate;
use crate::streaming::{CaptureController, ControllerOptions};

/// Produces solid RGB frames; can be told to fail upcoming grabs.
#[derive(Clone)]
pub struct FakeScreen {
    width: u32,
    height: u32,
    failures_left: Arc<AtomicUsize>,
    grabs: Arc<AtomicUsize>,
}

impl FakeScreen {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            failures_left: Arc::new(AtomicUsize::new(0)),
            grabs: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn fail_next(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    pub fn grabs(&self) -> usize {
        self.grabs.load(Ordering::SeqCst)
    }

    pub fn geometry(&self) -> DisplayGeometry {
        DisplayGeometry::new("fake", self.width, self.height)
    }
}

impl ScreenSource for FakeScreen {
    fn grab(&self, _region: Region) -> Result<RawCapture, CaptureError> {
        self.grabs.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(CaptureError::Unavailable("display disconnected".into()));
        }
        Ok(RawCapture {
            width: self.width,
            height: self.height,
            layout: ChannelLayout::Rgb,
            data: vec![0x40; (self.width * self.height * 3) as usize],
        })
    }
}

#[derive(Default)]
struct SinkRecord {
    opens: AtomicUsize,
    closes: AtomicUsize,
    fail_open: AtomicBool,
    open_delay: Mutex<Duration>,
    panic_on_send: AtomicBool,
    fail_after: Mutex<Option<usize>>,
    send_delay: Mutex<Duration>,
    sends: Mutex<Vec<Instant>>,
}

/// Sink that records the time of every send and how often sessions were
/// opened and released.
#[derive(Clone, Default)]
pub struct RecordingSink {
    record: Arc<SinkRecord>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_open(self) -> Self {
        self.record.fail_open.store(true, Ordering::SeqCst);
        self
    }

    /// Sends succeed `count` times, then fail.
    pub fn fail_send_after(self, count: usize) -> Self {
        *self.record.fail_after.lock().unwrap() = Some(count);
        self
    }

    pub fn panic_on_send(self) -> Self {
        self.record.panic_on_send.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_open_delay(self, delay: Duration) -> Self {
        *self.record.open_delay.lock().unwrap() = delay;
        self
    }

    pub fn with_send_delay(self, delay: Duration) -> Self {
        *self.record.send_delay.lock().unwrap() = delay;
        self
    }

    pub fn opens(&self) -> usize {
        self.record.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.record.closes.load(Ordering::SeqCst)
    }

    pub fn sends(&self) -> Vec<Instant> {
        self.record.sends.lock().unwrap().clone()
    }
}

impl VideoSink for RecordingSink {
    fn open(
        &self,
        _width: u32,
        _height: u32,
        _format: PixelFormat,
    ) -> Result<Box<dyn SinkSession>, SinkError> {
        let delay = *self.record.open_delay.lock().unwrap();
        std::thread::sleep(delay);
        if self.record.fail_open.load(Ordering::SeqCst) {
            return Err(SinkError::InitFailed("no sink device".into()));
        }
        self.record.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RecordingSession {
            record: self.record.clone(),
        }))
    }
}

struct RecordingSession {
    record: Arc<SinkRecord>,
}

impl SinkSession for RecordingSession {
    fn send(&mut self, _frame: &[u8]) -> Result<(), SinkError> {
        if self.record.panic_on_send.load(Ordering::SeqCst) {
            panic!("sink exploded");
        }
        let delay = *self.record.send_delay.lock().unwrap();
        std::thread::sleep(delay);

        let mut sends = self.record.sends.lock().unwrap();
        if let Some(limit) = *self.record.fail_after.lock().unwrap() {
            if sends.len() >= limit {
                return Err(SinkError::SendFailed("receiver went away".into()));
            }
        }
        sends.push(Instant::now());
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        self.record.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn frame_source(screen: &FakeScreen) -> Arc<FrameSource> {
    Arc::new(FrameSource::new(screen.clone(), &screen.geometry()))
}

pub fn controller(screen: &FakeScreen, sink: &RecordingSink, rate: u32) -> CaptureController {
    CaptureController::new(
        frame_source(screen),
        Arc::new(sink.clone()),
        ControllerOptions {
            frame_rate: FrameRate::constant(rate),
            ..ControllerOptions::default()
        },
    )
}

/// Polls `condition` every 10ms until it holds or `limit` elapses.
pub async fn eventually(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
