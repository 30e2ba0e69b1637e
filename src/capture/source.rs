use std::sync::{Mutex, PoisonError};

use super::{CaptureError, DisplayGeometry, Frame, Region, ScreenSource};

/// Turns a [`ScreenSource`] into a "capture one RGBA frame" operation over a
/// region fixed at construction.
///
/// Shared by the streaming worker and every preview connection. Sources that
/// do not declare concurrent reads are serialized behind a mutex.
pub struct FrameSource {
    screen: Box<dyn ScreenSource>,
    region: Region,
    gate: Option<Mutex<()>>,
}

impl FrameSource {
    pub fn new(screen: impl ScreenSource + 'static, geometry: &DisplayGeometry) -> Self {
        let gate = (!screen.concurrent_reads()).then(|| Mutex::new(()));
        Self {
            screen: Box::new(screen),
            region: Region::full(geometry),
            gate,
        }
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn capture_frame(&self) -> Result<Frame, CaptureError> {
        let raw = {
            let _guard = self
                .gate
                .as_ref()
                .map(|gate| gate.lock().unwrap_or_else(PoisonError::into_inner));
            self.screen.grab(self.region)?
        };

        if (raw.width, raw.height) != (self.region.width, self.region.height) {
            return Err(CaptureError::GeometryMismatch {
                expected: (self.region.width, self.region.height),
                actual: (raw.width, raw.height),
            });
        }
        Frame::from_raw(raw)
    }
}
