mod frame;
mod pixel_converter;
mod source;
pub mod xcap_source;

pub use frame::{ChannelLayout, Frame, RawCapture};
pub use pixel_converter::PixelConverter;
pub use source::FrameSource;
pub use xcap_source::XcapScreen;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Screen capture unavailable: {0}")]
    Unavailable(String),

    #[error("Display geometry changed: expected {expected:?}, got {actual:?}")]
    GeometryMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("No display found")]
    NoDisplay,

    #[error("Capture buffer has {actual} bytes, expected {expected}")]
    MalformedBuffer { expected: usize, actual: usize },
}

impl CaptureError {
    /// Whether a capture loop should skip this frame and try again.
    pub fn is_transient(&self) -> bool {
        !matches!(self, CaptureError::NoDisplay)
    }
}

/// Platform capability yielding one raw buffer per call.
pub trait ScreenSource: Send + Sync {
    fn grab(&self, region: Region) -> Result<RawCapture, CaptureError>;

    /// Whether `grab` may run on several threads at once.
    fn concurrent_reads(&self) -> bool {
        false
    }
}

pub trait DisplayInfo {
    /// Get the resolution of the display in (width, height)
    fn resolution(&self) -> (u32, u32);
}

/// Display size, queried once at startup and fixed for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayGeometry {
    pub name: String,
    pub width: u32,
    pub height: u32,
}

impl DisplayGeometry {
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
        }
    }
}

impl DisplayInfo for DisplayGeometry {
    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Capture rectangle in display-local pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn full(display: &impl DisplayInfo) -> Self {
        let (width, height) = display.resolution();
        Self {
            left: 0,
            top: 0,
            width,
            height,
        }
    }
}
