//! Monitor capture through `xcap`.
//!
//! Monitors are enumerated on every grab rather than held, so nothing
//! platform-specific has to cross threads. All sizes are physical pixels as
//! returned by `capture_image`; `Monitor::width()` reports logical points on
//! scaled displays and is never used for geometry.

use image::RgbaImage;
use xcap::Monitor;

use super::{CaptureError, ChannelLayout, DisplayGeometry, RawCapture, Region, ScreenSource};

pub struct XcapScreen {
    display: Option<usize>,
}

impl XcapScreen {
    /// `display` is an index into the monitor list; `None` picks the primary.
    pub fn new(display: Option<usize>) -> Self {
        Self { display }
    }
}

impl ScreenSource for XcapScreen {
    /// Captures the whole monitor. A capture whose size differs from the
    /// region is passed through as is so the adapter reports the mismatch.
    fn grab(&self, _region: Region) -> Result<RawCapture, CaptureError> {
        Ok(raw_capture(capture_monitor(self.display)?))
    }
}

/// Queries the pixel size of the selected display from one real capture.
pub fn display_geometry(display: Option<usize>) -> Result<DisplayGeometry, CaptureError> {
    let monitor = select_monitor(display)?;
    let name = monitor.name().unwrap_or_else(|_| "unknown".to_string());
    let image = monitor
        .capture_image()
        .map_err(|e| CaptureError::Unavailable(e.to_string()))?;
    Ok(DisplayGeometry::new(name, image.width(), image.height()))
}

fn capture_monitor(display: Option<usize>) -> Result<RgbaImage, CaptureError> {
    select_monitor(display)?
        .capture_image()
        .map_err(|e| CaptureError::Unavailable(e.to_string()))
}

fn raw_capture(image: RgbaImage) -> RawCapture {
    RawCapture {
        width: image.width(),
        height: image.height(),
        layout: ChannelLayout::Rgba,
        data: image.into_raw(),
    }
}

fn select_monitor(display: Option<usize>) -> Result<Monitor, CaptureError> {
    let monitors = Monitor::all().map_err(|e| CaptureError::Unavailable(e.to_string()))?;

    match display {
        Some(index) => monitors.into_iter().nth(index),
        None => monitors
            .into_iter()
            .find(|m| m.is_primary().unwrap_or(false))
            .or_else(|| {
                // no monitor reports as primary, use the first one
                Monitor::all().ok()?.into_iter().next()
            }),
    }
    .ok_or(CaptureError::NoDisplay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::FrameSource;

    struct StaticImage(RgbaImage);

    impl ScreenSource for StaticImage {
        fn grab(&self, _region: Region) -> Result<RawCapture, CaptureError> {
            Ok(raw_capture(self.0.clone()))
        }
    }

    #[test]
    fn physical_capture_keeps_its_pixel_size() {
        let raw = raw_capture(RgbaImage::new(6, 4));
        assert_eq!((raw.width, raw.height), (6, 4));
        assert_eq!(raw.layout, ChannelLayout::Rgba);
        assert_eq!(raw.data.len(), 6 * 4 * 4);
    }

    #[test]
    fn double_density_capture_is_never_cropped_to_logical_size() {
        // logical 4x2 display, physical 8x4 capture
        let source = FrameSource::new(
            StaticImage(RgbaImage::new(8, 4)),
            &DisplayGeometry::new("scaled", 4, 2),
        );
        assert!(matches!(
            source.capture_frame(),
            Err(CaptureError::GeometryMismatch {
                expected: (4, 2),
                actual: (8, 4)
            })
        ));

        let source = FrameSource::new(
            StaticImage(RgbaImage::new(8, 4)),
            &DisplayGeometry::new("scaled", 8, 4),
        );
        let frame = source.capture_frame().unwrap();
        assert_eq!((frame.width(), frame.height()), (8, 4));
    }
}
