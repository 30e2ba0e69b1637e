use super::CaptureError;

/// Channel order of a buffer produced by a screen source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelLayout {
    Rgb,
    Bgr,
    Rgba,
    Bgra,
}

impl ChannelLayout {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            ChannelLayout::Rgb | ChannelLayout::Bgr => 3,
            ChannelLayout::Rgba | ChannelLayout::Bgra => 4,
        }
    }
}

/// Unprocessed buffer as handed back by a [`super::ScreenSource`].
#[derive(Debug, Clone)]
pub struct RawCapture {
    pub width: u32,
    pub height: u32,
    pub layout: ChannelLayout,
    pub data: Vec<u8>,
}

/// One screen image in RGBA, 4 bytes per pixel, alpha always present.
#[derive(Debug, Clone)]
pub struct Frame {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl Frame {
    pub fn from_raw(raw: RawCapture) -> Result<Self, CaptureError> {
        let pixels = raw.width as usize * raw.height as usize;
        let expected = pixels * raw.layout.bytes_per_pixel();
        if raw.data.len() != expected {
            return Err(CaptureError::MalformedBuffer {
                expected,
                actual: raw.data.len(),
            });
        }

        let rgba = match raw.layout {
            ChannelLayout::Rgba => raw.data,
            ChannelLayout::Bgra => {
                let mut data = raw.data;
                for px in data.chunks_exact_mut(4) {
                    px.swap(0, 2);
                }
                data
            }
            ChannelLayout::Rgb => expand_opaque(&raw.data, [0, 1, 2]),
            ChannelLayout::Bgr => expand_opaque(&raw.data, [2, 1, 0]),
        };

        Ok(Self {
            width: raw.width,
            height: raw.height,
            rgba,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn rgba(&self) -> &[u8] {
        &self.rgba
    }

    pub fn into_rgba(self) -> Vec<u8> {
        self.rgba
    }
}

// `order` maps output R, G, B to source channel indices.
fn expand_opaque(src: &[u8], order: [usize; 3]) -> Vec<u8> {
    let mut out = Vec::with_capacity(src.len() / 3 * 4);
    for px in src.chunks_exact(3) {
        out.extend_from_slice(&[px[order[0]], px[order[1]], px[order[2]], u8::MAX]);
    }
    out
}
