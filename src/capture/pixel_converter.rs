use crate::output::PixelFormat;

use super::Frame;

/// Converts RGBA frames into the pixel format a sink was opened with,
/// reusing one output buffer across frames.
pub struct PixelConverter {
    format: PixelFormat,
    width: usize,
    height: usize,
    buffer: Vec<u8>,
}

impl PixelConverter {
    pub fn new(format: PixelFormat, width: u32, height: u32) -> Self {
        let (width, height) = (width as usize, height as usize);
        Self {
            format,
            width,
            height,
            buffer: vec![0u8; format.frame_size(width, height)],
        }
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Frames must match the dimensions given to [`PixelConverter::new`].
    pub fn convert<'a>(&'a mut self, frame: &'a Frame) -> &'a [u8] {
        debug_assert_eq!(
            (frame.width() as usize, frame.height() as usize),
            (self.width, self.height)
        );
        match self.format {
            PixelFormat::Rgba => frame.rgba(),
            PixelFormat::Bgra => {
                self.buffer.copy_from_slice(frame.rgba());
                for px in self.buffer.chunks_exact_mut(4) {
                    px.swap(0, 2);
                }
                &self.buffer
            }
            PixelFormat::Yuv420p => {
                rgba_to_yuv420p(frame.rgba(), self.width, self.height, &mut self.buffer);
                &self.buffer
            }
        }
    }
}

/// Planar 4:2:0 with BT.601 integer coefficients. Chroma is sampled from the
/// top-left pixel of each 2x2 block.
fn rgba_to_yuv420p(rgba: &[u8], width: usize, height: usize, yuv: &mut [u8]) {
    let chroma_width = (width + 1) / 2;
    let chroma_height = (height + 1) / 2;
    let (y_plane, chroma) = yuv.split_at_mut(width * height);
    let (u_plane, v_plane) = chroma.split_at_mut(chroma_width * chroma_height);

    for line in 0..height {
        for x in 0..width {
            let i = line * width + x;
            let r = rgba[4 * i] as i32;
            let g = rgba[4 * i + 1] as i32;
            let b = rgba[4 * i + 2] as i32;

            y_plane[i] = clamp(((66 * r + 129 * g + 25 * b + 128) >> 8) + 16);

            if line % 2 == 0 && x % 2 == 0 {
                let c = (line / 2) * chroma_width + x / 2;
                u_plane[c] = clamp(((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128);
                v_plane[c] = clamp(((112 * r - 94 * g - 18 * b + 128) >> 8) + 128);
            }
        }
    }
}

fn clamp(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{ChannelLayout, RawCapture};

    fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Frame {
        let data = (0..width * height)
            .flat_map(|_| [rgb[0], rgb[1], rgb[2], 255])
            .collect();
        Frame::from_raw(RawCapture {
            width,
            height,
            layout: ChannelLayout::Rgba,
            data,
        })
        .unwrap()
    }

    #[test]
    fn rgba_passes_through_untouched() {
        let frame = solid(2, 2, [10, 20, 30]);
        let mut converter = PixelConverter::new(PixelFormat::Rgba, 2, 2);
        assert_eq!(converter.convert(&frame), frame.rgba());
    }

    #[test]
    fn bgra_swaps_red_and_blue() {
        let frame = solid(1, 1, [10, 20, 30]);
        let mut converter = PixelConverter::new(PixelFormat::Bgra, 1, 1);
        assert_eq!(converter.convert(&frame), &[30, 20, 10, 255]);
    }

    #[test]
    fn yuv_planes_have_expected_sizes_and_values() {
        let mut converter = PixelConverter::new(PixelFormat::Yuv420p, 4, 2);

        let white = solid(4, 2, [255, 255, 255]);
        let out = converter.convert(&white).to_vec();
        assert_eq!(out.len(), 4 * 2 + 2 * 2);
        assert!(out[..8].iter().all(|&y| y == 235));
        assert!(out[8..].iter().all(|&c| c == 128));

        let black = solid(4, 2, [0, 0, 0]);
        let out = converter.convert(&black);
        assert!(out[..8].iter().all(|&y| y == 16));
        assert!(out[8..].iter().all(|&c| c == 128));
    }

    #[test]
    fn odd_dimensions_round_chroma_up() {
        let frame = solid(3, 3, [0, 0, 255]);
        let mut converter = PixelConverter::new(PixelFormat::Yuv420p, 3, 3);
        let out = converter.convert(&frame);
        assert_eq!(out.len(), 9 + 2 * 4);
        // pure blue: U well above neutral, V below
        assert!(out[9] > 200);
        assert!(out[13] < 128);
    }
}
