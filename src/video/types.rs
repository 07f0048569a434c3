use image::{imageops, ImageBuffer, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use crate::timeline::RenderMode;

/// A single RGB video frame
///
/// Wraps an RGB image buffer and provides the pixel access used by filters,
/// the caption renderer and the encoder pipe.
#[derive(Clone, Debug)]
pub struct Frame {
    buffer: RgbImage,
}

impl Frame {
    /// Create a new frame from an RGB image buffer
    pub fn new(buffer: RgbImage) -> Self {
        Self { buffer }
    }

    /// Create a new frame with the given dimensions filled with black
    pub fn new_black(width: u32, height: u32) -> Self {
        Self {
            buffer: ImageBuffer::new(width, height),
        }
    }

    /// Create a new frame with the given dimensions filled with the specified color
    pub fn new_filled(width: u32, height: u32, color: [u8; 3]) -> Self {
        Self {
            buffer: ImageBuffer::from_pixel(width, height, Rgb(color)),
        }
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    /// Get a pixel at the given coordinates (returns RGB array)
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.buffer.get_pixel(x, y).0
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, color: [u8; 3]) {
        self.buffer.put_pixel(x, y, Rgb(color));
    }

    /// Paint the whole frame opaque black
    pub fn clear(&mut self) {
        self.buffer.fill(0);
    }

    /// Copy `source` onto this frame, rescaling when the sizes differ
    pub fn draw_source(&mut self, source: &Frame) {
        if source.width() == self.width() && source.height() == self.height() {
            self.buffer.copy_from_slice(source.as_bytes());
        } else {
            self.buffer = imageops::resize(
                &source.buffer,
                self.width(),
                self.height(),
                imageops::FilterType::Triangle,
            );
        }
    }

    /// Raw interleaved RGB bytes, row-major
    pub fn as_bytes(&self) -> &[u8] {
        self.buffer.as_raw()
    }

    /// Mutable interleaved RGB bytes, row-major
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut *self.buffer
    }

    /// Create a frame from raw RGB bytes
    pub fn from_rgb_bytes(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        ImageBuffer::from_raw(width, height, data).map(|buffer| Self { buffer })
    }

    /// Bytes in one row of pixels
    pub fn stride(&self) -> usize {
        self.width() as usize * 3
    }
}

/// Output surface dimensions for a render job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputGeometry {
    pub width: u32,
    pub height: u32,
}

impl OutputGeometry {
    /// Fit the source into the mode's height cap, keeping the aspect ratio.
    ///
    /// Sources smaller than the cap are not upscaled. Both dimensions are
    /// rounded down to even numbers for 4:2:0 chroma subsampling.
    pub fn fit(source_width: u32, source_height: u32, max_height: u32) -> Self {
        let source_width = source_width.max(2);
        let source_height = source_height.max(2);

        let height = source_height.min(max_height);
        let width = (source_width as f64 * height as f64 / source_height as f64).round() as u32;

        Self {
            width: round_even(width),
            height: round_even(height),
        }
    }

    pub fn for_mode(source_width: u32, source_height: u32, mode: RenderMode, turbo_max: u32, quality_max: u32) -> Self {
        let cap = match mode {
            RenderMode::Turbo => turbo_max,
            RenderMode::Quality => quality_max,
        };
        Self::fit(source_width, source_height, cap)
    }

    /// Bytes in one rgb24 frame of this size
    pub fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    pub fn blank_frame(&self) -> Frame {
        Frame::new_black(self.width, self.height)
    }
}

fn round_even(value: u32) -> u32 {
    (value & !1).max(2)
}
