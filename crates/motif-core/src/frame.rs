//! CPU-side pixel buffers.
//!
//! Used for uploading source images, reading render targets back and for the
//! software backend's texture storage. Rows are stored in memory order; what
//! row 0 means on screen is decided by the owning texture's `ImageOrigin`.

use serde::{Deserialize, Serialize};

use crate::error::{MotifError, Result};

/// Pixel format of a texture or render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 8-bit RGBA (32 bits per pixel)
    #[default]
    Rgba8,
    /// 8-bit BGRA (32 bits per pixel)
    Bgra8,
    /// 8-bit alpha only
    Alpha8,
}

impl PixelFormat {
    /// Bytes per pixel.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgba8 | Self::Bgra8 => 4,
            Self::Alpha8 => 1,
        }
    }

    /// Whether the format stores color channels.
    pub fn is_color(self) -> bool {
        !matches!(self, Self::Alpha8)
    }
}

/// An RGBA8 image in CPU memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Bytes per row (may include padding)
    pub stride: usize,
    data: Vec<u8>,
}

impl FrameBuffer {
    /// Create a transparent frame buffer with the given dimensions.
    pub fn new(width: u32, height: u32) -> Self {
        // Align stride to 64 bytes for SIMD and GPU compatibility
        let min_stride = width as usize * 4;
        let stride = (min_stride + 63) & !63;
        Self {
            width,
            height,
            stride,
            data: vec![0u8; stride * height as usize],
        }
    }

    /// Create a frame from tightly packed RGBA8 pixels.
    pub fn from_pixels(width: u32, height: u32, pixels: &[u8]) -> Result<Self> {
        let row_bytes = width as usize * 4;
        if pixels.len() != row_bytes * height as usize {
            return Err(MotifError::InvalidParameter(format!(
                "expected {} bytes for {}x{} RGBA8, got {}",
                row_bytes * height as usize,
                width,
                height,
                pixels.len()
            )));
        }
        let mut frame = Self::new(width, height);
        if row_bytes > 0 {
            for (y, src) in pixels.chunks_exact(row_bytes).enumerate() {
                frame.row_mut(y as u32).copy_from_slice(src);
            }
        }
        Ok(frame)
    }

    /// Create a frame filled with one color.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut frame = Self::new(width, height);
        for y in 0..height {
            for px in frame.row_mut(y).chunks_exact_mut(4) {
                px.copy_from_slice(&rgba);
            }
        }
        frame
    }

    /// Get a row of pixel data.
    #[inline]
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.width as usize * 4]
    }

    /// Get a mutable row of pixel data.
    #[inline]
    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = y as usize * self.stride;
        let end = start + self.width as usize * 4;
        &mut self.data[start..end]
    }

    /// Read one pixel.
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = y as usize * self.stride + x as usize * 4;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    /// Write one pixel.
    #[inline]
    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        let i = y as usize * self.stride + x as usize * 4;
        self.data[i..i + 4].copy_from_slice(&rgba);
    }

    /// Tightly packed RGBA8 pixels, row 0 first.
    pub fn to_packed(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.width as usize * self.height as usize * 4);
        for y in 0..self.height {
            out.extend_from_slice(self.row(y));
        }
        out
    }

    /// Copy of this frame with the row order reversed.
    pub fn flip_vertical(&self) -> Self {
        let mut out = Self::new(self.width, self.height);
        for y in 0..self.height {
            out.row_mut(self.height - 1 - y).copy_from_slice(self.row(y));
        }
        out
    }

    /// Copy of the `width`x`height` block starting at (`x`, `y`).
    pub fn sub_frame(&self, x: u32, y: u32, width: u32, height: u32) -> Result<Self> {
        if x + width > self.width || y + height > self.height {
            return Err(MotifError::InvalidParameter(format!(
                "sub frame {}x{}+{}+{} outside {}x{}",
                width, height, x, y, self.width, self.height
            )));
        }
        let mut out = Self::new(width, height);
        for row in 0..height {
            let src = &self.row(y + row)[x as usize * 4..(x + width) as usize * 4];
            out.row_mut(row).copy_from_slice(src);
        }
        Ok(out)
    }

    /// Memory usage of this frame in bytes.
    pub fn memory_size(&self) -> usize {
        self.data.len()
    }

    /// Create a test pattern frame: color bars across, red ramp left to
    /// right, green ramp top to bottom. Every row and column differs, so a
    /// misplaced flip or offset is always visible.
    pub fn test_pattern(width: u32, height: u32) -> Self {
        let mut frame = Self::new(width, height);
        let bars: [u8; 8] = [255, 224, 192, 160, 128, 96, 64, 32];
        for y in 0..height {
            let g = ramp(y, height);
            let row = frame.row_mut(y);
            for x in 0..width {
                let i = (x * 4) as usize;
                let bar = (x * 8 / width.max(1)) as usize;
                row[i..i + 4].copy_from_slice(&[ramp(x, width), g, bars[bar.min(7)], 255]);
            }
        }
        frame
    }
}

fn ramp(v: u32, len: u32) -> u8 {
    if len <= 1 {
        0
    } else {
        (v * 255 / (len - 1)) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgba8_frame_size() {
        let frame = FrameBuffer::new(1920, 1080);
        assert!(frame.memory_size() >= 1920 * 1080 * 4);
        assert_eq!(frame.stride % 64, 0);
    }

    #[test]
    fn test_from_pixels_rejects_bad_length() {
        assert!(FrameBuffer::from_pixels(2, 2, &[0u8; 15]).is_err());
        let f = FrameBuffer::from_pixels(2, 1, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        assert_eq!(f.pixel(1, 0), [5, 6, 7, 8]);
    }

    #[test]
    fn test_flip_vertical_round_trip() {
        let frame = FrameBuffer::test_pattern(16, 9);
        let flipped = frame.flip_vertical();
        assert_eq!(flipped.pixel(3, 0), frame.pixel(3, 8));
        assert_ne!(flipped, frame);
        assert_eq!(flipped.flip_vertical(), frame);
    }

    #[test]
    fn test_test_pattern_rows_differ() {
        let frame = FrameBuffer::test_pattern(64, 64);
        assert_eq!(frame.pixel(0, 0), [0, 0, 255, 255]);
        assert_ne!(frame.row(0), frame.row(63));
    }

    #[test]
    fn test_sub_frame() {
        let frame = FrameBuffer::test_pattern(10, 10);
        let sub = frame.sub_frame(2, 3, 4, 5).unwrap();
        assert_eq!(sub.pixel(0, 0), frame.pixel(2, 3));
        assert_eq!(sub.pixel(3, 4), frame.pixel(5, 7));
        assert!(frame.sub_frame(8, 8, 4, 4).is_err());
    }
}
