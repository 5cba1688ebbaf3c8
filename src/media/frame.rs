// SPDX-License-Identifier: GPL-3.0-only

//! Published frame types
//!
//! Every frame past the capture boundary is BGRA8 with premultiplied alpha,
//! tightly packed (stride = width * 4). A [`Frame`] is immutable; cloning it
//! shares the same snapshot. Transformation stages write into an
//! [`OutputFrame`] and freeze it once done.

use image::RgbaImage;
use std::sync::Arc;

/// Bytes per pixel of the pipeline's pixel format
pub const BYTES_PER_PIXEL: usize = 4;

/// Immutable premultiplied BGRA8 image
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Arc<[u8]>,
}

impl Frame {
    /// Wrap premultiplied BGRA bytes; `None` if the length does not match
    pub fn from_bgra_premultiplied(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(BYTES_PER_PIXEL)?;
        if data.len() != expected {
            return None;
        }
        Some(Self {
            width,
            height,
            data: Arc::from(data),
        })
    }

    /// A frame filled with one premultiplied BGRA value
    pub fn filled(width: u32, height: u32, bgra: [u8; 4]) -> Self {
        let pixels = width as usize * height as usize;
        let data: Vec<u8> = bgra.iter().copied().cycle().take(pixels * BYTES_PER_PIXEL).collect();
        Self {
            width,
            height,
            data: Arc::from(data),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per row
    pub fn stride(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    /// Raw premultiplied BGRA bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// BGRA value at (x, y), `None` outside the frame
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = y as usize * self.stride() + x as usize * BYTES_PER_PIXEL;
        let px = &self.data[offset..offset + BYTES_PER_PIXEL];
        Some([px[0], px[1], px[2], px[3]])
    }

    /// True when both frames share the same underlying snapshot
    pub fn shares_buffer_with(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Straight-alpha RGBA copy for rendering or saving
    pub fn to_rgba_image(&self) -> RgbaImage {
        let mut rgba = Vec::with_capacity(self.data.len());
        for px in self.data.chunks_exact(BYTES_PER_PIXEL) {
            let [b, g, r, a] = [px[0], px[1], px[2], px[3]];
            rgba.extend_from_slice(&[unpremultiply(r, a), unpremultiply(g, a), unpremultiply(b, a), a]);
        }
        RgbaImage::from_raw(self.width, self.height, rgba).unwrap_or_else(|| {
            // Length is validated on construction
            RgbaImage::new(self.width, self.height)
        })
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Frame({}x{} BGRA8 premultiplied)", self.width, self.height)
    }
}

#[inline]
fn unpremultiply(channel: u8, alpha: u8) -> u8 {
    match alpha {
        0 => 0,
        255 => channel,
        a => ((channel as u32 * 255 + a as u32 / 2) / a as u32).min(255) as u8,
    }
}

/// Writable destination for a transformation stage
///
/// Always matches the dimensions of the frame it was allocated for.
#[derive(Debug)]
pub struct OutputFrame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl OutputFrame {
    /// Zeroed (transparent black) buffer of the given size
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * BYTES_PER_PIXEL],
        }
    }

    /// Fresh buffer with the same dimensions as `input`
    pub fn like(input: &Frame) -> Self {
        Self::new(input.width(), input.height())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Replace the contents; `false` if `data` has the wrong length
    pub fn copy_from(&mut self, data: &[u8]) -> bool {
        if data.len() != self.data.len() {
            return false;
        }
        self.data.copy_from_slice(data);
        true
    }

    /// Finish writing and produce an immutable frame
    pub fn freeze(self) -> Frame {
        Frame {
            width: self.width,
            height: self.height,
            data: Arc::from(self.data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_is_validated() {
        assert!(Frame::from_bgra_premultiplied(2, 2, vec![0; 16]).is_some());
        assert!(Frame::from_bgra_premultiplied(2, 2, vec![0; 15]).is_none());
    }

    #[test]
    fn test_clone_shares_snapshot() {
        let frame = Frame::filled(4, 4, [1, 2, 3, 255]);
        let copy = frame.clone();
        assert!(copy.shares_buffer_with(&frame));
        assert_eq!(copy.pixel(3, 3), Some([1, 2, 3, 255]));
        assert_eq!(copy.pixel(4, 0), None);
    }

    #[test]
    fn test_rgba_image_unpremultiplies() {
        // Half-transparent red, premultiplied
        let frame = Frame::filled(1, 1, [0, 0, 128, 128]);
        let image = frame.to_rgba_image();
        assert_eq!(image.get_pixel(0, 0).0, [255, 0, 0, 128]);
    }

    #[test]
    fn test_output_frame_matches_input() {
        let input = Frame::filled(3, 2, [0, 0, 0, 255]);
        let mut output = OutputFrame::like(&input);
        assert_eq!((output.width(), output.height()), (3, 2));
        assert!(!output.copy_from(&[0; 4]));
        assert!(output.copy_from(input.data()));
        assert_eq!(output.freeze(), input);
    }
}
