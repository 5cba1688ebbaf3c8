// SPDX-License-Identifier: GPL-3.0-only

//! QR code text recognition
//!
//! Converts frames to grayscale, downscales them to a bounded size and
//! decodes every QR code found with `rqrr`. Each decoded payload becomes
//! one line of text.

use super::TextRecognizer;
use crate::constants::analysis;
use crate::errors::AnalysisError;
use crate::media::Frame;
use image::GrayImage;
use image::imageops::{self, FilterType as ResizeFilter};
use tracing::{debug, trace};

/// QR code recognizer
pub struct QrTextRecognizer {
    /// Maximum dimension for processing (frames are downscaled to this)
    max_dimension: u32,
}

impl Default for QrTextRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl QrTextRecognizer {
    /// Create a new QR recognizer with default settings
    pub fn new() -> Self {
        Self::with_max_dimension(analysis::DEFAULT_MAX_DIMENSION)
    }

    /// Create a QR recognizer with custom max dimension
    pub fn with_max_dimension(max_dimension: u32) -> Self {
        Self {
            max_dimension: max_dimension.max(1),
        }
    }
}

impl TextRecognizer for QrTextRecognizer {
    fn recognize_text(&self, frame: &Frame) -> Result<String, AnalysisError> {
        let start = std::time::Instant::now();

        if frame.width() == 0 || frame.height() == 0 {
            return Err(AnalysisError("frame has no pixels".to_string()));
        }

        let gray = prepare_grayscale(frame, self.max_dimension)?;
        let (width, height) = gray.dimensions();
        trace!(width, height, "Prepared grayscale image for QR detection");

        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
            width as usize,
            height as usize,
            |x, y| gray.get_pixel(x as u32, y as u32).0[0],
        );
        let grids = prepared.detect_grids();

        let mut text = String::new();
        for grid in grids {
            match grid.decode() {
                Ok((_meta, content)) => {
                    debug!(content = %content, "Decoded QR code");
                    text.push_str(&content);
                    text.push('\n');
                }
                Err(e) => debug!(error = %e, "Failed to decode QR code"),
            }
        }

        trace!(
            total_ms = start.elapsed().as_millis(),
            found = !text.is_empty(),
            "QR recognition complete"
        );
        Ok(text)
    }
}

/// Luma plane of the frame, downscaled so neither side exceeds `max_dimension`
fn prepare_grayscale(frame: &Frame, max_dimension: u32) -> Result<GrayImage, AnalysisError> {
    let luma: Vec<u8> = frame
        .data()
        .chunks_exact(4)
        .map(|px| ((29 * px[0] as u32 + 150 * px[1] as u32 + 77 * px[2] as u32) >> 8) as u8)
        .collect();
    let gray = GrayImage::from_raw(frame.width(), frame.height(), luma)
        .ok_or_else(|| AnalysisError("frame buffer does not match its dimensions".to_string()))?;

    let (width, height) = (frame.width(), frame.height());
    if width <= max_dimension && height <= max_dimension {
        return Ok(gray);
    }

    let scale = (width as f32 / max_dimension as f32).max(height as f32 / max_dimension as f32);
    let new_width = ((width as f32 / scale) as u32).max(1);
    let new_height = ((height as f32 / scale) as u32).max(1);
    Ok(imageops::resize(&gray, new_width, new_height, ResizeFilter::Triangle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_frame_has_no_text() {
        let frame = Frame::filled(64, 48, [255, 255, 255, 255]);
        let text = QrTextRecognizer::new().recognize_text(&frame).expect("recognize");
        assert!(text.is_empty());
    }

    #[test]
    fn test_large_frames_are_downscaled() {
        let frame = Frame::filled(1280, 720, [0, 0, 0, 255]);
        let gray = prepare_grayscale(&frame, 640).expect("gray");
        assert_eq!(gray.dimensions(), (640, 360));

        let small = Frame::filled(320, 240, [0, 0, 0, 255]);
        assert_eq!(prepare_grayscale(&small, 640).expect("gray").dimensions(), (320, 240));
    }
}
