// SPDX-License-Identifier: MPL-2.0

//! CPU transformation stage
//!
//! A [`FrameTransform`] reads a premultiplied BGRA [`Frame`] and writes an
//! [`OutputFrame`] of the same size. [`FilterTransform`] provides the
//! built-in operations; [`apply`] wraps any transform with the dimension
//! check and panic isolation the frame callback relies on.

use super::frame::{BYTES_PER_PIXEL, Frame, OutputFrame};
use crate::errors::TransformError;
use image::{ImageBuffer, Rgba};
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};

/// Gaussian sigma matching the spread of a 15x15 box kernel
const BLUR_SIGMA: f32 = 4.3;

/// Gradient magnitude at which a pixel counts as an edge
const EDGE_THRESHOLD: f32 = 96.0;

/// Luma at or above which a pixel belongs to a bright region
const REGION_LUMA_THRESHOLD: u8 = 128;

/// Regions shorter than this are ignored
const MIN_REGION_HEIGHT: usize = 15;

/// Share of the bounding box a region must cover
const MIN_REGION_FILL: f32 = 0.6;

/// Accepted range of `|1 - width / height|`
const REGION_RATIO_RANGE: (f32, f32) = (2.5, 3.5);

/// Outline thickness in pixels
const REGION_OUTLINE: usize = 3;

/// Premultiplied BGRA magenta
const REGION_COLOR: [u8; 4] = [255, 0, 255, 255];

/// Built-in transformations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    /// Copy the input unchanged
    Passthrough,
    /// Soft blur with a wide kernel
    Blur,
    /// Horizontal mirror
    Flip,
    /// Luma only, alpha kept
    Grayscale,
    /// White-on-black edge map, fully opaque
    #[default]
    Edges,
    /// Edge map with plate-shaped bright regions outlined in magenta
    Regions,
}

impl FilterType {
    pub const ALL: [FilterType; 6] = [
        FilterType::Passthrough,
        FilterType::Blur,
        FilterType::Flip,
        FilterType::Grayscale,
        FilterType::Edges,
        FilterType::Regions,
    ];
}

impl std::fmt::Display for FilterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FilterType::Passthrough => "passthrough",
            FilterType::Blur => "blur",
            FilterType::Flip => "flip",
            FilterType::Grayscale => "grayscale",
            FilterType::Edges => "edges",
            FilterType::Regions => "regions",
        };
        f.write_str(name)
    }
}

/// Image transformation applied to every captured frame
///
/// Implementations run synchronously on the frame delivery thread.
pub trait FrameTransform: Send + Sync {
    fn process(&self, input: &Frame, output: &mut OutputFrame) -> Result<(), TransformError>;
}

/// Run `transform` on `input` and return the frozen result
///
/// A panic inside the transform is reported as a `TransformError` instead
/// of unwinding into the caller.
pub fn apply(transform: &dyn FrameTransform, input: &Frame) -> Result<Frame, TransformError> {
    let mut output = OutputFrame::like(input);

    let result = panic::catch_unwind(AssertUnwindSafe(|| transform.process(input, &mut output)));
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(e),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "transform panicked".to_string());
            return Err(TransformError(message));
        }
    }

    if output.width() != input.width() || output.height() != input.height() {
        return Err(TransformError("output dimensions changed".to_string()));
    }
    Ok(output.freeze())
}

/// Transform selected by [`FilterType`]
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterTransform {
    filter: FilterType,
}

impl FilterTransform {
    pub fn new(filter: FilterType) -> Self {
        Self { filter }
    }

    pub fn filter(&self) -> FilterType {
        self.filter
    }
}

impl FrameTransform for FilterTransform {
    fn process(&self, input: &Frame, output: &mut OutputFrame) -> Result<(), TransformError> {
        match self.filter {
            FilterType::Passthrough => write_output(output, input.data()),
            FilterType::Blur => {
                let blurred = image::imageops::blur(&as_image(input)?, BLUR_SIGMA);
                write_output(output, blurred.as_raw())
            }
            FilterType::Flip => {
                let flipped = image::imageops::flip_horizontal(&as_image(input)?);
                write_output(output, flipped.as_raw())
            }
            FilterType::Grayscale => {
                grayscale(input, output);
                Ok(())
            }
            FilterType::Edges => {
                edges(input, output);
                Ok(())
            }
            FilterType::Regions => {
                edges(input, output);
                outline_regions(input, output);
                Ok(())
            }
        }
    }
}

fn write_output(output: &mut OutputFrame, data: &[u8]) -> Result<(), TransformError> {
    if output.copy_from(data) {
        Ok(())
    } else {
        Err(TransformError(format!(
            "transformed buffer is {} bytes, expected {}x{} BGRA",
            data.len(),
            output.width(),
            output.height()
        )))
    }
}

/// View the BGRA bytes as a 4-channel image buffer
///
/// Channel order is irrelevant to the geometric operations used here.
fn as_image(frame: &Frame) -> Result<ImageBuffer<Rgba<u8>, Vec<u8>>, TransformError> {
    ImageBuffer::from_raw(frame.width(), frame.height(), frame.data().to_vec())
        .ok_or_else(|| TransformError("frame buffer does not match its dimensions".to_string()))
}

#[inline]
fn luma(px: &[u8]) -> u8 {
    // BT.601 weights on B, G, R
    ((29 * px[0] as u32 + 150 * px[1] as u32 + 77 * px[2] as u32) >> 8) as u8
}

fn grayscale(input: &Frame, output: &mut OutputFrame) {
    let src = input.data().chunks_exact(BYTES_PER_PIXEL);
    for (dst, px) in output.data_mut().chunks_exact_mut(BYTES_PER_PIXEL).zip(src) {
        let l = luma(px);
        dst.copy_from_slice(&[l, l, l, px[3]]);
    }
}

/// Sobel gradient on luma, thresholded to a binary edge map
fn edges(input: &Frame, output: &mut OutputFrame) {
    let width = input.width() as usize;
    let height = input.height() as usize;
    let lumas: Vec<f32> = input
        .data()
        .chunks_exact(BYTES_PER_PIXEL)
        .map(|px| luma(px) as f32)
        .collect();

    let sample = |x: isize, y: isize| -> f32 {
        let x = x.clamp(0, width as isize - 1) as usize;
        let y = y.clamp(0, height as isize - 1) as usize;
        lumas[y * width + x]
    };

    let out = output.data_mut();
    for py in 0..height {
        for px in 0..width {
            let (x, y) = (px as isize, py as isize);

            let tl = sample(x - 1, y - 1);
            let tm = sample(x, y - 1);
            let tr = sample(x + 1, y - 1);
            let ml = sample(x - 1, y);
            let mr = sample(x + 1, y);
            let bl = sample(x - 1, y + 1);
            let bm = sample(x, y + 1);
            let br = sample(x + 1, y + 1);

            let gx = -tl - 2.0 * ml - bl + tr + 2.0 * mr + br;
            let gy = -tl - 2.0 * tm - tr + bl + 2.0 * bm + br;
            let value = if (gx * gx + gy * gy).sqrt() >= EDGE_THRESHOLD {
                255
            } else {
                0
            };

            let offset = (py * width + px) * BYTES_PER_PIXEL;
            out[offset..offset + BYTES_PER_PIXEL].copy_from_slice(&[value, value, value, 255]);
        }
    }
}

/// Bounding box and pixel count of one 4-connected bright region
#[derive(Debug, Clone, Copy)]
struct Region {
    left: usize,
    top: usize,
    right: usize,
    bottom: usize,
    pixels: usize,
}

impl Region {
    fn width(&self) -> usize {
        self.right - self.left + 1
    }

    fn height(&self) -> usize {
        self.bottom - self.top + 1
    }

    /// Mostly solid and elongated like a number plate
    fn is_plate_shaped(&self) -> bool {
        let (width, height) = (self.width(), self.height());
        if height < MIN_REGION_HEIGHT {
            return false;
        }
        let fill = self.pixels as f32 / (width * height) as f32;
        let ratio = (1.0 - width as f32 / height as f32).abs();
        fill > MIN_REGION_FILL && ratio > REGION_RATIO_RANGE.0 && ratio < REGION_RATIO_RANGE.1
    }
}

/// Label bright regions by flood fill and outline the plate-shaped ones
fn outline_regions(input: &Frame, output: &mut OutputFrame) {
    let width = input.width() as usize;
    let height = input.height() as usize;
    let bright: Vec<bool> = input
        .data()
        .chunks_exact(BYTES_PER_PIXEL)
        .map(|px| luma(px) >= REGION_LUMA_THRESHOLD)
        .collect();

    let mut seen = vec![false; bright.len()];
    let mut stack = Vec::new();
    for start in 0..bright.len() {
        if !bright[start] || seen[start] {
            continue;
        }
        seen[start] = true;
        stack.push(start);

        let mut region = Region {
            left: start % width,
            top: start / width,
            right: start % width,
            bottom: start / width,
            pixels: 0,
        };
        while let Some(index) = stack.pop() {
            let (x, y) = (index % width, index / width);
            region.pixels += 1;
            region.left = region.left.min(x);
            region.right = region.right.max(x);
            region.top = region.top.min(y);
            region.bottom = region.bottom.max(y);

            let neighbours = [
                (x > 0).then(|| index - 1),
                (x + 1 < width).then(|| index + 1),
                (y > 0).then(|| index - width),
                (y + 1 < height).then(|| index + width),
            ];
            for next in neighbours.into_iter().flatten() {
                if bright[next] && !seen[next] {
                    seen[next] = true;
                    stack.push(next);
                }
            }
        }

        if region.is_plate_shaped() {
            draw_outline(output.data_mut(), width, &region);
        }
    }
}

fn draw_outline(out: &mut [u8], width: usize, region: &Region) {
    for y in region.top..=region.bottom {
        for x in region.left..=region.right {
            let on_border = x - region.left < REGION_OUTLINE
                || region.right - x < REGION_OUTLINE
                || y - region.top < REGION_OUTLINE
                || region.bottom - y < REGION_OUTLINE;
            if on_border {
                let offset = (y * width + x) * BYTES_PER_PIXEL;
                out[offset..offset + BYTES_PER_PIXEL].copy_from_slice(&REGION_COLOR);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Left half black, right half white
    fn split_frame(width: u32, height: u32) -> Frame {
        let mut data = Vec::new();
        for _ in 0..height {
            for x in 0..width {
                let v = if x < width / 2 { 0 } else { 255 };
                data.extend_from_slice(&[v, v, v, 255]);
            }
        }
        Frame::from_bgra_premultiplied(width, height, data).expect("frame")
    }

    #[test]
    fn test_every_filter_keeps_dimensions() {
        let input = split_frame(8, 6);
        for filter in FilterType::ALL {
            let out = apply(&FilterTransform::new(filter), &input).expect("transform");
            assert_eq!((out.width(), out.height()), (8, 6), "{filter}");
        }
    }

    #[test]
    fn test_flip_mirrors_horizontally() {
        let out = apply(&FilterTransform::new(FilterType::Flip), &split_frame(4, 1)).expect("flip");
        assert_eq!(out.pixel(0, 0), Some([255, 255, 255, 255]));
        assert_eq!(out.pixel(3, 0), Some([0, 0, 0, 255]));
    }

    #[test]
    fn test_edges_mark_the_boundary() {
        let out = apply(&FilterTransform::new(FilterType::Edges), &split_frame(8, 4)).expect("edges");
        assert_eq!(out.pixel(0, 1), Some([0, 0, 0, 255]));
        assert_eq!(out.pixel(4, 1), Some([255, 255, 255, 255]));
        assert_eq!(out.pixel(7, 1), Some([0, 0, 0, 255]));
    }

    #[test]
    fn test_grayscale_keeps_alpha() {
        let input = Frame::filled(2, 2, [0, 0, 128, 128]);
        let out = apply(&FilterTransform::new(FilterType::Grayscale), &input).expect("gray");
        let [b, g, r, a] = out.pixel(1, 1).expect("pixel");
        assert_eq!((b, a), (r, 128));
        assert_eq!(g, r);
    }

    #[test]
    fn test_blur_of_uniform_frame_is_uniform() {
        let input = Frame::filled(64, 64, [40, 80, 120, 255]);
        let out = apply(&FilterTransform::new(FilterType::Blur), &input).expect("blur");
        let [b, g, r, a] = out.pixel(32, 32).expect("pixel");
        assert!(b.abs_diff(40) <= 2 && g.abs_diff(80) <= 2 && r.abs_diff(120) <= 2);
        assert_eq!(a, 255);
    }

    /// Black frame with one white rectangle
    fn with_rectangle(width: u32, height: u32, rect: (u32, u32, u32, u32)) -> Frame {
        let (left, top, w, h) = rect;
        let mut data = Vec::new();
        for y in 0..height {
            for x in 0..width {
                let inside = (left..left + w).contains(&x) && (top..top + h).contains(&y);
                let v = if inside { 255 } else { 0 };
                data.extend_from_slice(&[v, v, v, 255]);
            }
        }
        Frame::from_bgra_premultiplied(width, height, data).expect("frame")
    }

    fn count_color(frame: &Frame, color: [u8; 4]) -> usize {
        frame
            .data()
            .chunks_exact(BYTES_PER_PIXEL)
            .filter(|px| *px == color)
            .count()
    }

    #[test]
    fn test_regions_outlines_plate_shaped_area() {
        // 64x16: |1 - 64/16| = 3
        let input = with_rectangle(80, 30, (4, 6, 64, 16));
        let out = apply(&FilterTransform::new(FilterType::Regions), &input).expect("regions");

        assert_eq!(out.pixel(4, 6), Some(REGION_COLOR));
        assert_eq!(out.pixel(67, 21), Some(REGION_COLOR));
        assert_eq!(out.pixel(6, 14), Some(REGION_COLOR));
        // Interior past the outline keeps the edge map
        assert_eq!(out.pixel(36, 14), Some([0, 0, 0, 255]));
        // Outside the box
        assert_eq!(out.pixel(1, 1), Some([0, 0, 0, 255]));
    }

    #[test]
    fn test_regions_ignores_other_shapes() {
        let square = with_rectangle(40, 40, (10, 10, 16, 16));
        let short = with_rectangle(80, 30, (4, 6, 40, 10));
        for input in [square, short] {
            let out = apply(&FilterTransform::new(FilterType::Regions), &input).expect("regions");
            assert_eq!(count_color(&out, REGION_COLOR), 0);
        }
    }

    #[test]
    fn test_wrong_sized_buffer_is_an_error() {
        let mut output = OutputFrame::new(2, 2);
        let err = write_output(&mut output, &[0; 12]).expect_err("short buffer");
        assert!(err.0.contains("12 bytes"), "{}", err.0);
        assert_eq!(output.freeze(), Frame::filled(2, 2, [0; 4]));

        let mut output = OutputFrame::new(2, 2);
        assert!(write_output(&mut output, &[7; 16]).is_ok());
    }

    #[test]
    fn test_panicking_transform_is_contained() {
        struct Explodes;
        impl FrameTransform for Explodes {
            fn process(&self, _: &Frame, _: &mut OutputFrame) -> Result<(), TransformError> {
                panic!("boom");
            }
        }

        let err = apply(&Explodes, &Frame::filled(1, 1, [0; 4])).expect_err("panic");
        assert_eq!(err, TransformError("boom".to_string()));
    }
}
