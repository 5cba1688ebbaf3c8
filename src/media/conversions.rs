// SPDX-License-Identifier: GPL-3.0-only

//! Raw camera frame to premultiplied BGRA conversion
//!
//! YUV formats are decoded with BT.601 limited-range coefficients in 7-bit
//! fixed point. Straight-alpha RGBA/BGRA input is premultiplied; formats
//! without alpha come out opaque.

use super::frame::{BYTES_PER_PIXEL, Frame};
use crate::backends::camera::types::{CameraFrame, PixelFormat};
use crate::errors::ConversionError;

/// Convert a raw frame into the pipeline's pixel format
///
/// The output owns its bytes, so the capture buffer may be reused as soon
/// as this returns.
pub fn to_bgra_premultiplied(frame: &CameraFrame) -> Result<Frame, ConversionError> {
    if frame.is_empty() {
        return Err(ConversionError::NoVideoPayload);
    }

    let layout = Layout::for_frame(frame)?;
    if frame.data.len() < layout.required {
        return Err(ConversionError::LengthMismatch {
            expected: layout.required,
            actual: frame.data.len(),
        });
    }

    let width = frame.width as usize;
    let height = frame.height as usize;
    let src: &[u8] = &frame.data;
    let mut out = Vec::with_capacity(width * height * BYTES_PER_PIXEL);

    for y in 0..height {
        let row = &src[y * layout.stride..];
        match frame.format {
            PixelFormat::BGRA => {
                for px in row[..width * 4].chunks_exact(4) {
                    out.extend_from_slice(&premultiply([px[0], px[1], px[2]], px[3]));
                }
            }
            PixelFormat::RGBA => {
                for px in row[..width * 4].chunks_exact(4) {
                    out.extend_from_slice(&premultiply([px[2], px[1], px[0]], px[3]));
                }
            }
            PixelFormat::RGB24 => {
                for px in row[..width * 3].chunks_exact(3) {
                    out.extend_from_slice(&[px[2], px[1], px[0], 255]);
                }
            }
            PixelFormat::Gray8 => {
                for &luma in &row[..width] {
                    out.extend_from_slice(&[luma, luma, luma, 255]);
                }
            }
            PixelFormat::YUYV | PixelFormat::UYVY => {
                let (y_at, u_at, v_at) = if frame.format == PixelFormat::YUYV {
                    (0, 1, 3)
                } else {
                    (1, 0, 2)
                };
                for x in 0..width {
                    let pair = (x / 2) * 4;
                    let luma = row[x * 2 + y_at];
                    let u = row.get(pair + u_at).copied().unwrap_or(128);
                    let v = row.get(pair + v_at).copied().unwrap_or(128);
                    out.extend_from_slice(&yuv_to_bgra(luma, u, v));
                }
            }
            PixelFormat::NV12 => {
                let uv_row = &src[layout.chroma_offset + (y / 2) * layout.chroma_stride..];
                for x in 0..width {
                    let uv = (x / 2) * 2;
                    out.extend_from_slice(&yuv_to_bgra(row[x], uv_row[uv], uv_row[uv + 1]));
                }
            }
            PixelFormat::I420 => {
                let chroma_row = (y / 2) * layout.chroma_stride;
                let u_row = &src[layout.chroma_offset + chroma_row..];
                let v_row = &src[layout.second_chroma_offset + chroma_row..];
                for x in 0..width {
                    out.extend_from_slice(&yuv_to_bgra(row[x], u_row[x / 2], v_row[x / 2]));
                }
            }
        }
    }

    Frame::from_bgra_premultiplied(frame.width, frame.height, out).ok_or(
        ConversionError::DimensionsOverflow {
            width: frame.width,
            height: frame.height,
        },
    )
}

/// Byte layout of a raw frame
struct Layout {
    stride: usize,
    chroma_stride: usize,
    chroma_offset: usize,
    second_chroma_offset: usize,
    /// Minimum payload length that covers every sample read
    required: usize,
}

impl Layout {
    fn for_frame(frame: &CameraFrame) -> Result<Self, ConversionError> {
        let overflow = ConversionError::DimensionsOverflow {
            width: frame.width,
            height: frame.height,
        };
        let width = frame.width as usize;
        let height = frame.height as usize;
        let min_stride = width
            .checked_mul(bytes_per_luma_row(frame.format))
            .ok_or(overflow.clone())?;

        // Zero stride means tightly packed
        let stride = if frame.stride == 0 {
            min_stride
        } else {
            frame.stride as usize
        };
        if stride < min_stride {
            return Err(ConversionError::InvalidStride {
                stride: frame.stride,
                min: u32::try_from(min_stride).unwrap_or(u32::MAX),
            });
        }

        let luma_rows = stride.checked_mul(height - 1).ok_or(overflow.clone())?;
        let chroma_width = width.div_ceil(2);
        let chroma_height = height.div_ceil(2);

        let layout = match frame.format {
            PixelFormat::NV12 => {
                let chroma_offset = stride.checked_mul(height).ok_or(overflow.clone())?;
                let chroma_stride = stride.max(chroma_width * 2);
                let required = chroma_stride
                    .checked_mul(chroma_height - 1)
                    .and_then(|n| n.checked_add(chroma_offset + chroma_width * 2))
                    .ok_or(overflow)?;
                Self {
                    stride,
                    chroma_stride,
                    chroma_offset,
                    second_chroma_offset: 0,
                    required,
                }
            }
            PixelFormat::I420 => {
                let chroma_offset = stride.checked_mul(height).ok_or(overflow.clone())?;
                let chroma_stride = stride.div_ceil(2).max(chroma_width);
                let plane = chroma_stride
                    .checked_mul(chroma_height)
                    .ok_or(overflow.clone())?;
                let second_chroma_offset = chroma_offset.checked_add(plane).ok_or(overflow.clone())?;
                let required = second_chroma_offset
                    .checked_add(plane - chroma_stride + chroma_width)
                    .ok_or(overflow)?;
                Self {
                    stride,
                    chroma_stride,
                    chroma_offset,
                    second_chroma_offset,
                    required,
                }
            }
            _ => Self {
                stride,
                chroma_stride: 0,
                chroma_offset: 0,
                second_chroma_offset: 0,
                required: luma_rows.checked_add(min_stride).ok_or(overflow)?,
            },
        };

        Ok(layout)
    }
}

fn bytes_per_luma_row(format: PixelFormat) -> usize {
    match format {
        PixelFormat::BGRA | PixelFormat::RGBA => 4,
        PixelFormat::RGB24 => 3,
        PixelFormat::YUYV | PixelFormat::UYVY => 2,
        PixelFormat::Gray8 | PixelFormat::NV12 | PixelFormat::I420 => 1,
    }
}

#[inline]
fn premultiply([b, g, r]: [u8; 3], alpha: u8) -> [u8; 4] {
    let scale = |c: u8| ((c as u32 * alpha as u32 + 127) / 255) as u8;
    match alpha {
        255 => [b, g, r, 255],
        _ => [scale(b), scale(g), scale(r), alpha],
    }
}

#[inline]
fn yuv_to_bgra(luma: u8, u: u8, v: u8) -> [u8; 4] {
    let u = u as i32 - 128;
    let v = v as i32 - 128;
    let y = ((luma as i32 - 16) * 149) >> 7;

    let r = y + ((179 * v) >> 7);
    let g = y - ((44 * u) >> 7) - ((91 * v) >> 7);
    let b = y + ((227 * u) >> 7);

    [
        b.clamp(0, 255) as u8,
        g.clamp(0, 255) as u8,
        r.clamp(0, 255) as u8,
        255,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::FrameData;

    fn packed(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> CameraFrame {
        CameraFrame::packed(width, height, format, data, 1)
    }

    #[test]
    fn test_empty_payload_is_rejected() {
        let frame = CameraFrame::packed(4, 4, PixelFormat::BGRA, FrameData::empty(), 1);
        assert_eq!(
            to_bgra_premultiplied(&frame),
            Err(ConversionError::NoVideoPayload)
        );
        let frame = packed(0, 4, PixelFormat::BGRA, vec![1, 2, 3]);
        assert_eq!(
            to_bgra_premultiplied(&frame),
            Err(ConversionError::NoVideoPayload)
        );
    }

    #[test]
    fn test_short_payload_is_rejected() {
        let frame = packed(2, 2, PixelFormat::RGBA, vec![0; 12]);
        assert_eq!(
            to_bgra_premultiplied(&frame),
            Err(ConversionError::LengthMismatch {
                expected: 16,
                actual: 12
            })
        );
    }

    #[test]
    fn test_rgba_is_swizzled_and_premultiplied() {
        let frame = packed(2, 1, PixelFormat::RGBA, vec![255, 0, 0, 255, 200, 100, 0, 0]);
        let out = to_bgra_premultiplied(&frame).expect("convert");
        assert_eq!(out.pixel(0, 0), Some([0, 0, 255, 255]));
        assert_eq!(out.pixel(1, 0), Some([0, 0, 0, 0]));
    }

    #[test]
    fn test_stride_padding_is_skipped() {
        let mut frame = packed(
            1,
            2,
            PixelFormat::Gray8,
            vec![10, 0xEE, 0xEE, 0xEE, 20],
        );
        frame.stride = 4;
        let out = to_bgra_premultiplied(&frame).expect("convert");
        assert_eq!(out.pixel(0, 0), Some([10, 10, 10, 255]));
        assert_eq!(out.pixel(0, 1), Some([20, 20, 20, 255]));
    }

    #[test]
    fn test_stride_below_row_size() {
        let mut frame = packed(4, 1, PixelFormat::BGRA, vec![0; 16]);
        frame.stride = 8;
        assert_eq!(
            to_bgra_premultiplied(&frame),
            Err(ConversionError::InvalidStride { stride: 8, min: 16 })
        );
    }

    #[test]
    fn test_yuv_neutral_gray() {
        // Y=126, neutral chroma -> mid gray on every YUV layout
        let yuyv = packed(2, 2, PixelFormat::YUYV, [126, 128, 126, 128].repeat(2));
        let nv12 = packed(2, 2, PixelFormat::NV12, vec![126, 126, 126, 126, 128, 128]);
        let i420 = packed(2, 2, PixelFormat::I420, vec![126, 126, 126, 126, 128, 128]);

        for frame in [yuyv, nv12, i420] {
            let out = to_bgra_premultiplied(&frame).expect("convert");
            let [b, g, r, a] = out.pixel(1, 1).expect("pixel");
            assert_eq!(a, 255);
            assert_eq!(b, g);
            assert_eq!(g, r);
            assert!((125..=130).contains(&r), "{:?} gave {}", frame.format, r);
        }
    }

    #[test]
    fn test_odd_dimensions_nv12() {
        // 3x3 luma, 2x2 chroma pairs
        let size = PixelFormat::NV12.frame_size(3, 3).expect("size");
        let frame = packed(3, 3, PixelFormat::NV12, vec![128; size]);
        let out = to_bgra_premultiplied(&frame).expect("convert");
        assert_eq!((out.width(), out.height()), (3, 3));
    }
}
