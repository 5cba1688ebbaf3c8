// SPDX-License-Identifier: GPL-3.0-only

//! Shared types for camera backends

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Frame data storage
///
/// Backends hand over shared, immutable bytes. Capture layers that recycle
/// their own buffers must copy into a `FrameData` before posting a frame,
/// so nothing downstream ever aliases memory the device will overwrite.
#[derive(Clone, Default)]
pub struct FrameData(Arc<[u8]>);

impl FrameData {
    /// Take ownership of a byte vector
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self(Arc::from(bytes))
    }

    /// Copy a borrowed slice (e.g. a mapped device buffer)
    pub fn copy_from_slice(bytes: &[u8]) -> Self {
        Self(Arc::from(bytes))
    }

    /// A frame notification without any video payload
    pub fn empty() -> Self {
        Self::default()
    }

    /// Get the length of the frame data in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the frame data is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for FrameData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FrameData({} bytes)", self.0.len())
    }
}

impl AsRef<[u8]> for FrameData {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::ops::Deref for FrameData {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for FrameData {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_vec(bytes)
    }
}

/// Camera backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CameraBackendType {
    /// Generated test pattern, always available
    #[default]
    Synthetic,
    /// Real devices through GStreamer (cargo feature `gstreamer`)
    GStreamer,
}

impl std::fmt::Display for CameraBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraBackendType::Synthetic => write!(f, "synthetic"),
            CameraBackendType::GStreamer => write!(f, "GStreamer"),
        }
    }
}

/// What kind of image a source produces
///
/// Only `Color` sources are eligible for the frame pipeline; depth and
/// infrared endpoints are enumerated but skipped by the source selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Color,
    Depth,
    Infrared,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Color => write!(f, "color"),
            SourceKind::Depth => write!(f, "depth"),
            SourceKind::Infrared => write!(f, "infrared"),
        }
    }
}

/// Represents a camera device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraDevice {
    pub name: String,
    /// Backend-specific identifier (device node, GStreamer device path, ...)
    pub path: String,
    pub kind: SourceKind,
}

impl CameraDevice {
    pub fn new(name: impl Into<String>, path: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind,
        }
    }

    pub fn is_color(&self) -> bool {
        self.kind == SourceKind::Color
    }
}

impl std::fmt::Display for CameraDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}, {})", self.name, self.path, self.kind)
    }
}

/// Framerate as a fraction (numerator/denominator)
/// Stores exact framerate to handle NTSC rates like 59.94fps (60000/1001)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Framerate {
    pub num: u32,
    pub denom: u32,
}

impl Framerate {
    /// Create a new framerate from numerator and denominator
    pub fn new(num: u32, denom: u32) -> Self {
        Self {
            num,
            denom: if denom == 0 { 1 } else { denom },
        }
    }

    /// Create a framerate from an integer (e.g., 30 becomes 30/1)
    pub fn from_int(fps: u32) -> Self {
        Self { num: fps, denom: 1 }
    }

    /// Get the framerate as a floating point value
    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.denom as f64
    }

    /// Duration of one frame, `None` for a zero rate
    pub fn frame_interval(&self) -> Option<std::time::Duration> {
        if self.num == 0 {
            return None;
        }
        Some(std::time::Duration::from_secs_f64(
            self.denom as f64 / self.num as f64,
        ))
    }
}

impl std::fmt::Display for Framerate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show decimal for non-integer framerates (NTSC)
        if self.denom != 1 {
            write!(f, "{:.2}", self.as_f64())
        } else {
            write!(f, "{}", self.num)
        }
    }
}

impl Default for Framerate {
    fn default() -> Self {
        Self { num: 30, denom: 1 }
    }
}

/// Camera format description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraFormat {
    pub width: u32,
    pub height: u32,
    pub framerate: Option<Framerate>,
    pub pixel_format: PixelFormat,
}

impl CameraFormat {
    pub fn new(width: u32, height: u32, framerate: Option<Framerate>, pixel_format: PixelFormat) -> Self {
        Self {
            width,
            height,
            framerate,
            pixel_format,
        }
    }

    /// Total pixel count, used to rank formats by resolution
    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl std::fmt::Display for CameraFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(fps) = &self.framerate {
            write!(
                f,
                "{}x{} @ {}fps {}",
                self.width, self.height, fps, self.pixel_format
            )
        } else {
            write!(f, "{}x{} {}", self.width, self.height, self.pixel_format)
        }
    }
}

/// Pixel format of frames delivered by a backend
///
/// The pipeline converts every one of these to premultiplied BGRA before
/// running the transformation stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// BGRA - 32-bit, straight alpha (B G R A byte order)
    BGRA,
    /// RGBA - 32-bit, straight alpha
    RGBA,
    /// RGB24 - 24-bit RGB (3 bytes per pixel, no alpha)
    RGB24,
    /// Gray8 - 8-bit grayscale (single channel)
    Gray8,
    /// YUYV - Packed 4:2:2 (Y0 U Y1 V interleaved)
    YUYV,
    /// UYVY - Packed 4:2:2 (U Y0 V Y1 interleaved)
    UYVY,
    /// NV12 - Semi-planar 4:2:0 (Y plane + interleaved UV plane)
    NV12,
    /// I420 - Planar 4:2:0 (separate Y, U, V planes)
    I420,
}

impl PixelFormat {
    /// Exact byte size of a tightly packed frame, `None` on overflow
    pub fn frame_size(&self, width: u32, height: u32) -> Option<usize> {
        let pixels = (width as usize).checked_mul(height as usize)?;
        match self {
            Self::BGRA | Self::RGBA => pixels.checked_mul(4),
            Self::RGB24 => pixels.checked_mul(3),
            Self::Gray8 => Some(pixels),
            Self::YUYV | Self::UYVY => pixels.checked_mul(2),
            Self::NV12 | Self::I420 => {
                let chroma_w = (width as usize).div_ceil(2);
                let chroma_h = (height as usize).div_ceil(2);
                pixels.checked_add(chroma_w.checked_mul(chroma_h)?.checked_mul(2)?)
            }
        }
    }

    /// Bytes per row for packed formats (luma row for planar formats)
    pub fn min_stride(&self, width: u32) -> u32 {
        match self {
            Self::BGRA | Self::RGBA => width * 4,
            Self::RGB24 => width * 3,
            Self::YUYV | Self::UYVY => width * 2,
            Self::Gray8 | Self::NV12 | Self::I420 => width,
        }
    }

    /// Convert to a GStreamer video/x-raw format string.
    pub fn to_gst_format_string(&self) -> &'static str {
        match self {
            Self::BGRA => "BGRA",
            Self::RGBA => "RGBA",
            Self::RGB24 => "RGB",
            Self::Gray8 => "GRAY8",
            Self::YUYV => "YUY2",
            Self::UYVY => "UYVY",
            Self::NV12 => "NV12",
            Self::I420 => "I420",
        }
    }

    /// Parse format from GStreamer format string
    pub fn from_gst_format(format: &str) -> Option<Self> {
        match format {
            "BGRA" | "BGRx" => Some(Self::BGRA),
            "RGBA" | "RGBx" => Some(Self::RGBA),
            "RGB" => Some(Self::RGB24),
            "GRAY8" | "GREY" | "Y8" => Some(Self::Gray8),
            "YUYV" | "YUY2" => Some(Self::YUYV),
            "UYVY" => Some(Self::UYVY),
            "NV12" => Some(Self::NV12),
            "I420" => Some(Self::I420),
            _ => None,
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_gst_format_string())
    }
}

/// A single raw frame from the camera, before pixel conversion
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    /// Frame data; empty when the notification carried no video payload
    pub data: FrameData,
    /// Pixel format of the data
    pub format: PixelFormat,
    /// Row stride for the main data (bytes per row, may include padding)
    pub stride: u32,
    /// Backend sequence number, increasing per produced frame
    pub sequence: u64,
    /// Timestamp when frame was captured (for latency diagnostics)
    pub captured_at: Instant,
}

impl CameraFrame {
    /// Build a tightly packed frame (stride derived from the format)
    pub fn packed(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: impl Into<FrameData>,
        sequence: u64,
    ) -> Self {
        Self {
            width,
            height,
            data: data.into(),
            format,
            stride: format.min_stride(width),
            sequence,
            captured_at: Instant::now(),
        }
    }

    /// True when there is no usable video payload to convert
    pub fn is_empty(&self) -> bool {
        self.data.is_empty() || self.width == 0 || self.height == 0
    }
}

/// How the device is shared with other sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SharingMode {
    /// No other session may stream from the device
    #[default]
    Exclusive,
    /// Stream alongside other shared sessions; refused while an exclusive
    /// session holds the device
    Shared,
}

/// Requests made when opening a device
///
/// Streams always deliver video only, in CPU-readable memory; that is part
/// of the [`CameraStream`](super::CameraStream) contract rather than an
/// option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenOptions {
    pub sharing: SharingMode,
}

impl OpenOptions {
    pub fn shared() -> Self {
        Self {
            sharing: SharingMode::Shared,
        }
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Error types for backend operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Backend is not available on this system
    NotAvailable(String),
    /// Another process holds the device
    DeviceBusy(String),
    /// Failed to initialize backend or device
    InitializationFailed(String),
    /// Camera device not found
    DeviceNotFound(String),
    /// Format not supported
    FormatNotSupported(String),
    /// Operation requires a started stream
    NotStreaming,
    /// Other errors
    Other(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::NotAvailable(msg) => write!(f, "Backend not available: {}", msg),
            BackendError::DeviceBusy(msg) => write!(f, "Device busy: {}", msg),
            BackendError::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            BackendError::DeviceNotFound(msg) => write!(f, "Device not found: {}", msg),
            BackendError::FormatNotSupported(msg) => write!(f, "Format not supported: {}", msg),
            BackendError::NotStreaming => write!(f, "Stream is not running"),
            BackendError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_sizes() {
        assert_eq!(PixelFormat::BGRA.frame_size(4, 2), Some(32));
        assert_eq!(PixelFormat::RGB24.frame_size(4, 2), Some(24));
        assert_eq!(PixelFormat::YUYV.frame_size(4, 2), Some(16));
        // 4x2 luma + 2x1 chroma pairs
        assert_eq!(PixelFormat::NV12.frame_size(4, 2), Some(12));
        assert_eq!(PixelFormat::I420.frame_size(3, 3), Some(9 + 2 * 2 * 2));
    }

    #[test]
    fn test_gst_format_roundtrip_names() {
        assert_eq!(PixelFormat::from_gst_format("YUY2"), Some(PixelFormat::YUYV));
        assert_eq!(PixelFormat::from_gst_format("BGRx"), Some(PixelFormat::BGRA));
        assert_eq!(PixelFormat::from_gst_format("MJPG"), None);
    }

    #[test]
    fn test_framerate_interval() {
        let fps = Framerate::from_int(25);
        assert_eq!(fps.frame_interval(), Some(std::time::Duration::from_millis(40)));
        assert_eq!(Framerate::new(0, 1).frame_interval(), None);
        assert_eq!(Framerate::new(30, 0).denom, 1);
    }

    #[test]
    fn test_empty_payload() {
        let frame = CameraFrame::packed(2, 2, PixelFormat::BGRA, FrameData::empty(), 1);
        assert!(frame.is_empty());
        let frame = CameraFrame::packed(2, 2, PixelFormat::BGRA, vec![0u8; 16], 2);
        assert!(!frame.is_empty());
        assert_eq!(frame.stride, 8);
    }
}
