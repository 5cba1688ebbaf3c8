// SPDX-License-Identifier: MPL-2.0

//! Error types for the frame pipeline
//!
//! Session-level errors (`PipelineError`, `SessionError`) are returned by
//! the controller and leave the pipeline closed. Per-frame errors
//! (`FrameError`) and `AnalysisError` never leave the frame callback or the
//! analysis task; they are logged and counted.

use crate::backends::camera::BackendError;
use std::fmt;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias using PipelineError
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Top-level error for the command-line application
#[derive(Debug, Clone)]
pub enum AppError {
    /// Pipeline lifecycle errors
    Pipeline(PipelineError),
    /// Backend construction errors
    Backend(BackendError),
    /// Configuration errors
    Config(String),
    /// Storage/filesystem errors
    Storage(String),
    /// Generic error with message
    Other(String),
}

/// Errors that keep the pipeline from starting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// Enumeration found no color source
    NoSourceAvailable,
    /// The selected source could not be opened or started
    Session(SessionError),
}

/// Capture session open/start failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Another process holds the device
    DeviceBusy(String),
    /// Negotiation, open or start failed for any other reason
    DeviceError(String),
}

/// Per-frame failures; the frame is dropped and the pipeline continues
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    Conversion(ConversionError),
    Transformation(TransformError),
}

/// Pixel conversion failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    /// The frame carried no usable video payload
    NoVideoPayload,
    /// Frame dimensions overflow the address space
    DimensionsOverflow { width: u32, height: u32 },
    /// The payload is shorter than the format and dimensions require
    LengthMismatch { expected: usize, actual: usize },
    /// Row stride smaller than one row of pixels
    InvalidStride { stride: u32, min: u32 },
}

/// Transformation stage failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformError(pub String);

/// Text recognition failure; the throttle unlocks and records nothing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisError(pub String);

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Pipeline(e) => write!(f, "Pipeline error: {}", e),
            AppError::Backend(e) => write!(f, "Backend error: {}", e),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Storage(msg) => write!(f, "Storage error: {}", msg),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::NoSourceAvailable => write!(f, "No color camera source available"),
            PipelineError::Session(e) => write!(f, "Capture session failed: {}", e),
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::DeviceBusy(msg) => write!(f, "Device busy: {}", msg),
            SessionError::DeviceError(msg) => write!(f, "Device error: {}", msg),
        }
    }
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Conversion(e) => write!(f, "Frame conversion failed: {}", e),
            FrameError::Transformation(e) => write!(f, "Frame transformation failed: {}", e),
        }
    }
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionError::NoVideoPayload => write!(f, "no video payload"),
            ConversionError::DimensionsOverflow { width, height } => {
                write!(f, "frame dimensions {}x{} overflow", width, height)
            }
            ConversionError::LengthMismatch { expected, actual } => {
                write!(f, "expected {} bytes, got {}", expected, actual)
            }
            ConversionError::InvalidStride { stride, min } => {
                write!(f, "stride {} is below the row size {}", stride, min)
            }
        }
    }
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Text recognition failed: {}", self.0)
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for PipelineError {}
impl std::error::Error for SessionError {}
impl std::error::Error for FrameError {}
impl std::error::Error for ConversionError {}
impl std::error::Error for TransformError {}
impl std::error::Error for AnalysisError {}

// Conversions from sub-errors
impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        AppError::Pipeline(err)
    }
}

impl From<BackendError> for AppError {
    fn from(err: BackendError) -> Self {
        AppError::Backend(err)
    }
}

impl From<SessionError> for PipelineError {
    fn from(err: SessionError) -> Self {
        PipelineError::Session(err)
    }
}

impl From<BackendError> for SessionError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::DeviceBusy(msg) => SessionError::DeviceBusy(msg),
            other => SessionError::DeviceError(other.to_string()),
        }
    }
}

impl From<ConversionError> for FrameError {
    fn from(err: ConversionError) -> Self {
        FrameError::Conversion(err)
    }
}

impl From<TransformError> for FrameError {
    fn from(err: TransformError) -> Self {
        FrameError::Transformation(err)
    }
}

// Conversion from String for ad-hoc CLI errors
impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_backend_error_maps_to_device_busy() {
        let err: SessionError = BackendError::DeviceBusy("/dev/video0".into()).into();
        assert_eq!(err, SessionError::DeviceBusy("/dev/video0".into()));

        let err: SessionError = BackendError::FormatNotSupported("MJPG".into()).into();
        assert!(matches!(err, SessionError::DeviceError(_)));
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            PipelineError::NoSourceAvailable.to_string(),
            "No color camera source available"
        );
        let err = FrameError::from(ConversionError::LengthMismatch {
            expected: 16,
            actual: 4,
        });
        assert_eq!(
            err.to_string(),
            "Frame conversion failed: expected 16 bytes, got 4"
        );
    }
}
