// SPDX-License-Identifier: MPL-2.0

//! Camera backend abstraction
//!
//! This module provides the trait-based boundary between the frame pipeline
//! and whatever actually talks to camera hardware.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │ PipelineController  │  ← selection, session lifecycle, frame callback
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │  CameraBackend Trait│  ← enumerate, negotiate formats, open
//! └──────────┬──────────┘
//!            │ Box<dyn CameraStream>
//!            ▼
//! ┌─────────────────────┐
//! │    FrameMailbox     │  ← latest-wins hand-off to the session
//! └─────────────────────┘
//! ```

pub mod frame_loop;
#[cfg(feature = "gstreamer")]
pub mod gstreamer;
pub mod mailbox;
pub mod synthetic;
pub mod types;

pub use frame_loop::{CaptureLoopController, LoopAction};
pub use mailbox::{FrameMailbox, MailboxWait};
pub use synthetic::{SyntheticBackend, SyntheticCamera};
pub use types::*;

use crate::config::Config;
use std::sync::Arc;

/// Camera backend trait
///
/// All camera backends must implement this trait to provide:
/// - Device enumeration and format detection
/// - Opening a device into a stream that posts frames to a mailbox
pub trait CameraBackend: Send + Sync {
    // ===== Enumeration =====

    /// Enumerate available cameras on this backend (all kinds)
    fn enumerate_cameras(&self) -> Vec<CameraDevice>;

    /// Get supported formats for a specific camera device
    fn get_formats(&self, device: &CameraDevice) -> BackendResult<Vec<CameraFormat>>;

    // ===== Lifecycle =====

    /// Open the device at the given format
    ///
    /// # Returns
    /// * `Ok(stream)` - Device opened; frames flow once the stream is started
    /// * `Err(BackendError::DeviceBusy)` - Another process holds the device
    /// * `Err(BackendError)` - Any other open or negotiation failure
    fn open(
        &self,
        device: &CameraDevice,
        format: &CameraFormat,
        options: &OpenOptions,
    ) -> BackendResult<Box<dyn CameraStream>>;

    // ===== Metadata =====

    /// Get the backend type identifier
    fn backend_type(&self) -> CameraBackendType;

    /// Check if this backend is available on the current system
    fn is_available(&self) -> bool;
}

/// An open camera connection
///
/// Dropping a stream must release the device, so implementations stop
/// themselves on drop.
pub trait CameraStream: Send {
    /// Begin asynchronous delivery into `mailbox`
    fn start(&mut self, mailbox: Arc<FrameMailbox>) -> BackendResult<()>;

    /// Stop delivery and release the device; calling it again is a no-op
    fn stop(&mut self) -> BackendResult<()>;

    /// The negotiated format frames are produced in
    fn format(&self) -> &CameraFormat;
}

/// Create the backend selected in the configuration
pub fn get_backend(
    backend_type: CameraBackendType,
    config: &Config,
) -> BackendResult<Box<dyn CameraBackend>> {
    match backend_type {
        CameraBackendType::Synthetic => Ok(Box::new(SyntheticBackend::from_settings(
            &config.synthetic,
        ))),
        #[cfg(feature = "gstreamer")]
        CameraBackendType::GStreamer => Ok(Box::new(gstreamer::GStreamerBackend::new()?)),
        #[cfg(not(feature = "gstreamer"))]
        CameraBackendType::GStreamer => Err(BackendError::NotAvailable(
            "built without the `gstreamer` feature".to_string(),
        )),
    }
}

/// Get the default backend
pub fn get_default_backend() -> CameraBackendType {
    if cfg!(feature = "gstreamer") {
        CameraBackendType::GStreamer
    } else {
        CameraBackendType::Synthetic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_backend_always_available() {
        let backend =
            get_backend(CameraBackendType::Synthetic, &Config::default()).expect("backend");
        assert_eq!(backend.backend_type(), CameraBackendType::Synthetic);
        assert!(backend.is_available());
    }

    #[cfg(not(feature = "gstreamer"))]
    #[test]
    fn test_gstreamer_requires_feature() {
        let result = get_backend(CameraBackendType::GStreamer, &Config::default());
        assert!(matches!(result, Err(BackendError::NotAvailable(_))));
    }
}
