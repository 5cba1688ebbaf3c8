// SPDX-License-Identifier: MPL-2.0

//! GStreamer camera backend
//!
//! Discovers devices with the GStreamer device monitor and captures through
//! an appsink that keeps a single buffer and drops older ones, so the sink
//! is latest-wins before frames ever reach the mailbox.

mod enumeration;
mod pipeline;

pub use enumeration::{enumerate_video_sources, formats_from_caps};
pub use pipeline::GStreamerStream;

use super::types::*;
use super::{CameraBackend, CameraStream};
use std::sync::Mutex;
use tracing::{info, warn};

/// GStreamer backend implementation
pub struct GStreamerBackend {
    /// Devices from the most recent enumeration
    devices: Mutex<Vec<(CameraDevice, gstreamer::Device)>>,
}

impl GStreamerBackend {
    /// Initialize GStreamer and create the backend
    pub fn new() -> BackendResult<Self> {
        gstreamer::init().map_err(|e| BackendError::NotAvailable(e.to_string()))?;
        Ok(Self {
            devices: Mutex::new(Vec::new()),
        })
    }

    fn lookup(&self, device: &CameraDevice) -> BackendResult<gstreamer::Device> {
        let devices = self.devices.lock().unwrap_or_else(|e| e.into_inner());
        devices
            .iter()
            .find(|(known, _)| known.path == device.path)
            .map(|(_, gst_device)| gst_device.clone())
            .ok_or_else(|| BackendError::DeviceNotFound(device.path.clone()))
    }
}

impl CameraBackend for GStreamerBackend {
    fn enumerate_cameras(&self) -> Vec<CameraDevice> {
        let found = enumerate_video_sources();
        info!(count = found.len(), "GStreamer cameras enumerated");
        let cameras = found.iter().map(|(device, _)| device.clone()).collect();
        *self.devices.lock().unwrap_or_else(|e| e.into_inner()) = found;
        cameras
    }

    fn get_formats(&self, device: &CameraDevice) -> BackendResult<Vec<CameraFormat>> {
        let gst_device = self.lookup(device)?;
        let caps = gst_device.caps().ok_or_else(|| {
            BackendError::FormatNotSupported(format!("{} reports no caps", device.name))
        })?;
        Ok(formats_from_caps(&caps))
    }

    fn open(
        &self,
        device: &CameraDevice,
        format: &CameraFormat,
        options: &OpenOptions,
    ) -> BackendResult<Box<dyn CameraStream>> {
        if options.sharing != SharingMode::Exclusive {
            warn!(?options, "GStreamer backend always opens devices exclusively");
        }
        let gst_device = self.lookup(device)?;
        Ok(Box::new(GStreamerStream::open(device, &gst_device, format)?))
    }

    fn backend_type(&self) -> CameraBackendType {
        CameraBackendType::GStreamer
    }

    fn is_available(&self) -> bool {
        gstreamer::ElementFactory::find("videoconvert").is_some()
            && gstreamer::ElementFactory::find("appsink").is_some()
    }
}
