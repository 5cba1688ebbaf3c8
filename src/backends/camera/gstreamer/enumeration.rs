// SPDX-License-Identifier: GPL-3.0-only

//! GStreamer device discovery and format detection

use super::super::types::{CameraDevice, CameraFormat, Framerate, PixelFormat, SourceKind};
use crate::constants::pipeline;
use gstreamer::prelude::*;
use tracing::{debug, warn};

/// Properties that carry a stable device identifier, in lookup order
const PATH_PROPERTIES: &[&str] = &["api.v4l2.path", "device.path", "object.path"];

/// Enumerate every video source the device monitor reports
///
/// Returns the devices paired with their GStreamer handles so the backend
/// can create source elements for them later.
pub fn enumerate_video_sources() -> Vec<(CameraDevice, gstreamer::Device)> {
    let monitor = gstreamer::DeviceMonitor::new();
    if monitor
        .add_filter(Some(pipeline::VIDEO_SOURCE_CLASS), None)
        .is_none()
    {
        warn!("Failed to add video source filter to device monitor");
        return Vec::new();
    }
    if let Err(e) = monitor.start() {
        warn!(error = %e, "Failed to start device monitor");
        return Vec::new();
    }

    let devices: Vec<(CameraDevice, gstreamer::Device)> = monitor
        .devices()
        .into_iter()
        .enumerate()
        .map(|(index, device)| {
            let name = device.display_name().to_string();
            let path = device_path(&device).unwrap_or_else(|| format!("gst-device-{}", index));
            let kind = device.caps().map(|c| source_kind(&c)).unwrap_or_default();
            debug!(name = %name, path = %path, kind = %kind, "Found video source");
            (CameraDevice::new(name, path, kind), device)
        })
        .collect();

    monitor.stop();
    devices
}

fn device_path(device: &gstreamer::Device) -> Option<String> {
    let props = device.properties()?;
    PATH_PROPERTIES
        .iter()
        .find_map(|key| props.get::<String>(*key).ok())
}

/// Depth cameras expose 16-bit gray formats only
fn source_kind(caps: &gstreamer::Caps) -> SourceKind {
    let formats: Vec<String> = caps
        .iter()
        .filter_map(|s| s.get::<String>("format").ok())
        .collect();

    if !formats.is_empty() && formats.iter().all(|f| f.starts_with("GRAY16")) {
        SourceKind::Depth
    } else {
        SourceKind::Color
    }
}

/// Fixed raw formats advertised in the device caps
///
/// Structures with ranged or listed fields are skipped; compressed formats
/// are ignored because the pipeline only handles raw video.
pub fn formats_from_caps(caps: &gstreamer::Caps) -> Vec<CameraFormat> {
    let mut formats = Vec::new();

    for structure in caps.iter() {
        if structure.name() != "video/x-raw" {
            continue;
        }

        let (Ok(width), Ok(height)) = (
            structure.get::<i32>("width"),
            structure.get::<i32>("height"),
        ) else {
            continue;
        };
        let Some(pixel_format) = structure
            .get::<String>("format")
            .ok()
            .and_then(|f| PixelFormat::from_gst_format(&f))
        else {
            continue;
        };
        let framerate = structure
            .get::<gstreamer::Fraction>("framerate")
            .ok()
            .map(|f| Framerate::new(f.numer().max(0) as u32, f.denom().max(1) as u32));

        let format = CameraFormat::new(width as u32, height as u32, framerate, pixel_format);
        if !formats.contains(&format) {
            formats.push(format);
        }
    }

    debug!(count = formats.len(), "Parsed formats from device caps");
    formats
}
