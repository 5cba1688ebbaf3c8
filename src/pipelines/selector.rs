// SPDX-License-Identifier: GPL-3.0-only

//! Source and format selection

use crate::backends::camera::{CameraBackend, CameraDevice, CameraFormat};
use crate::errors::{PipelineError, PipelineResult};
use tracing::{debug, info};

/// Pick the color source to capture from
///
/// A preferred device path wins when it names an enumerated color source.
/// Otherwise the first enumerated color source is used. Depth and infrared
/// endpoints are never selected.
pub fn select_source(
    backend: &dyn CameraBackend,
    preferred: Option<&str>,
) -> PipelineResult<CameraDevice> {
    let color: Vec<CameraDevice> = backend
        .enumerate_cameras()
        .into_iter()
        .filter(CameraDevice::is_color)
        .collect();
    debug!(count = color.len(), "Enumerated color sources");

    if let Some(path) = preferred {
        if let Some(device) = color.iter().find(|d| d.path == path) {
            info!(device = %device, "Using preferred camera");
            return Ok(device.clone());
        }
        info!(path, "Preferred camera not available, using first color source");
    }

    let device = color
        .into_iter()
        .next()
        .ok_or(PipelineError::NoSourceAvailable)?;
    info!(device = %device, "Selected camera");
    Ok(device)
}

/// Highest-resolution format; the first of equally large formats wins
pub fn best_format(formats: &[CameraFormat]) -> Option<&CameraFormat> {
    let mut best: Option<&CameraFormat> = None;
    for format in formats {
        if best.is_none_or(|b| format.pixel_count() > b.pixel_count()) {
            best = Some(format);
        }
    }
    best
}
