// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic camera backend
//!
//! Exposes a configurable set of virtual devices that produce a moving
//! color-bar test pattern. Device holders are tracked per backend
//! instance: an exclusive open fails with `DeviceBusy` while anyone holds
//! the device, and a shared open fails only while an exclusive session
//! does, like a real camera held by another process.

use super::frame_loop::{CaptureLoopController, LoopAction};
use super::mailbox::FrameMailbox;
use super::types::*;
use super::{CameraBackend, CameraStream};
use crate::config::SyntheticSettings;
use crate::constants::timing::FRAME_LOG_INTERVAL;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Standard 75% color bars (R, G, B)
const BARS: [[u8; 3]; 8] = [
    [191, 191, 191],
    [191, 191, 0],
    [0, 191, 191],
    [0, 191, 0],
    [191, 0, 191],
    [191, 0, 0],
    [0, 0, 191],
    [16, 16, 16],
];

/// Fallback frame interval for formats without a framerate
const DEFAULT_INTERVAL: Duration = Duration::from_millis(33);

/// Sessions currently holding one device
#[derive(Debug, Clone, Copy, Default)]
struct Holders {
    exclusive: bool,
    count: usize,
}

type OpenRegistry = Arc<Mutex<HashMap<String, Holders>>>;

/// One virtual device
#[derive(Debug, Clone)]
pub struct SyntheticCamera {
    pub device: CameraDevice,
    pub formats: Vec<CameraFormat>,
    /// Behave as if another process already holds the device
    pub held_elsewhere: bool,
}

impl SyntheticCamera {
    pub fn new(device: CameraDevice, formats: Vec<CameraFormat>) -> Self {
        Self {
            device,
            formats,
            held_elsewhere: false,
        }
    }

    /// Mark the device as held by another process
    pub fn held_by_other_process(mut self) -> Self {
        self.held_elsewhere = true;
        self
    }
}

/// Backend producing generated frames
pub struct SyntheticBackend {
    cameras: Vec<SyntheticCamera>,
    open_devices: OpenRegistry,
}

impl SyntheticBackend {
    pub fn new(cameras: Vec<SyntheticCamera>) -> Self {
        Self {
            cameras,
            open_devices: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Build the device list from configuration
    pub fn from_settings(settings: &SyntheticSettings) -> Self {
        let cameras = settings
            .cameras
            .iter()
            .map(|cam| {
                let framerate = Some(Framerate::from_int(cam.fps));
                let formats = cam
                    .resolutions
                    .iter()
                    .map(|&(width, height)| {
                        CameraFormat::new(width, height, framerate, cam.pixel_format)
                    })
                    .collect();
                SyntheticCamera::new(
                    CameraDevice::new(cam.name.clone(), cam.path.clone(), cam.kind),
                    formats,
                )
            })
            .collect();
        Self::new(cameras)
    }

    /// Number of open sessions across all devices of this backend
    pub fn open_count(&self) -> usize {
        self.open_devices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(|holders| holders.count)
            .sum()
    }

    fn find(&self, device: &CameraDevice) -> BackendResult<&SyntheticCamera> {
        self.cameras
            .iter()
            .find(|cam| cam.device.path == device.path)
            .ok_or_else(|| BackendError::DeviceNotFound(device.path.clone()))
    }
}

impl CameraBackend for SyntheticBackend {
    fn enumerate_cameras(&self) -> Vec<CameraDevice> {
        let devices: Vec<CameraDevice> = self.cameras.iter().map(|c| c.device.clone()).collect();
        debug!(count = devices.len(), "Enumerated synthetic cameras");
        devices
    }

    fn get_formats(&self, device: &CameraDevice) -> BackendResult<Vec<CameraFormat>> {
        Ok(self.find(device)?.formats.clone())
    }

    fn open(
        &self,
        device: &CameraDevice,
        format: &CameraFormat,
        options: &OpenOptions,
    ) -> BackendResult<Box<dyn CameraStream>> {
        let camera = self.find(device)?;

        if camera.held_elsewhere {
            return Err(BackendError::DeviceBusy(device.path.clone()));
        }
        if !camera.formats.contains(format) {
            return Err(BackendError::FormatNotSupported(format.to_string()));
        }

        let exclusive = options.sharing == SharingMode::Exclusive;
        let mut open = self.open_devices.lock().unwrap_or_else(|e| e.into_inner());
        let holders = open.entry(device.path.clone()).or_default();
        let refused = holders.exclusive || (exclusive && holders.count > 0);
        if refused {
            return Err(BackendError::DeviceBusy(device.path.clone()));
        }
        holders.exclusive = exclusive;
        holders.count += 1;
        drop(open);

        info!(device = %device.name, format = %format, exclusive, "Opened synthetic camera");

        Ok(Box::new(SyntheticStream {
            path: device.path.clone(),
            format: format.clone(),
            registry: Arc::clone(&self.open_devices),
            producer: None,
            released: false,
        }))
    }

    fn backend_type(&self) -> CameraBackendType {
        CameraBackendType::Synthetic
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Open synthetic device
struct SyntheticStream {
    path: String,
    format: CameraFormat,
    registry: OpenRegistry,
    producer: Option<CaptureLoopController>,
    released: bool,
}

impl CameraStream for SyntheticStream {
    fn start(&mut self, mailbox: Arc<FrameMailbox>) -> BackendResult<()> {
        if self.released {
            return Err(BackendError::Other(format!("{} already closed", self.path)));
        }
        if self.producer.is_some() {
            return Ok(());
        }

        let format = self.format.clone();
        let interval = format
            .framerate
            .and_then(|fps| fps.frame_interval())
            .unwrap_or(DEFAULT_INTERVAL);
        let mut sequence = 0u64;

        let producer = CaptureLoopController::start("synthetic-capture", move || {
            thread::sleep(interval);
            if mailbox.is_closed() {
                return LoopAction::Stop;
            }

            sequence += 1;
            let data = generate_pattern(&format, sequence);
            let frame = CameraFrame::packed(
                format.width,
                format.height,
                format.pixel_format,
                data,
                sequence,
            );

            if sequence % FRAME_LOG_INTERVAL == 0 {
                debug!(sequence, format = %format, "Synthetic frame produced");
            }

            if mailbox.post(frame) {
                LoopAction::Continue
            } else {
                LoopAction::Stop
            }
        })
        .map_err(|e| BackendError::InitializationFailed(e.to_string()))?;

        self.producer = Some(producer);
        Ok(())
    }

    fn stop(&mut self) -> BackendResult<()> {
        if let Some(mut producer) = self.producer.take() {
            producer.stop();
        }
        if !self.released {
            self.released = true;
            let mut open = self.registry.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(holders) = open.get_mut(&self.path) {
                holders.count = holders.count.saturating_sub(1);
                if holders.count == 0 {
                    open.remove(&self.path);
                }
            }
            drop(open);
            info!(device = %self.path, "Released synthetic camera");
        }
        Ok(())
    }

    fn format(&self) -> &CameraFormat {
        &self.format
    }
}

impl Drop for SyntheticStream {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(device = %self.path, error = %e, "Failed to stop synthetic stream");
        }
    }
}

/// BT.601 limited-range RGB to YUV
fn rgb_to_yuv([r, g, b]: [u8; 3]) -> [u8; 3] {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    let y = 16 + ((66 * r + 129 * g + 25 * b + 128) >> 8);
    let u = 128 + ((-38 * r - 74 * g + 112 * b + 128) >> 8);
    let v = 128 + ((112 * r - 94 * g - 18 * b + 128) >> 8);
    [y.clamp(0, 255) as u8, u.clamp(0, 255) as u8, v.clamp(0, 255) as u8]
}

/// Color bars scrolling one bar width every 8 frames
fn pattern_rgb(x: u32, width: u32, frame_index: u64) -> [u8; 3] {
    let bar_width = (width / 8).max(1) as u64;
    let shift = frame_index * bar_width / 8;
    let bar = ((x as u64 + shift) / bar_width) % 8;
    BARS[bar as usize]
}

/// Render one frame of the test pattern in the format's pixel layout
///
/// The pattern varies only horizontally, so chroma subsampling is lossless
/// apart from bar edges.
pub fn generate_pattern(format: &CameraFormat, frame_index: u64) -> Vec<u8> {
    let width = format.width;
    let height = format.height as usize;
    let row: Vec<[u8; 3]> = (0..width).map(|x| pattern_rgb(x, width, frame_index)).collect();
    let yuv_row: Vec<[u8; 3]> = row.iter().map(|&rgb| rgb_to_yuv(rgb)).collect();
    let size = format
        .pixel_format
        .frame_size(width, format.height)
        .unwrap_or(0);
    let mut out = Vec::with_capacity(size);

    match format.pixel_format {
        PixelFormat::BGRA => {
            for _ in 0..height {
                row.iter().for_each(|&[r, g, b]| out.extend_from_slice(&[b, g, r, 255]));
            }
        }
        PixelFormat::RGBA => {
            for _ in 0..height {
                row.iter().for_each(|&[r, g, b]| out.extend_from_slice(&[r, g, b, 255]));
            }
        }
        PixelFormat::RGB24 => {
            for _ in 0..height {
                row.iter().for_each(|rgb| out.extend_from_slice(rgb));
            }
        }
        PixelFormat::Gray8 => {
            for _ in 0..height {
                out.extend(yuv_row.iter().map(|yuv| yuv[0]));
            }
        }
        PixelFormat::YUYV | PixelFormat::UYVY => {
            let mut packed = Vec::with_capacity(yuv_row.len() * 2 + 2);
            for pair in yuv_row.chunks(2) {
                let [y0, u, v] = pair[0];
                let y1 = pair.get(1).map(|p| p[0]).unwrap_or(y0);
                if format.pixel_format == PixelFormat::YUYV {
                    packed.extend_from_slice(&[y0, u, y1, v]);
                } else {
                    packed.extend_from_slice(&[u, y0, v, y1]);
                }
            }
            packed.truncate(width as usize * 2);
            for _ in 0..height {
                out.extend_from_slice(&packed);
            }
        }
        PixelFormat::NV12 | PixelFormat::I420 => {
            for _ in 0..height {
                out.extend(yuv_row.iter().map(|yuv| yuv[0]));
            }
            let chroma: Vec<[u8; 3]> = yuv_row.iter().step_by(2).copied().collect();
            let chroma_rows = height.div_ceil(2);
            if format.pixel_format == PixelFormat::NV12 {
                for _ in 0..chroma_rows {
                    chroma.iter().for_each(|&[_, u, v]| out.extend_from_slice(&[u, v]));
                }
            } else {
                for plane in [1, 2] {
                    for _ in 0..chroma_rows {
                        out.extend(chroma.iter().map(|yuv| yuv[plane]));
                    }
                }
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::MailboxWait;

    fn camera(path: &str) -> SyntheticCamera {
        SyntheticCamera::new(
            CameraDevice::new("Test", path, SourceKind::Color),
            vec![CameraFormat::new(
                16,
                8,
                Some(Framerate::from_int(200)),
                PixelFormat::BGRA,
            )],
        )
    }

    #[test]
    fn test_pattern_sizes_match_formats() {
        for pixel_format in [
            PixelFormat::BGRA,
            PixelFormat::RGBA,
            PixelFormat::RGB24,
            PixelFormat::Gray8,
            PixelFormat::YUYV,
            PixelFormat::UYVY,
            PixelFormat::NV12,
            PixelFormat::I420,
        ] {
            let format = CameraFormat::new(10, 6, None, pixel_format);
            let data = generate_pattern(&format, 3);
            assert_eq!(
                Some(data.len()),
                pixel_format.frame_size(10, 6),
                "{pixel_format}"
            );
        }
    }

    #[test]
    fn test_exclusive_open_reports_busy() {
        let backend = SyntheticBackend::new(vec![camera("synthetic://a")]);
        let device = backend.enumerate_cameras().remove(0);
        let format = backend.get_formats(&device).expect("formats").remove(0);

        let mut first = backend
            .open(&device, &format, &OpenOptions::default())
            .expect("first open");
        let second = backend.open(&device, &format, &OpenOptions::default());
        assert!(matches!(second, Err(BackendError::DeviceBusy(_))));

        first.stop().expect("stop");
        first.stop().expect("second stop is a no-op");
        assert_eq!(backend.open_count(), 0);
        assert!(backend.open(&device, &format, &OpenOptions::default()).is_ok());
    }

    #[test]
    fn test_shared_opens_coexist() {
        let backend = SyntheticBackend::new(vec![camera("synthetic://s")]);
        let device = backend.enumerate_cameras().remove(0);
        let format = backend.get_formats(&device).expect("formats").remove(0);

        let mut first = backend
            .open(&device, &format, &OpenOptions::shared())
            .expect("first shared open");
        let mut second = backend
            .open(&device, &format, &OpenOptions::shared())
            .expect("second shared open");
        assert_eq!(backend.open_count(), 2);

        // Exclusive needs the device to itself
        let exclusive = backend.open(&device, &format, &OpenOptions::default());
        assert!(matches!(exclusive, Err(BackendError::DeviceBusy(_))));

        first.stop().expect("stop");
        assert_eq!(backend.open_count(), 1);
        second.stop().expect("stop");
        assert_eq!(backend.open_count(), 0);

        let _exclusive = backend
            .open(&device, &format, &OpenOptions::default())
            .expect("exclusive open once released");
        let shared = backend.open(&device, &format, &OpenOptions::shared());
        assert!(matches!(shared, Err(BackendError::DeviceBusy(_))));
        assert_eq!(backend.open_count(), 1);
    }

    #[test]
    fn test_held_device_is_busy() {
        let backend = SyntheticBackend::new(vec![camera("synthetic://b").held_by_other_process()]);
        let device = backend.enumerate_cameras().remove(0);
        let format = backend.get_formats(&device).expect("formats").remove(0);
        let result = backend.open(&device, &format, &OpenOptions::default());
        assert!(matches!(result, Err(BackendError::DeviceBusy(_))));
        assert_eq!(backend.open_count(), 0);
    }

    #[test]
    fn test_unknown_format_rejected() {
        let backend = SyntheticBackend::new(vec![camera("synthetic://c")]);
        let device = backend.enumerate_cameras().remove(0);
        let format = CameraFormat::new(1920, 1080, None, PixelFormat::BGRA);
        let result = backend.open(&device, &format, &OpenOptions::default());
        assert!(matches!(result, Err(BackendError::FormatNotSupported(_))));
    }

    #[test]
    fn test_stream_posts_frames_until_stopped() {
        let backend = SyntheticBackend::new(vec![camera("synthetic://d")]);
        let device = backend.enumerate_cameras().remove(0);
        let format = backend.get_formats(&device).expect("formats").remove(0);
        let mut stream = backend
            .open(&device, &format, &OpenOptions::default())
            .expect("open");

        let mailbox = Arc::new(FrameMailbox::new());
        stream.start(Arc::clone(&mailbox)).expect("start");
        assert_eq!(mailbox.wait(Duration::from_secs(2)), MailboxWait::Notified);
        let frame = mailbox.try_acquire_latest().expect("frame");
        assert_eq!((frame.width, frame.height), (16, 8));
        assert_eq!(frame.data.len(), 16 * 8 * 4);

        drop(stream);
        assert_eq!(backend.open_count(), 0);
    }
}
