// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline controller
//!
//! Owns the capture session and the frame buffer, and runs the per-frame
//! body on the session's dispatch thread:
//!
//! 1. acquire the newest raw frame (a notification without one is a no-op)
//! 2. convert it to premultiplied BGRA
//! 3. run the transformation stage into a fresh output frame
//! 4. offer the transformed frame to the analysis throttle
//! 5. publish the converted/transformed pair
//! 6. signal subscribers that a new pair is ready
//!
//! A failure in step 2 or 3 drops that frame only; nothing is published
//! and no signal is sent.

use super::buffer::{FramePair, LatestFrames};
use super::selector::select_source;
use super::session::CaptureSession;
use crate::backends::camera::{
    CameraBackend, CameraDevice, CameraFormat, CameraFrame, FrameMailbox, get_backend,
};
use crate::config::Config;
use crate::constants::timing::FRAME_LOG_INTERVAL;
use crate::errors::{AppResult, FrameError, PipelineResult};
use crate::frame_processor::{AnalysisStats, AnalysisThrottle, QrTextRecognizer, TextRecognizer};
use crate::media::{FilterTransform, Frame, FrameTransform, filters, to_bgra_premultiplied};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

/// Controller lifecycle as seen by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Closed,
    Initializing,
    Running,
}

/// Counters describing pipeline activity since construction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Frame pairs published
    pub frames_processed: u64,
    pub conversion_failures: u64,
    pub transform_failures: u64,
    /// Frames overwritten before the callback could take them
    pub frames_dropped: u64,
    /// Notifications that arrived with no frame to acquire
    pub empty_notifications: u64,
    /// `None` when analysis is disabled
    pub analysis: Option<AnalysisStats>,
}

/// Receives "frame ready" signals
///
/// Carries the sequence number of the newest published pair. Signals
/// coalesce: a slow subscriber wakes once and sees the latest sequence.
/// Consumers fetch the frames themselves with
/// [`PipelineController::latest_frames`].
#[derive(Debug, Clone)]
pub struct FrameReadyReceiver {
    rx: watch::Receiver<u64>,
}

impl FrameReadyReceiver {
    /// Wait for the next publish; `None` once the controller is gone
    pub async fn changed(&mut self) -> Option<u64> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }

    /// True if a publish happened since the last `changed()`
    pub fn has_changed(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }

    /// Sequence of the newest published pair (0 before the first one)
    pub fn latest_sequence(&self) -> u64 {
        *self.rx.borrow()
    }
}

/// State reachable from the dispatch thread
struct PipelineShared {
    frames: LatestFrames,
    transform: Arc<dyn FrameTransform>,
    throttle: Option<AnalysisThrottle>,
    ready: watch::Sender<u64>,
    state: Mutex<PipelineState>,
    published: AtomicU64,
    conversion_failures: AtomicU64,
    transform_failures: AtomicU64,
    empty_notifications: AtomicU64,
    /// Mailbox drops of the running session
    session_drops: AtomicU64,
    /// Mailbox drops of sessions already closed
    closed_session_drops: AtomicU64,
}

impl PipelineShared {
    fn set_state(&self, state: PipelineState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Per-frame callback; never propagates errors
    fn on_frame(&self, mailbox: &FrameMailbox) {
        self.session_drops
            .store(mailbox.dropped_count(), Ordering::Relaxed);

        let Some(raw) = mailbox.try_acquire_latest() else {
            self.empty_notifications.fetch_add(1, Ordering::Relaxed);
            trace!("Frame notification without a frame");
            return;
        };

        match self.process_frame(&raw) {
            Ok(pair) => {
                if pair.sequence % FRAME_LOG_INTERVAL == 0 {
                    debug!(
                        sequence = pair.sequence,
                        source_sequence = raw.sequence,
                        width = pair.preview.width(),
                        height = pair.preview.height(),
                        latency_us = raw.captured_at.elapsed().as_micros(),
                        "Frame published"
                    );
                }
            }
            Err(FrameError::Conversion(e)) => {
                let count = self.conversion_failures.fetch_add(1, Ordering::Relaxed) + 1;
                if count == 1 || count % FRAME_LOG_INTERVAL == 0 {
                    warn!(count, sequence = raw.sequence, error = %e, "Dropping frame: conversion failed");
                }
            }
            Err(FrameError::Transformation(e)) => {
                let count = self.transform_failures.fetch_add(1, Ordering::Relaxed) + 1;
                if count == 1 || count % FRAME_LOG_INTERVAL == 0 {
                    warn!(count, sequence = raw.sequence, error = %e, "Dropping frame: transformation failed");
                }
            }
        }
    }

    /// Convert, transform, analyze, publish, notify
    fn process_frame(&self, raw: &CameraFrame) -> Result<Arc<FramePair>, FrameError> {
        let converted: Frame = to_bgra_premultiplied(raw)?;
        let transformed = filters::apply(self.transform.as_ref(), &converted)?;

        if let Some(throttle) = &self.throttle {
            throttle.submit(&transformed);
        }

        let sequence = self.published.fetch_add(1, Ordering::Relaxed) + 1;
        let pair = self.frames.publish(converted, transformed, sequence);
        self.ready.send_replace(sequence);
        Ok(pair)
    }
}

/// Orchestrates source selection, the capture session and the frame body
pub struct PipelineController {
    backend: Box<dyn CameraBackend>,
    preferred_camera: Option<String>,
    shared: Arc<PipelineShared>,
    /// Held for the whole of initialize/deinitialize
    session: Mutex<Option<CaptureSession>>,
}

impl PipelineController {
    /// Create a controller; no device is touched until [`initialize`](Self::initialize)
    ///
    /// Analysis is disabled when `recognizer` is `None`, or when no tokio
    /// runtime can be found or started for it.
    pub fn new(
        backend: Box<dyn CameraBackend>,
        transform: Arc<dyn FrameTransform>,
        recognizer: Option<Arc<dyn TextRecognizer>>,
    ) -> Self {
        let (ready, _) = watch::channel(0);
        let throttle = recognizer.and_then(|recognizer| {
            AnalysisThrottle::with_default_runtime(recognizer)
                .inspect_err(|e| warn!(error = %e, "Text analysis disabled: no runtime"))
                .ok()
        });
        Self {
            backend,
            preferred_camera: None,
            shared: Arc::new(PipelineShared {
                frames: LatestFrames::new(),
                transform,
                throttle,
                ready,
                state: Mutex::new(PipelineState::Closed),
                published: AtomicU64::new(0),
                conversion_failures: AtomicU64::new(0),
                transform_failures: AtomicU64::new(0),
                empty_notifications: AtomicU64::new(0),
                session_drops: AtomicU64::new(0),
                closed_session_drops: AtomicU64::new(0),
            }),
            session: Mutex::new(None),
        }
    }

    /// Build the backend, filter and recognizer described by `config`
    pub fn from_config(config: &Config) -> AppResult<Self> {
        let backend = get_backend(config.backend, config)?;
        let transform: Arc<dyn FrameTransform> = Arc::new(FilterTransform::new(config.filter));
        let recognizer: Option<Arc<dyn TextRecognizer>> = config.analysis.enabled.then(|| {
            Arc::new(QrTextRecognizer::with_max_dimension(config.analysis.max_dimension))
                as Arc<dyn TextRecognizer>
        });

        info!(
            backend = %config.backend,
            filter = %config.filter,
            analysis = config.analysis.enabled,
            "Creating pipeline controller"
        );
        Ok(Self::new(backend, transform, recognizer)
            .with_preferred_camera(config.preferred_camera.clone()))
    }

    /// Prefer this device path over the first enumerated color source
    pub fn with_preferred_camera(mut self, path: Option<String>) -> Self {
        self.preferred_camera = path;
        self
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<CaptureSession>> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Select a source, open it and start delivering frames
    ///
    /// A no-op while already running. On failure the pipeline stays closed,
    /// nothing is left open, and the error is returned after being logged;
    /// no retry is attempted.
    pub fn initialize(&self) -> PipelineResult<()> {
        let mut slot = self.lock_session();
        if slot.is_some() {
            debug!("Pipeline already running, ignoring initialize");
            return Ok(());
        }

        self.shared.set_state(PipelineState::Initializing);
        match self.open_session() {
            Ok(session) => {
                info!(
                    session = %session.id(),
                    device = %session.device().name,
                    format = %session.format(),
                    "Pipeline running"
                );
                *slot = Some(session);
                self.shared.set_state(PipelineState::Running);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Pipeline failed to initialize");
                self.shared.set_state(PipelineState::Closed);
                Err(e)
            }
        }
    }

    fn open_session(&self) -> PipelineResult<CaptureSession> {
        let device = select_source(self.backend.as_ref(), self.preferred_camera.as_deref())?;
        let mut session = CaptureSession::open(self.backend.as_ref(), &device)?;

        let shared = Arc::clone(&self.shared);
        shared.session_drops.store(0, Ordering::Relaxed);
        session.start(move |mailbox| shared.on_frame(mailbox))?;
        Ok(session)
    }

    /// Stop delivery and release the device
    ///
    /// Safe in any state; waits for an in-flight initialize to finish and
    /// returns only after the session is fully closed.
    pub fn deinitialize(&self) {
        let mut slot = self.lock_session();
        let Some(mut session) = slot.take() else {
            debug!("Pipeline not running, ignoring deinitialize");
            return;
        };

        session.stop();
        self.shared
            .closed_session_drops
            .fetch_add(session.dropped_frames(), Ordering::Relaxed);
        self.shared.session_drops.store(0, Ordering::Relaxed);
        self.shared.set_state(PipelineState::Closed);
        info!(session = %session.id(), "Pipeline closed");
    }

    pub fn state(&self) -> PipelineState {
        *self.shared.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_running(&self) -> bool {
        self.state() == PipelineState::Running
    }

    /// Device and negotiated format of the running session
    pub fn active_source(&self) -> Option<(CameraDevice, CameraFormat)> {
        self.lock_session()
            .as_ref()
            .map(|s| (s.device().clone(), s.format().clone()))
    }

    /// Subscribe to frame-ready signals
    pub fn subscribe(&self) -> FrameReadyReceiver {
        FrameReadyReceiver {
            rx: self.shared.ready.subscribe(),
        }
    }

    /// Newest preview/processed pair, read as one unit
    pub fn latest_frames(&self) -> Option<Arc<FramePair>> {
        self.shared.frames.latest()
    }

    /// Newest color-converted capture
    pub fn latest_preview(&self) -> Option<Frame> {
        self.shared.frames.read_preview()
    }

    /// Newest transformation output
    pub fn latest_processed(&self) -> Option<Frame> {
        self.shared.frames.read_processed()
    }

    /// Most recent non-empty recognition result
    pub fn recognized_text(&self) -> Option<String> {
        self.shared.throttle.as_ref().and_then(|t| t.last_text())
    }

    /// Wait until no recognition is in flight; `true` when analysis is disabled
    pub fn wait_analysis_idle(&self, timeout: Duration) -> bool {
        self.shared
            .throttle
            .as_ref()
            .is_none_or(|t| t.wait_idle(timeout))
    }

    pub fn stats(&self) -> PipelineStats {
        let shared = &self.shared;
        PipelineStats {
            frames_processed: shared.published.load(Ordering::Relaxed),
            conversion_failures: shared.conversion_failures.load(Ordering::Relaxed),
            transform_failures: shared.transform_failures.load(Ordering::Relaxed),
            frames_dropped: shared.closed_session_drops.load(Ordering::Relaxed)
                + shared.session_drops.load(Ordering::Relaxed),
            empty_notifications: shared.empty_notifications.load(Ordering::Relaxed),
            analysis: shared.throttle.as_ref().map(AnalysisThrottle::stats),
        }
    }
}

impl Drop for PipelineController {
    fn drop(&mut self) {
        self.deinitialize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::{PixelFormat, SyntheticBackend};
    use crate::errors::{ConversionError, PipelineError, TransformError};
    use crate::media::{FilterType, OutputFrame};

    fn pipeline(transform: Arc<dyn FrameTransform>) -> PipelineController {
        PipelineController::new(Box::new(SyntheticBackend::new(Vec::new())), transform, None)
    }

    struct Failing;
    impl FrameTransform for Failing {
        fn process(&self, _: &Frame, _: &mut OutputFrame) -> Result<(), TransformError> {
            Err(TransformError("unsupported".into()))
        }
    }

    fn gray_frame(value: u8, sequence: u64) -> CameraFrame {
        CameraFrame::packed(2, 2, PixelFormat::Gray8, vec![value; 4], sequence)
    }

    #[test]
    fn test_process_frame_publishes_pair() {
        let controller = pipeline(Arc::new(FilterTransform::new(FilterType::Passthrough)));
        let pair = controller
            .shared
            .process_frame(&gray_frame(90, 7))
            .expect("pair");
        assert_eq!(pair.sequence, 1);
        assert_eq!(pair.preview.pixel(0, 0), Some([90, 90, 90, 255]));
        assert_eq!(pair.processed, pair.preview);
        assert_eq!(controller.subscribe().latest_sequence(), 1);
    }

    #[test]
    fn test_failed_frames_leave_buffer_untouched() {
        let controller = pipeline(Arc::new(FilterTransform::new(FilterType::Passthrough)));
        controller.shared.process_frame(&gray_frame(10, 1)).expect("pair");

        let mut short = gray_frame(20, 2);
        short.data = vec![20u8; 3].into();
        assert_eq!(
            controller.shared.process_frame(&short).map(|_| ()),
            Err(FrameError::Conversion(ConversionError::LengthMismatch {
                expected: 4,
                actual: 3
            }))
        );
        assert_eq!(controller.latest_frames().expect("pair").sequence, 1);

        let failing = pipeline(Arc::new(Failing));
        assert!(matches!(
            failing.shared.process_frame(&gray_frame(30, 3)),
            Err(FrameError::Transformation(_))
        ));
        assert!(failing.latest_frames().is_none());
        assert_eq!(failing.subscribe().latest_sequence(), 0);
    }

    #[test]
    fn test_lifecycle_without_sources() {
        let controller = pipeline(Arc::new(FilterTransform::default()));
        controller.deinitialize();
        assert_eq!(controller.state(), PipelineState::Closed);

        assert_eq!(controller.initialize(), Err(PipelineError::NoSourceAvailable));
        assert_eq!(controller.state(), PipelineState::Closed);
        assert!(controller.latest_preview().is_none());
        assert!(controller.latest_processed().is_none());
        assert!(controller.recognized_text().is_none());
        assert!(controller.wait_analysis_idle(Duration::from_millis(1)));
    }
}
