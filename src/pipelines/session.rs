// SPDX-License-Identifier: GPL-3.0-only

//! Capture session: one open device plus its frame dispatch thread
//!
//! ```text
//! backend producer ──post──▶ FrameMailbox ──wait──▶ "frame-dispatch" ──▶ on_frame
//!                            (latest wins)            (CaptureLoopController)
//! ```
//!
//! The dispatch thread hands the mailbox to the frame callback each time a
//! notification arrives; the callback acquires whatever frame is newest at
//! that moment. Frames posted while the callback runs overwrite each other,
//! so a slow callback only ever sees the most recent one.

use super::selector::best_format;
use crate::backends::camera::{
    CameraBackend, CameraDevice, CameraFormat, CameraStream, CaptureLoopController, FrameMailbox,
    LoopAction, MailboxWait, OpenOptions,
};
use crate::constants::timing;
use crate::errors::SessionError;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Device negotiated and open, nothing delivered yet
    Open,
    /// Frames are being delivered to the callback
    Streaming,
    /// Device released; the session cannot be restarted
    Closed,
}

/// An exclusive connection to one camera at its highest-resolution format
pub struct CaptureSession {
    id: Uuid,
    device: CameraDevice,
    format: CameraFormat,
    stream: Box<dyn CameraStream>,
    mailbox: Arc<FrameMailbox>,
    dispatcher: Option<CaptureLoopController>,
    state: SessionState,
}

impl CaptureSession {
    /// Negotiate a format and open `device`
    ///
    /// Nothing stays open when this fails.
    pub fn open(backend: &dyn CameraBackend, device: &CameraDevice) -> Result<Self, SessionError> {
        let id = Uuid::new_v4();
        info!(session = %id, device = %device, "Opening capture session");

        let formats = backend.get_formats(device)?;
        let format = best_format(&formats).cloned().ok_or_else(|| {
            SessionError::DeviceError(format!("{} offers no supported format", device.name))
        })?;
        debug!(session = %id, format = %format, candidates = formats.len(), "Negotiated format");

        let stream = backend.open(device, &format, &OpenOptions::default())?;

        info!(session = %id, format = %format, "Capture session open");
        Ok(Self {
            id,
            device: device.clone(),
            format,
            stream,
            mailbox: Arc::new(FrameMailbox::new()),
            dispatcher: None,
            state: SessionState::Open,
        })
    }

    /// Begin delivering frames to `on_frame`
    ///
    /// `on_frame` runs on the session's dispatch thread, once per
    /// notification. It must tolerate the mailbox being empty. Calling
    /// `start` on a streaming session is a no-op.
    pub fn start<F>(&mut self, mut on_frame: F) -> Result<(), SessionError>
    where
        F: FnMut(&FrameMailbox) + Send + 'static,
    {
        match self.state {
            SessionState::Streaming => return Ok(()),
            SessionState::Closed => {
                return Err(SessionError::DeviceError("session already closed".to_string()));
            }
            SessionState::Open => {}
        }

        self.stream.start(Arc::clone(&self.mailbox))?;

        let mailbox = Arc::clone(&self.mailbox);
        let waker_mailbox = Arc::clone(&self.mailbox);
        let dispatcher = CaptureLoopController::start("frame-dispatch", move || {
            match mailbox.wait(timing::DISPATCH_POLL_INTERVAL) {
                MailboxWait::Notified => {
                    on_frame(&mailbox);
                    LoopAction::Continue
                }
                MailboxWait::TimedOut => LoopAction::Continue,
                MailboxWait::Closed => LoopAction::Stop,
            }
        });

        match dispatcher {
            Ok(dispatcher) => {
                self.dispatcher = Some(dispatcher.with_waker(move || waker_mailbox.close()));
                self.state = SessionState::Streaming;
                info!(session = %self.id, "Frame delivery started");
                Ok(())
            }
            Err(e) => {
                self.stop();
                Err(SessionError::DeviceError(format!(
                    "failed to start frame dispatch: {}",
                    e
                )))
            }
        }
    }

    /// Stop delivery and release the device
    ///
    /// Returns once no callback is running and the device is released.
    /// Calling it again is a no-op.
    pub fn stop(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        info!(session = %self.id, device = %self.device.name, "Stopping capture session");

        self.mailbox.close();
        if let Some(mut dispatcher) = self.dispatcher.take() {
            dispatcher.stop();
        }
        if let Err(e) = self.stream.stop() {
            warn!(session = %self.id, error = %e, "Device did not stop cleanly");
        }

        self.state = SessionState::Closed;
        info!(
            session = %self.id,
            posted = self.mailbox.posted_count(),
            dropped = self.mailbox.dropped_count(),
            "Capture session closed"
        );
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn device(&self) -> &CameraDevice {
        &self.device
    }

    pub fn format(&self) -> &CameraFormat {
        &self.format
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Frames overwritten in the mailbox before the callback acquired them
    pub fn dropped_frames(&self) -> u64 {
        self.mailbox.dropped_count()
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("id", &self.id)
            .field("device", &self.device.path)
            .field("format", &self.format)
            .field("state", &self.state)
            .finish()
    }
}
