// SPDX-License-Identifier: GPL-3.0-only

//! Latest-wins frame hand-off between a backend and its consumer
//!
//! A backend posts frames from whatever thread its capture layer runs on.
//! The mailbox holds at most one undelivered frame: posting over an
//! undelivered frame replaces it and counts the older one as dropped. The
//! consumer therefore never sees a queue, only the newest frame available
//! at the moment it asks.

use super::types::CameraFrame;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// Outcome of waiting for a frame notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxWait {
    /// A post happened since the last wait
    Notified,
    /// Nothing arrived within the timeout
    TimedOut,
    /// The mailbox was closed; no further frames will be delivered
    Closed,
}

#[derive(Default)]
struct Slot {
    latest: Option<CameraFrame>,
    notified: bool,
    closed: bool,
}

/// Single-slot, overwrite-on-post frame mailbox
#[derive(Default)]
pub struct FrameMailbox {
    slot: Mutex<Slot>,
    arrived: Condvar,
    posted: AtomicU64,
    dropped: AtomicU64,
}

impl FrameMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Post a frame, replacing any frame not yet acquired
    ///
    /// Returns `false` if the mailbox is closed and the frame was discarded.
    pub fn post(&self, frame: CameraFrame) -> bool {
        let mut slot = self.lock();
        if slot.closed {
            return false;
        }
        if slot.latest.replace(frame).is_some() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        slot.notified = true;
        self.posted.fetch_add(1, Ordering::Relaxed);
        drop(slot);
        self.arrived.notify_one();
        true
    }

    /// Raise a notification without a frame
    ///
    /// Consumers must tolerate waking up with nothing to acquire.
    pub fn notify(&self) {
        let mut slot = self.lock();
        if slot.closed {
            return;
        }
        slot.notified = true;
        drop(slot);
        self.arrived.notify_one();
    }

    /// Take the newest undelivered frame, if any
    pub fn try_acquire_latest(&self) -> Option<CameraFrame> {
        self.lock().latest.take()
    }

    /// Block until a notification arrives, the timeout passes or the mailbox closes
    pub fn wait(&self, timeout: Duration) -> MailboxWait {
        let slot = self.lock();
        let (mut slot, _) = self
            .arrived
            .wait_timeout_while(slot, timeout, |s| !s.notified && !s.closed)
            .unwrap_or_else(|e| e.into_inner());

        if slot.closed {
            MailboxWait::Closed
        } else if slot.notified {
            slot.notified = false;
            MailboxWait::Notified
        } else {
            MailboxWait::TimedOut
        }
    }

    /// Close the mailbox, discard any pending frame and wake the consumer
    pub fn close(&self) {
        let mut slot = self.lock();
        slot.closed = true;
        slot.latest = None;
        drop(slot);
        self.arrived.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Total frames accepted by `post`
    pub fn posted_count(&self) -> u64 {
        self.posted.load(Ordering::Relaxed)
    }

    /// Frames overwritten before anyone acquired them
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for FrameMailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameMailbox")
            .field("posted", &self.posted_count())
            .field("dropped", &self.dropped_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::PixelFormat;
    use std::sync::Arc;
    use std::thread;

    fn frame(sequence: u64) -> CameraFrame {
        CameraFrame::packed(1, 1, PixelFormat::BGRA, vec![0u8; 4], sequence)
    }

    #[test]
    fn test_latest_frame_wins() {
        let mailbox = FrameMailbox::new();
        mailbox.post(frame(1));
        mailbox.post(frame(2));
        mailbox.post(frame(3));

        let latest = mailbox.try_acquire_latest().expect("frame");
        assert_eq!(latest.sequence, 3);
        assert!(mailbox.try_acquire_latest().is_none());
        assert_eq!(mailbox.posted_count(), 3);
        assert_eq!(mailbox.dropped_count(), 2);
    }

    #[test]
    fn test_wait_consumes_notification() {
        let mailbox = FrameMailbox::new();
        mailbox.post(frame(1));
        assert_eq!(mailbox.wait(Duration::from_millis(10)), MailboxWait::Notified);
        assert_eq!(mailbox.wait(Duration::from_millis(10)), MailboxWait::TimedOut);
    }

    #[test]
    fn test_stale_notification_has_no_frame() {
        let mailbox = FrameMailbox::new();
        mailbox.notify();
        assert_eq!(mailbox.wait(Duration::from_millis(10)), MailboxWait::Notified);
        assert!(mailbox.try_acquire_latest().is_none());
    }

    #[test]
    fn test_close_wakes_waiter_and_rejects_posts() {
        let mailbox = Arc::new(FrameMailbox::new());
        let waiter = {
            let mailbox = Arc::clone(&mailbox);
            thread::spawn(move || mailbox.wait(Duration::from_secs(5)))
        };

        thread::sleep(Duration::from_millis(20));
        mailbox.close();
        assert_eq!(waiter.join().expect("waiter"), MailboxWait::Closed);
        assert!(!mailbox.post(frame(1)));
        assert!(mailbox.try_acquire_latest().is_none());
    }
}
