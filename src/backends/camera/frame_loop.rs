// SPDX-License-Identifier: GPL-3.0-only
//! Thread lifecycle management for capture and dispatch loops
//!
//! Both the synthetic frame producer and the capture session's frame
//! dispatcher run as a named thread that repeats one iteration until told
//! to stop. Stopping always joins, so once `stop()` returns the loop body
//! will never run again.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// What the loop body asks for after one iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Run another iteration
    Continue,
    /// Leave the loop; the thread exits
    Stop,
}

type Waker = Box<dyn Fn() + Send + Sync>;

/// Owner of a named loop thread
///
/// # Example
///
/// ```ignore
/// let mut controller = CaptureLoopController::start("frame-dispatch", move || {
///     match mailbox.wait(timeout) {
///         MailboxWait::Closed => LoopAction::Stop,
///         _ => LoopAction::Continue,
///     }
/// })?
/// .with_waker(move || mailbox_for_stop.close());
///
/// controller.stop();
/// ```
pub struct CaptureLoopController {
    name: String,
    handle: Option<JoinHandle<()>>,
    /// Set once a stop has been requested
    stopping: Arc<AtomicBool>,
    /// Unblocks an iteration that is parked waiting for input
    waker: Option<Waker>,
}

impl CaptureLoopController {
    /// Spawn a thread called `name` that runs `body` until it returns
    /// [`LoopAction::Stop`] or a stop is requested
    ///
    /// Fails only when the operating system refuses to spawn the thread.
    pub fn start<F>(name: &str, mut body: F) -> io::Result<Self>
    where
        F: FnMut() -> LoopAction + Send + 'static,
    {
        let stopping = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stopping);
        let thread_name = name.to_string();

        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                debug!(name = %thread_name, "Loop thread started");
                let mut iterations = 0u64;
                while !flag.load(Ordering::SeqCst) {
                    iterations += 1;
                    if body() == LoopAction::Stop {
                        debug!(name = %thread_name, iterations, "Loop body finished");
                        break;
                    }
                }
                info!(name = %thread_name, iterations, "Loop thread exiting");
            })?;

        info!(name, "Started loop thread");
        Ok(Self {
            name: name.to_string(),
            handle: Some(handle),
            stopping,
            waker: None,
        })
    }

    /// Register a closure that unblocks the loop body when a stop is requested
    pub fn with_waker<W>(mut self, waker: W) -> Self
    where
        W: Fn() + Send + Sync + 'static,
    {
        self.waker = Some(Box::new(waker));
        self
    }

    /// True while the thread has not exited
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Ask the loop to stop without waiting for it
    pub fn request_stop(&self) {
        if self.stopping.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(name = %self.name, "Stop requested");
        if let Some(wake) = &self.waker {
            wake();
        }
    }

    /// Request a stop and wait for the thread to exit
    ///
    /// From the loop's own thread this only requests the stop.
    pub fn stop(&mut self) {
        self.request_stop();
        self.join();
    }

    /// Wait for the thread to exit on its own
    pub fn join(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            warn!(name = %self.name, "Loop asked to join itself, detaching instead");
            return;
        }
        match handle.join() {
            Ok(()) => debug!(name = %self.name, "Loop thread joined"),
            Err(e) => warn!(name = %self.name, "Loop thread panicked: {:?}", e),
        }
    }
}

impl Drop for CaptureLoopController {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop();
        }
    }
}

impl std::fmt::Debug for CaptureLoopController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureLoopController")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    #[test]
    fn test_body_can_end_the_loop() {
        let runs = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&runs);

        let mut controller = CaptureLoopController::start("self-stopping", move || {
            if seen.fetch_add(1, Ordering::SeqCst) == 4 {
                LoopAction::Stop
            } else {
                LoopAction::Continue
            }
        })
        .expect("spawn");

        controller.join();
        assert_eq!(runs.load(Ordering::SeqCst), 5);
        assert!(!controller.is_running());
    }

    #[test]
    fn test_no_iteration_after_stop_returns() {
        let runs = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&runs);

        let mut controller = CaptureLoopController::start("stoppable", move || {
            seen.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(5));
            LoopAction::Continue
        })
        .expect("spawn");

        while runs.load(Ordering::SeqCst) == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        controller.stop();
        let at_stop = runs.load(Ordering::SeqCst);

        thread::sleep(Duration::from_millis(30));
        assert_eq!(runs.load(Ordering::SeqCst), at_stop);
        assert!(!controller.is_running());

        // A second stop has nothing left to do
        controller.stop();
    }

    #[test]
    fn test_waker_unblocks_parked_iteration() {
        let (tx, rx) = mpsc::channel::<()>();
        let rx = std::sync::Mutex::new(rx);

        let mut controller = CaptureLoopController::start("parked", move || {
            // Parks far longer than the test is willing to wait
            let _ = rx.lock().expect("rx").recv_timeout(Duration::from_secs(30));
            LoopAction::Continue
        })
        .expect("spawn")
        .with_waker(move || {
            let _ = tx.send(());
        });

        thread::sleep(Duration::from_millis(20));
        let started = Instant::now();
        controller.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_drop_stops_thread() {
        let runs = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&runs);
        let controller = CaptureLoopController::start("dropped", move || {
            seen.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(5));
            LoopAction::Continue
        })
        .expect("spawn");
        assert!(controller.is_running());

        drop(controller);
        let at_drop = runs.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(runs.load(Ordering::SeqCst), at_drop);
    }
}
