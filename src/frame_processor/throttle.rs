// SPDX-License-Identifier: GPL-3.0-only

//! Single-slot analysis throttle
//!
//! At most one recognition runs at a time. A frame submitted while one is
//! in flight is dropped, never queued, so analysis can lag behind the
//! frame buffer but never builds a backlog. Recognition runs on a tokio
//! blocking-pool thread so the frame delivery thread never waits on it.

use super::tasks::TextRecognizer;
use crate::constants::analysis;
use crate::media::Frame;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{debug, info, warn};

/// Result of [`AnalysisThrottle::submit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A recognition task was started for this frame
    Started,
    /// Another recognition was in flight; the frame was dropped
    Skipped,
    /// The runtime refused the task; the frame was not analyzed
    Failed,
}

/// Counters of throttle activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnalysisStats {
    pub started: u64,
    pub skipped: u64,
    pub completed: u64,
    pub failed: u64,
}

struct ThrottleInner {
    recognizer: Arc<dyn TextRecognizer>,
    busy: AtomicBool,
    last_text: Mutex<Option<String>>,
    idle_lock: Mutex<()>,
    idle: Condvar,
    started: AtomicU64,
    skipped: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Releases the busy flag on every exit path of a recognition task
///
/// Travels inside the blocking closure, so a task the runtime drops without
/// running still releases the slot.
struct BusyGuard {
    inner: Arc<ThrottleInner>,
    ran: bool,
    rejected: Arc<AtomicBool>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        if !self.ran {
            warn!("Text analysis task dropped before it ran");
            self.rejected.store(true, Ordering::Release);
            self.inner.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.inner.busy.store(false, Ordering::Release);
        let _lock = self.inner.idle_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.inner.idle.notify_all();
    }
}

/// Runtime built for analysis when none was running
///
/// Shut down without waiting, so dropping it never blocks on a recognition
/// still in progress and is allowed from async code.
struct OwnedRuntime(Option<Runtime>);

impl Drop for OwnedRuntime {
    fn drop(&mut self) {
        if let Some(runtime) = self.0.take() {
            debug!("Shutting down text analysis runtime");
            runtime.shutdown_background();
        }
    }
}

/// Non-blocking guard around a [`TextRecognizer`]
#[derive(Clone)]
pub struct AnalysisThrottle {
    inner: Arc<ThrottleInner>,
    runtime: Handle,
    _owned: Option<Arc<OwnedRuntime>>,
}

impl AnalysisThrottle {
    /// Run recognitions on the blocking pool of `runtime`
    pub fn new(recognizer: Arc<dyn TextRecognizer>, runtime: Handle) -> Self {
        Self {
            inner: Arc::new(ThrottleInner {
                recognizer,
                busy: AtomicBool::new(false),
                last_text: Mutex::new(None),
                idle_lock: Mutex::new(()),
                idle: Condvar::new(),
                started: AtomicU64::new(0),
                skipped: AtomicU64::new(0),
                completed: AtomicU64::new(0),
                failed: AtomicU64::new(0),
            }),
            runtime,
            _owned: None,
        }
    }

    /// Use the ambient tokio runtime, or start a small one for analysis
    pub fn with_default_runtime(recognizer: Arc<dyn TextRecognizer>) -> io::Result<Self> {
        if let Ok(handle) = Handle::try_current() {
            debug!("Text analysis uses the current tokio runtime");
            return Ok(Self::new(recognizer, handle));
        }

        let runtime = Builder::new_current_thread()
            .thread_name(analysis::THREAD_NAME)
            .max_blocking_threads(1)
            .build()?;
        info!(thread = analysis::THREAD_NAME, "Started text analysis runtime");

        let mut throttle = Self::new(recognizer, runtime.handle().clone());
        throttle._owned = Some(Arc::new(OwnedRuntime(Some(runtime))));
        Ok(throttle)
    }

    /// Start recognition on `frame` unless one is already running
    ///
    /// Never blocks. The frame is shared, not copied: `Frame` is an
    /// immutable snapshot.
    pub fn submit(&self, frame: &Frame) -> SubmitOutcome {
        let inner = &self.inner;
        if inner
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            inner.skipped.fetch_add(1, Ordering::Relaxed);
            return SubmitOutcome::Skipped;
        }
        inner.started.fetch_add(1, Ordering::Relaxed);

        let rejected = Arc::new(AtomicBool::new(false));
        let guard = BusyGuard {
            inner: Arc::clone(inner),
            ran: false,
            rejected: Arc::clone(&rejected),
        };
        let snapshot = frame.clone();

        // Panics when the OS refuses a blocking thread; the guard unwinds with the task
        let spawned = panic::catch_unwind(AssertUnwindSafe(|| {
            self.runtime.spawn_blocking(move || {
                let mut guard = guard;
                guard.ran = true;
                guard.inner.run(&snapshot);
            })
        }));

        if spawned.is_err() || rejected.load(Ordering::Acquire) {
            warn!("Could not start text analysis");
            return SubmitOutcome::Failed;
        }
        SubmitOutcome::Started
    }

    /// True while a recognition task is in flight
    pub fn is_busy(&self) -> bool {
        self.inner.busy.load(Ordering::Acquire)
    }

    /// Most recent non-empty recognition result
    pub fn last_text(&self) -> Option<String> {
        self.inner
            .last_text
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn stats(&self) -> AnalysisStats {
        let inner = &self.inner;
        AnalysisStats {
            started: inner.started.load(Ordering::Relaxed),
            skipped: inner.skipped.load(Ordering::Relaxed),
            completed: inner.completed.load(Ordering::Relaxed),
            failed: inner.failed.load(Ordering::Relaxed),
        }
    }

    /// Block until no recognition is in flight; `false` on timeout
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let inner = &self.inner;
        let lock = inner.idle_lock.lock().unwrap_or_else(|e| e.into_inner());
        let (_lock, result) = inner
            .idle
            .wait_timeout_while(lock, timeout, |_| inner.busy.load(Ordering::Acquire))
            .unwrap_or_else(|e| e.into_inner());
        !result.timed_out() || !self.is_busy()
    }
}

impl ThrottleInner {
    fn run(&self, frame: &Frame) {
        let outcome =
            panic::catch_unwind(AssertUnwindSafe(|| self.recognizer.recognize_text(frame)));

        match outcome {
            Ok(Ok(text)) => {
                if !text.is_empty() {
                    debug!(lines = text.lines().count(), "Recognized text");
                    *self.last_text.lock().unwrap_or_else(|e| e.into_inner()) = Some(text);
                }
                self.completed.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                debug!(error = %e, "Text recognition failed");
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                warn!("Text recognizer panicked");
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

impl std::fmt::Debug for AnalysisThrottle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisThrottle")
            .field("busy", &self.is_busy())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AnalysisError;
    use std::sync::mpsc;

    /// Blocks until released, then returns the scripted result
    struct Gated {
        release: Mutex<mpsc::Receiver<Result<String, AnalysisError>>>,
    }

    impl TextRecognizer for Gated {
        fn recognize_text(&self, _: &Frame) -> Result<String, AnalysisError> {
            self.release
                .lock()
                .unwrap()
                .recv_timeout(Duration::from_secs(5))
                .unwrap_or_else(|_| Err(AnalysisError("gate timed out".into())))
        }
    }

    fn gated() -> (AnalysisThrottle, mpsc::Sender<Result<String, AnalysisError>>) {
        let (tx, rx) = mpsc::channel();
        let recognizer = Arc::new(Gated {
            release: Mutex::new(rx),
        });
        let throttle = AnalysisThrottle::with_default_runtime(recognizer).expect("runtime");
        (throttle, tx)
    }

    fn frame() -> Frame {
        Frame::filled(2, 2, [0, 0, 0, 255])
    }

    #[test]
    fn test_submit_while_busy_is_skipped() {
        let (throttle, release) = gated();

        assert_eq!(throttle.submit(&frame()), SubmitOutcome::Started);
        assert!(throttle.is_busy());
        assert_eq!(throttle.submit(&frame()), SubmitOutcome::Skipped);
        assert_eq!(throttle.submit(&frame()), SubmitOutcome::Skipped);
        assert!(throttle.is_busy());

        release.send(Ok("hello\n".into())).unwrap();
        assert!(throttle.wait_idle(Duration::from_secs(5)));
        assert_eq!(throttle.last_text().as_deref(), Some("hello\n"));

        let stats = throttle.stats();
        assert_eq!((stats.started, stats.skipped, stats.completed), (1, 2, 1));
    }

    #[test]
    fn test_failure_releases_busy_and_keeps_text() {
        let (throttle, release) = gated();

        throttle.submit(&frame());
        release.send(Ok("first\n".into())).unwrap();
        assert!(throttle.wait_idle(Duration::from_secs(5)));

        throttle.submit(&frame());
        release.send(Err(AnalysisError("engine failure".into()))).unwrap();
        assert!(throttle.wait_idle(Duration::from_secs(5)));
        assert!(!throttle.is_busy());
        assert_eq!(throttle.last_text().as_deref(), Some("first\n"));
        assert_eq!(throttle.stats().failed, 1);
    }

    #[test]
    fn test_empty_result_is_not_recorded() {
        let (throttle, release) = gated();
        throttle.submit(&frame());
        release.send(Ok(String::new())).unwrap();
        assert!(throttle.wait_idle(Duration::from_secs(5)));
        assert_eq!(throttle.last_text(), None);
        assert_eq!(throttle.stats().completed, 1);
    }

    #[test]
    fn test_panicking_recognizer_releases_busy() {
        struct Panics;
        impl TextRecognizer for Panics {
            fn recognize_text(&self, _: &Frame) -> Result<String, AnalysisError> {
                panic!("recognizer exploded");
            }
        }

        let throttle = AnalysisThrottle::with_default_runtime(Arc::new(Panics)).expect("runtime");
        throttle.submit(&frame());
        assert!(throttle.wait_idle(Duration::from_secs(5)));
        assert!(!throttle.is_busy());
        assert_eq!(throttle.stats().failed, 1);
        assert_eq!(throttle.submit(&frame()), SubmitOutcome::Started);
    }

    /// Records the thread each recognition ran on
    struct ThreadName(Mutex<Vec<Option<String>>>);

    impl TextRecognizer for ThreadName {
        fn recognize_text(&self, _: &Frame) -> Result<String, AnalysisError> {
            let name = std::thread::current().name().map(str::to_string);
            self.0.lock().unwrap().push(name);
            Ok("seen".into())
        }
    }

    #[test]
    fn test_recognition_runs_on_analysis_pool() {
        let recognizer = Arc::new(ThreadName(Mutex::new(Vec::new())));
        let throttle =
            AnalysisThrottle::with_default_runtime(Arc::clone(&recognizer) as Arc<dyn TextRecognizer>)
                .expect("runtime");

        assert_eq!(throttle.submit(&frame()), SubmitOutcome::Started);
        assert!(throttle.wait_idle(Duration::from_secs(5)));
        assert_eq!(
            recognizer.0.lock().unwrap().as_slice(),
            &[Some(analysis::THREAD_NAME.to_string())]
        );
    }

    #[test]
    fn test_submit_after_runtime_shutdown_fails() {
        let runtime = Builder::new_current_thread().build().expect("runtime");
        let handle = runtime.handle().clone();
        drop(runtime);

        let recognizer = Arc::new(ThreadName(Mutex::new(Vec::new())));
        let throttle =
            AnalysisThrottle::new(Arc::clone(&recognizer) as Arc<dyn TextRecognizer>, handle);

        assert_eq!(throttle.submit(&frame()), SubmitOutcome::Failed);
        assert!(!throttle.is_busy());
        assert!(throttle.wait_idle(Duration::from_millis(10)));
        assert!(recognizer.0.lock().unwrap().is_empty());

        let stats = throttle.stats();
        assert_eq!((stats.started, stats.completed, stats.failed), (1, 0, 1));

        // The slot is free for the next frame, which fails the same way
        assert_eq!(throttle.submit(&frame()), SubmitOutcome::Failed);
        assert_eq!(throttle.stats().failed, 2);
    }
}
