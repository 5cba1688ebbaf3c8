// SPDX-License-Identifier: GPL-3.0-only

//! Live frame pipeline
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │  PipelineController  │  ← initialize / deinitialize, frame callback
//! └──────────┬───────────┘
//!            │ select_source + best_format
//!            ▼
//! ┌──────────────────────┐      ┌──────────────────┐
//! │    CaptureSession    │ ───▶ │   LatestFrames   │ ← preview + processed
//! │ (device + dispatch)  │      └──────────────────┘
//! └──────────┬───────────┘      ┌──────────────────┐
//!            └────────────────▶ │ AnalysisThrottle │ ← text recognition
//!                               └──────────────────┘
//! ```
//!
//! - [`selector`]: Color source and format selection
//! - [`session`]: Capture session lifecycle and frame dispatch
//! - [`buffer`]: Latest frame pair
//! - [`controller`]: Orchestration and the per-frame body

pub mod buffer;
pub mod controller;
pub mod selector;
pub mod session;

pub use buffer::{FramePair, LatestFrames};
pub use controller::{FrameReadyReceiver, PipelineController, PipelineState, PipelineStats};
pub use selector::{best_format, select_source};
pub use session::{CaptureSession, SessionState};
