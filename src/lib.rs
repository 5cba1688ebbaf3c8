// SPDX-License-Identifier: MPL-2.0

//! Camera Pipeline - live camera capture with a transformation stage and
//! throttled text analysis
//!
//! Frames flow from a camera backend through color conversion and a
//! transformation stage into a two-slot buffer holding the latest preview
//! and processed frames. Transformed frames are opportunistically handed to
//! a text recognizer, one at a time.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Camera backend abstraction (synthetic, GStreamer)
//! - [`media`]: Frame types, color conversion and filters
//! - [`frame_processor`]: Background text analysis
//! - [`pipelines`]: Source selection, capture session and the controller
//! - [`config`]: User configuration handling
//!
//! # Example
//!
//! ```no_run
//! use camera_pipeline::{Config, PipelineController};
//!
//! let controller = PipelineController::from_config(&Config::default())?;
//! controller.initialize()?;
//! if let Some(pair) = controller.latest_frames() {
//!     println!("{}x{}", pair.preview.width(), pair.preview.height());
//! }
//! controller.deinitialize();
//! # Ok::<(), camera_pipeline::errors::AppError>(())
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod frame_processor;
pub mod media;
pub mod pipelines;

// Re-export commonly used types
pub use config::Config;
pub use media::{FilterType, Frame};
pub use pipelines::{FramePair, FrameReadyReceiver, PipelineController, PipelineState};
