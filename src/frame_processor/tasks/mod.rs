// SPDX-License-Identifier: GPL-3.0-only

//! Frame analysis tasks
//!
//! This module contains the recognizer abstraction and its implementations.

pub mod qr_detector;

pub use qr_detector::QrTextRecognizer;

use crate::errors::AnalysisError;
use crate::media::Frame;

/// Extracts text from a frame
///
/// May be slow; it is only ever called from the background analysis task.
/// The result holds one line per recognized item, each terminated by `\n`,
/// or is empty when nothing was found.
pub trait TextRecognizer: Send + Sync {
    fn recognize_text(&self, frame: &Frame) -> Result<String, AnalysisError>;
}
