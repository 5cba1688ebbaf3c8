// SPDX-License-Identifier: MPL-2.0

//! Background frame analysis
//!
//! Transformed frames are offered to a [`TextRecognizer`] through the
//! [`AnalysisThrottle`], which runs at most one recognition at a time and
//! drops frames offered while busy. Currently implements QR code text
//! recognition.

pub mod tasks;
pub mod throttle;

pub use tasks::{QrTextRecognizer, TextRecognizer};
pub use throttle::{AnalysisStats, AnalysisThrottle, SubmitOutcome};
