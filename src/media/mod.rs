// SPDX-License-Identifier: MPL-2.0

//! Frame representation, color conversion and the transformation stage
//!
//! # Color Space Conversion
//!
//! Backends deliver frames in whatever raw layout the device produces
//! (packed RGB, packed 4:2:2, planar or semi-planar 4:2:0). The
//! [`conversions`] module turns each of these into the one format the rest
//! of the pipeline uses: BGRA8 with premultiplied alpha.
//!
//! # Transformation
//!
//! The [`filters`] module defines the [`FrameTransform`] seam and the
//! built-in CPU filters.
//!
//! # Modules
//!
//! - [`frame`]: Immutable [`Frame`] and writable [`OutputFrame`]
//! - [`conversions`]: Raw frame to premultiplied BGRA
//! - [`filters`]: Transformation stage

pub mod conversions;
pub mod filters;
pub mod frame;

pub use conversions::to_bgra_premultiplied;
pub use filters::{FilterTransform, FilterType, FrameTransform};
pub use frame::{Frame, OutputFrame};
