// SPDX-License-Identifier: MPL-2.0

//! Integration tests for constants module

use camera_pipeline::constants::{analysis, get_resolution_label, pipeline, synthetic};

#[test]
fn test_resolution_labels() {
    assert_eq!(get_resolution_label(3840), Some("4K"));
    assert_eq!(get_resolution_label(2560), Some("2K"));
    assert_eq!(get_resolution_label(1920), Some("HD"));
    assert_eq!(get_resolution_label(640), Some("SD"));
    assert_eq!(get_resolution_label(320), None);
}

#[test]
fn test_capture_keeps_single_buffer() {
    // Latest-wins delivery: the sink never queues more than one frame
    assert_eq!(pipeline::MAX_BUFFERS, 1);
}

#[test]
fn test_synthetic_defaults_are_ordered() {
    let pixels: Vec<u32> = synthetic::DEFAULT_RESOLUTIONS
        .iter()
        .map(|(w, h)| w * h)
        .collect();
    assert!(pixels.windows(2).all(|w| w[0] < w[1]));
    assert!(synthetic::DEFAULT_FPS > 0);
}

#[test]
fn test_analysis_defaults() {
    assert!(analysis::DEFAULT_MAX_DIMENSION >= 64);
    assert_eq!(analysis::THREAD_NAME, "text-analysis");
}
