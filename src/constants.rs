// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

/// GStreamer pipeline constants
pub mod pipeline {
    /// Appsink queue depth; one buffer makes the sink itself latest-wins
    pub const MAX_BUFFERS: u32 = 1;

    /// Output pixel format requested from videoconvert
    pub const OUTPUT_FORMAT: &str = "BGRA";

    /// Device class matched by the GStreamer device monitor
    pub const VIDEO_SOURCE_CLASS: &str = "Video/Source";
}

/// Timing constants
pub mod timing {
    use std::time::Duration;

    /// Frame counter modulo for periodic logging
    pub const FRAME_LOG_INTERVAL: u64 = 30;

    /// How long the dispatch thread parks before re-checking its stop signal
    pub const DISPATCH_POLL_INTERVAL: Duration = Duration::from_millis(100);

    /// Pipeline state change timeout on stop
    pub const STOP_TIMEOUT_SECS: u64 = 2;

    /// Pipeline playing state timeout on start
    pub const START_TIMEOUT_SECS: u64 = 5;
}

/// Text analysis constants
pub mod analysis {
    use std::time::Duration;

    /// Largest side processed by the QR recognizer (frames are downscaled to this)
    pub const DEFAULT_MAX_DIMENSION: u32 = 640;

    /// Thread name of the background recognition task
    pub const THREAD_NAME: &str = "text-analysis";

    /// Upper bound used by shutdown paths that want recognition to settle
    pub const IDLE_WAIT: Duration = Duration::from_secs(2);
}

/// Synthetic backend defaults
pub mod synthetic {
    /// Resolutions offered by the default synthetic camera
    pub const DEFAULT_RESOLUTIONS: &[(u32, u32)] = &[(320, 240), (640, 480), (1280, 720)];

    /// Frame rate of the default synthetic camera
    pub const DEFAULT_FPS: u32 = 30;
}

/// Resolution labels for listings
pub fn get_resolution_label(width: u32) -> Option<&'static str> {
    match width {
        w if w >= 3840 => Some("4K"), // 3840x2160
        w if w >= 2560 => Some("2K"), // 2560x1440
        w if w >= 1920 => Some("HD"), // 1920x1080
        w if w >= 640 => Some("SD"),  // 640x480
        _ => None,
    }
}

/// Application information utilities
pub mod app_info {
    /// Get the application version from build-time environment
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }
}
