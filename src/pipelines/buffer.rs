// SPDX-License-Identifier: GPL-3.0-only

//! Latest preview/processed frame pair
//!
//! Both slots live behind one pointer that is swapped on publish, so a
//! reader always gets a preview and a processed frame from the same cycle.

use crate::media::Frame;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// Frames published by one successful cycle
#[derive(Debug, Clone)]
pub struct FramePair {
    /// Captured frame after color conversion
    pub preview: Frame,
    /// Output of the transformation stage for the same capture
    pub processed: Frame,
    /// Pipeline-wide publish counter, starting at 1
    pub sequence: u64,
    pub published_at: Instant,
}

/// Two-slot frame buffer; no history is kept
#[derive(Debug, Default)]
pub struct LatestFrames {
    current: RwLock<Option<Arc<FramePair>>>,
}

impl LatestFrames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace both slots at once
    pub fn publish(&self, preview: Frame, processed: Frame, sequence: u64) -> Arc<FramePair> {
        let pair = Arc::new(FramePair {
            preview,
            processed,
            sequence,
            published_at: Instant::now(),
        });
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&pair));
        pair
    }

    /// Both slots as one consistent pair; `None` before the first publish
    pub fn latest(&self) -> Option<Arc<FramePair>> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn read_preview(&self) -> Option<Frame> {
        self.latest().map(|pair| pair.preview.clone())
    }

    pub fn read_processed(&self) -> Option<Frame> {
        self.latest().map(|pair| pair.processed.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_empty_before_first_publish() {
        let frames = LatestFrames::new();
        assert!(frames.read_preview().is_none());
        assert!(frames.read_processed().is_none());
        assert!(frames.latest().is_none());
    }

    #[test]
    fn test_publish_overwrites_pair() {
        let frames = LatestFrames::new();
        frames.publish(Frame::filled(1, 1, [1; 4]), Frame::filled(1, 1, [2; 4]), 1);
        frames.publish(Frame::filled(1, 1, [3; 4]), Frame::filled(1, 1, [4; 4]), 2);

        let pair = frames.latest().expect("pair");
        assert_eq!(pair.sequence, 2);
        assert_eq!(frames.read_preview().and_then(|f| f.pixel(0, 0)), Some([3; 4]));
        assert_eq!(frames.read_processed().and_then(|f| f.pixel(0, 0)), Some([4; 4]));
    }

    #[test]
    fn test_readers_never_see_mixed_pairs() {
        let frames = Arc::new(LatestFrames::new());
        let writer = {
            let frames = Arc::clone(&frames);
            thread::spawn(move || {
                for i in 1..=500u64 {
                    let v = (i % 250) as u8;
                    frames.publish(Frame::filled(2, 2, [v; 4]), Frame::filled(2, 2, [v; 4]), i);
                }
            })
        };

        let mut last_sequence = 0;
        while !writer.is_finished() {
            if let Some(pair) = frames.latest() {
                assert_eq!(pair.preview.pixel(0, 0), pair.processed.pixel(0, 0));
                assert!(pair.sequence >= last_sequence);
                last_sequence = pair.sequence;
            }
        }
        writer.join().expect("writer");
        assert_eq!(frames.latest().expect("pair").sequence, 500);
    }
}
