//! In-order buffer of captured frames awaiting rate conversion.

use crate::capture::CapturedFrame;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::warn;

/// FIFO of captured frames, tagged with their render time.
///
/// Frames are never reordered. Timestamps are expected to arrive
/// non-decreasing; the frame source guarantees this.
#[derive(Debug, Default)]
pub struct FrameQueue {
    frames: VecDeque<CapturedFrame>,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: CapturedFrame) {
        if let Some(last) = self.frames.back() {
            if frame.timestamp() < last.timestamp() {
                warn!(
                    "Frame {} stamped {:?} arrived after {:?}; keeping arrival order",
                    frame.sequence(),
                    frame.timestamp(),
                    last.timestamp()
                );
            }
        }
        self.frames.push_back(frame);
    }

    /// Remove and return, in order, every frame stamped at or before `time`.
    pub fn pop_all_up_to(&mut self, time: Duration) -> Vec<CapturedFrame> {
        let count = self
            .frames
            .iter()
            .take_while(|f| f.timestamp() <= time)
            .count();
        self.frames.drain(..count).collect()
    }

    /// Remove and return everything still queued.
    pub fn drain_all(&mut self) -> Vec<CapturedFrame> {
        self.frames.drain(..).collect()
    }

    /// The most recently pushed frame, if any.
    pub fn peek_latest(&self) -> Option<&CapturedFrame> {
        self.frames.back()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
