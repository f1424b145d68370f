//! Frame types produced by the capture stage.

use std::time::Duration;

/// Bytes per pixel of the fixed BGRA8 capture format.
pub const BYTES_PER_PIXEL: usize = 4;

/// Size in bytes of one tightly packed BGRA frame.
pub fn frame_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * BYTES_PER_PIXEL
}

/// A captured frame with its dimensions, pixel data, and capture time.
///
/// Immutable once built. Stages pass it by value; when the same capture
/// backs several output frames it is shared behind an `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedFrame {
    width: u32,
    height: u32,
    /// BGRA pixel data, no row padding
    data: Vec<u8>,
    /// Render-loop time at which the frame was produced
    timestamp: Duration,
    sequence: u64,
}

impl CapturedFrame {
    /// Wrap a BGRA buffer. Returns `None` if the buffer length does not match
    /// the dimensions.
    pub fn new(
        width: u32,
        height: u32,
        data: Vec<u8>,
        timestamp: Duration,
        sequence: u64,
    ) -> Option<Self> {
        if data.len() != frame_len(width, height) {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
            timestamp,
            sequence,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// The same frame stamped at `timestamp`.
    pub(crate) fn with_timestamp(self, timestamp: Duration) -> Self {
        Self { timestamp, ..self }
    }
}
