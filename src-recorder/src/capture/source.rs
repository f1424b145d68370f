//! Staging-buffer ring that turns surface copies into timestamped frames.

use super::types::{frame_len, CapturedFrame};
use super::CaptureDevice;
use crate::error::RecorderError;
use std::time::Duration;
use tracing::{debug, warn};

/// Default number of staging buffers. Two gives one tick of latency.
pub const DEFAULT_STAGING_SLOTS: usize = 2;

struct StagingSlot<S> {
    buffer: S,
    /// Render time of the copy in flight, if any
    issued_at: Option<Duration>,
}

/// Reads the rendered surface back to the CPU without stalling the render loop.
///
/// Each tick issues a copy into one staging buffer and reads the buffer that
/// was filled `slots - 1` ticks earlier, by which time the GPU has normally
/// finished with it. Frames carry the render time of the tick that drew them,
/// not the time they were read.
pub struct FrameSource<D: CaptureDevice> {
    slots: Vec<StagingSlot<D::Staging>>,
    width: u32,
    height: u32,
    tick: u64,
    next_sequence: u64,
    last_issued: Option<Duration>,
}

impl<D: CaptureDevice> FrameSource<D> {
    /// Allocate the staging ring for a surface of the given size.
    pub fn new(device: &mut D, width: u32, height: u32, slots: usize) -> Result<Self, RecorderError> {
        if slots < 2 {
            return Err(RecorderError::InvalidConfig(format!(
                "at least 2 staging buffers are required, got {}",
                slots
            )));
        }
        if width == 0 || height == 0 {
            return Err(RecorderError::InvalidConfig(format!(
                "invalid surface dimensions: {}x{}",
                width, height
            )));
        }

        let slots = (0..slots)
            .map(|_| {
                device.create_staging(width, height).map(|buffer| StagingSlot {
                    buffer,
                    issued_at: None,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!("Allocated {} staging buffers for {}x{}", slots.len(), width, height);

        Ok(Self {
            slots,
            width,
            height,
            tick: 0,
            next_sequence: 0,
            last_issued: None,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Number of copies issued but not yet read back.
    pub fn pending(&self) -> usize {
        self.slots.iter().filter(|s| s.issued_at.is_some()).count()
    }

    /// Issue this tick's copy and return the frame from an earlier tick, if one
    /// is ready.
    pub fn capture(
        &mut self,
        device: &mut D,
        surface: &D::Surface,
        now: Duration,
    ) -> Result<Option<CapturedFrame>, RecorderError> {
        let (width, height) = device.surface_size(surface);
        if (width, height) != (self.width, self.height) {
            return Err(RecorderError::Device(format!(
                "surface resized from {}x{} to {}x{} during recording",
                self.width, self.height, width, height
            )));
        }

        let now = self.monotonic(now);
        let count = self.slots.len() as u64;
        let write = (self.tick % count) as usize;
        let read = ((self.tick + 1) % count) as usize;
        self.tick += 1;

        debug_assert!(self.slots[write].issued_at.is_none());
        device.copy_to_staging(surface, &mut self.slots[write].buffer)?;
        self.slots[write].issued_at = Some(now);
        self.last_issued = Some(now);

        self.read_slot(device, read)
    }

    /// Read back every copy still in flight, oldest first.
    ///
    /// This waits for the GPU; call it only when the session ends.
    pub fn flush(&mut self, device: &mut D) -> Result<Vec<CapturedFrame>, RecorderError> {
        let count = self.slots.len() as u64;
        let mut frames = Vec::new();
        for offset in 0..count {
            let index = ((self.tick + offset) % count) as usize;
            if let Some(frame) = self.read_slot(device, index)? {
                frames.push(frame);
            }
        }
        Ok(frames)
    }

    fn read_slot(&mut self, device: &mut D, index: usize) -> Result<Option<CapturedFrame>, RecorderError> {
        let slot = &mut self.slots[index];
        let Some(timestamp) = slot.issued_at.take() else {
            return Ok(None);
        };

        let data = device.read_staging(&mut slot.buffer)?;
        let expected = frame_len(self.width, self.height);
        if data.len() != expected {
            return Err(RecorderError::Device(format!(
                "staging readback returned {} bytes, expected {}",
                data.len(),
                expected
            )));
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        Ok(CapturedFrame::new(self.width, self.height, data, timestamp, sequence))
    }

    /// Clamp the render clock so stamps never go backwards.
    fn monotonic(&self, now: Duration) -> Duration {
        match self.last_issued {
            Some(last) if now < last => {
                warn!(
                    "Render clock went backwards ({:?} < {:?}), holding previous timestamp",
                    now, last
                );
                last
            }
            _ => now,
        }
    }
}
