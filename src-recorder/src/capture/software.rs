//! CPU framebuffer device.
//!
//! Stands in for a GPU when the renderer draws in software, and gives the
//! rest of the pipeline a device that works everywhere.

use super::types::{frame_len, BYTES_PER_PIXEL};
use super::CaptureDevice;
use crate::error::RecorderError;

/// A BGRA8 framebuffer the application renders into.
#[derive(Debug, Clone)]
pub struct SoftwareSurface {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl SoftwareSurface {
    /// Create a black, opaque surface.
    pub fn new(width: u32, height: u32) -> Self {
        let mut surface = Self {
            width,
            height,
            pixels: vec![0; frame_len(width, height)],
        };
        surface.fill([0, 0, 0, 255]);
        surface
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Fill every pixel with one BGRA value.
    pub fn fill(&mut self, bgra: [u8; 4]) {
        for px in self.pixels.chunks_exact_mut(BYTES_PER_PIXEL) {
            px.copy_from_slice(&bgra);
        }
    }

    /// Set one pixel. Out-of-bounds coordinates are ignored.
    pub fn put_pixel(&mut self, x: u32, y: u32, bgra: [u8; 4]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let offset = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        self.pixels[offset..offset + BYTES_PER_PIXEL].copy_from_slice(&bgra);
    }

    /// One row of pixels, for renderers that draw scanlines.
    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let stride = self.width as usize * BYTES_PER_PIXEL;
        let start = y as usize * stride;
        &mut self.pixels[start..start + stride]
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

/// Device whose "GPU" memory is ordinary heap memory.
///
/// Copies complete immediately, so readback never blocks.
#[derive(Debug, Default)]
pub struct SoftwareDevice {
    copies: u64,
    reads: u64,
}

impl SoftwareDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Surface copies issued so far.
    pub fn copies(&self) -> u64 {
        self.copies
    }

    /// Staging readbacks performed so far.
    pub fn reads(&self) -> u64 {
        self.reads
    }
}

impl CaptureDevice for SoftwareDevice {
    type Surface = SoftwareSurface;
    type Staging = Vec<u8>;

    fn surface_size(&self, surface: &SoftwareSurface) -> (u32, u32) {
        (surface.width, surface.height)
    }

    fn create_staging(&mut self, width: u32, height: u32) -> Result<Vec<u8>, RecorderError> {
        Ok(vec![0; frame_len(width, height)])
    }

    fn copy_to_staging(
        &mut self,
        surface: &SoftwareSurface,
        staging: &mut Vec<u8>,
    ) -> Result<(), RecorderError> {
        if staging.len() != surface.pixels.len() {
            return Err(RecorderError::Device(format!(
                "staging buffer holds {} bytes, surface has {}",
                staging.len(),
                surface.pixels.len()
            )));
        }
        staging.copy_from_slice(&surface.pixels);
        self.copies += 1;
        Ok(())
    }

    fn read_staging(&mut self, staging: &mut Vec<u8>) -> Result<Vec<u8>, RecorderError> {
        self.reads += 1;
        Ok(staging.clone())
    }
}
