//! Frame acquisition from the graphics device.
//!
//! The device itself stays behind [`CaptureDevice`]; [`FrameSource`] layers
//! the staging-buffer ring on top so the render loop never waits on a
//! readback issued in the same tick.

pub mod source;
pub mod software;
pub mod types;

#[cfg(feature = "wgpu")]
pub mod gpu;

pub use source::FrameSource;
pub use software::{SoftwareDevice, SoftwareSurface};
pub use types::{frame_len, CapturedFrame, BYTES_PER_PIXEL};

#[cfg(feature = "wgpu")]
pub use gpu::WgpuDevice;

use crate::error::RecorderError;

/// Graphics device operations needed to read back a rendered surface.
///
/// Implementations must treat the surface as read-only.
pub trait CaptureDevice {
    /// Render target frames are read from.
    type Surface: ?Sized;
    /// CPU-readable buffer a surface is copied into.
    type Staging;

    /// Current size of the surface in pixels.
    fn surface_size(&self, surface: &Self::Surface) -> (u32, u32);

    /// Allocate one staging buffer for a `width` x `height` surface.
    fn create_staging(&mut self, width: u32, height: u32) -> Result<Self::Staging, RecorderError>;

    /// Request a copy of `surface` into `staging`.
    ///
    /// Must return without waiting for the copy to complete.
    fn copy_to_staging(
        &mut self,
        surface: &Self::Surface,
        staging: &mut Self::Staging,
    ) -> Result<(), RecorderError>;

    /// Map `staging` and return its contents as tightly packed BGRA8.
    ///
    /// Blocks only if the copy issued into this buffer has not finished yet.
    fn read_staging(&mut self, staging: &mut Self::Staging) -> Result<Vec<u8>, RecorderError>;
}
