//! GPU readback from wgpu render targets.
//!
//! Copies are recorded with `copy_texture_to_buffer` and submitted straight
//! away; the buffer is mapped asynchronously and only waited on when the
//! frame source comes back for it a tick later.

use super::types::BYTES_PER_PIXEL;
use super::CaptureDevice;
use crate::error::RecorderError;
use std::sync::{Arc, Mutex};
use tracing::debug;

type MapOutcome = Arc<Mutex<Option<Result<(), wgpu::BufferAsyncError>>>>;

/// Capture device backed by a wgpu device and queue.
///
/// The render target must be a 2D `Bgra8*` or `Rgba8*` texture created with
/// `TextureUsages::COPY_SRC`.
pub struct WgpuDevice {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
}

/// A `MAP_READ` buffer with rows padded to `COPY_BYTES_PER_ROW_ALIGNMENT`.
pub struct WgpuStaging {
    buffer: wgpu::Buffer,
    padded_bytes_per_row: u32,
    width: u32,
    height: u32,
    submission: Option<wgpu::SubmissionIndex>,
    source_is_rgba: bool,
    mapped: MapOutcome,
}

impl WgpuDevice {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self { device, queue }
    }
}

fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * BYTES_PER_PIXEL as u32;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

fn is_rgba(format: wgpu::TextureFormat) -> Result<bool, RecorderError> {
    match format {
        wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb => Ok(false),
        wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Rgba8UnormSrgb => Ok(true),
        other => Err(RecorderError::Device(format!(
            "unsupported render target format {:?}",
            other
        ))),
    }
}

impl CaptureDevice for WgpuDevice {
    type Surface = wgpu::Texture;
    type Staging = WgpuStaging;

    fn surface_size(&self, surface: &wgpu::Texture) -> (u32, u32) {
        (surface.width(), surface.height())
    }

    fn create_staging(&mut self, width: u32, height: u32) -> Result<WgpuStaging, RecorderError> {
        let padded = padded_bytes_per_row(width);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("steadyrec staging buffer"),
            size: padded as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        Ok(WgpuStaging {
            buffer,
            padded_bytes_per_row: padded,
            width,
            height,
            submission: None,
            source_is_rgba: false,
            mapped: Arc::new(Mutex::new(None)),
        })
    }

    fn copy_to_staging(
        &mut self,
        surface: &wgpu::Texture,
        staging: &mut WgpuStaging,
    ) -> Result<(), RecorderError> {
        if !surface.usage().contains(wgpu::TextureUsages::COPY_SRC) {
            return Err(RecorderError::Device(
                "render target was not created with COPY_SRC usage".to_string(),
            ));
        }
        staging.source_is_rgba = is_rgba(surface.format())?;

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("steadyrec capture encoder"),
            });
        encoder.copy_texture_to_buffer(
            surface.as_image_copy(),
            wgpu::ImageCopyBuffer {
                buffer: &staging.buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(staging.padded_bytes_per_row),
                    rows_per_image: Some(staging.height),
                },
            },
            wgpu::Extent3d {
                width: staging.width,
                height: staging.height,
                depth_or_array_layers: 1,
            },
        );
        let index = self.queue.submit(std::iter::once(encoder.finish()));

        // The map request is queued behind the copy; nothing waits here.
        let outcome = staging.mapped.clone();
        if let Ok(mut slot) = outcome.lock() {
            *slot = None;
        }
        staging
            .buffer
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                if let Ok(mut slot) = outcome.lock() {
                    *slot = Some(result);
                }
            });
        let _ = self.device.poll(wgpu::Maintain::Poll);

        staging.submission = Some(index);
        Ok(())
    }

    fn read_staging(&mut self, staging: &mut WgpuStaging) -> Result<Vec<u8>, RecorderError> {
        let Some(index) = staging.submission.take() else {
            return Err(RecorderError::Device(
                "readback requested before any copy was issued".to_string(),
            ));
        };

        let ready = staging
            .mapped
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false);
        if !ready {
            debug!("Staging buffer not mapped yet, waiting on submission");
            let _ = self
                .device
                .poll(wgpu::Maintain::WaitForSubmissionIndex(index));
        }

        let outcome = staging
            .mapped
            .lock()
            .map_err(|_| RecorderError::Device("map state lock poisoned".to_string()))?
            .take();
        match outcome {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                return Err(RecorderError::Device(format!("failed to map staging buffer: {}", e)))
            }
            None => {
                return Err(RecorderError::Device(
                    "staging buffer map did not complete".to_string(),
                ))
            }
        }

        let row_bytes = staging.width as usize * BYTES_PER_PIXEL;
        let mut pixels = Vec::with_capacity(row_bytes * staging.height as usize);
        {
            let view = staging.buffer.slice(..).get_mapped_range();
            for row in view.chunks(staging.padded_bytes_per_row as usize) {
                pixels.extend_from_slice(&row[..row_bytes]);
            }
        }
        staging.buffer.unmap();

        if staging.source_is_rgba {
            for px in pixels.chunks_exact_mut(BYTES_PER_PIXEL) {
                px.swap(0, 2);
            }
        }

        Ok(pixels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_padding() {
        assert_eq!(padded_bytes_per_row(64), 256);
        assert_eq!(padded_bytes_per_row(65), 512);
        assert_eq!(padded_bytes_per_row(1), 256);
    }

    #[test]
    fn test_supported_formats() {
        assert_eq!(is_rgba(wgpu::TextureFormat::Bgra8Unorm), Ok(false));
        assert_eq!(is_rgba(wgpu::TextureFormat::Rgba8UnormSrgb), Ok(true));
        assert!(is_rgba(wgpu::TextureFormat::R32Float).is_err());
    }
}
