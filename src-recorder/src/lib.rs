//! SteadyRec recording core.
//!
//! Captures frames from a real-time renderer with jittery timing and
//! produces a constant frame-rate, losslessly encoded video.

pub mod capture;
pub mod config;
pub mod convert;
pub mod encoder;
pub mod error;
pub mod queue;
pub mod state;

pub use capture::{CaptureDevice, CapturedFrame, FrameSource, SoftwareDevice, SoftwareSurface};
pub use config::{RecorderSettings, RecordingConfig};
pub use convert::{OutputFrame, RateConverter};
pub use encoder::{EncoderLauncher, EncoderSink, FfmpegLauncher, StreamParams};
pub use error::RecorderError;
pub use state::{Recorder, RecordingSession};
pub use steadyrec_common::{ConversionPolicy, RecorderState, RecordingSummary};

#[cfg(feature = "wgpu")]
pub use capture::WgpuDevice;
