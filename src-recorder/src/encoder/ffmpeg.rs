//! FFmpeg encoder process driven through ffmpeg-sidecar.
//!
//! Raw BGRA frames are piped into ffmpeg's stdin and written with a
//! lossless codec so the recording matches the rendered output exactly.

use super::{EncoderBackend, EncoderLauncher, StreamParams};
use crate::error::RecorderError;
use ffmpeg_sidecar::command::FfmpegCommand;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

/// Resolve the path to the FFmpeg binary.
///
/// An explicitly configured path wins; otherwise FFmpeg is looked up on
/// `PATH`, and finally next to our own executable where ffmpeg-sidecar's
/// downloader places it.
pub fn resolve_ffmpeg_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    match which::which("ffmpeg") {
        Ok(path) => path,
        Err(_) => ffmpeg_sidecar::paths::ffmpeg_path(),
    }
}

/// Ensure FFmpeg can be executed.
///
/// Runs `ffmpeg -version`. If no explicit path was configured and the binary
/// is missing, falls back to ffmpeg-sidecar's auto-download.
pub fn ensure_ffmpeg(explicit: Option<&Path>) -> Result<PathBuf, String> {
    let ffmpeg = resolve_ffmpeg_path(explicit);
    debug!("Resolved ffmpeg path: {}", ffmpeg.display());

    match Command::new(&ffmpeg)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
    {
        Ok(status) if status.success() => Ok(ffmpeg),
        Ok(status) => Err(format!(
            "FFmpeg binary at {} exited with status: {}",
            ffmpeg.display(),
            status
        )),
        Err(e) if explicit.is_none() => {
            warn!("FFmpeg not found at {}: {}; downloading", ffmpeg.display(), e);
            ffmpeg_sidecar::download::auto_download()
                .map_err(|e| format!("FFmpeg not found and auto-download failed: {}", e))?;
            Ok(ffmpeg_sidecar::paths::ffmpeg_path())
        }
        Err(e) => Err(format!("FFmpeg not found at {}: {}", ffmpeg.display(), e)),
    }
}

/// Lossless video codecs, in order of preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LosslessEncoder {
    /// H.264 in RGB mode at qp 0
    X264Rgb,
    /// FFV1, built into every FFmpeg
    Ffv1,
}

impl LosslessEncoder {
    pub fn name(&self) -> &'static str {
        match self {
            LosslessEncoder::X264Rgb => "libx264rgb",
            LosslessEncoder::Ffv1 => "ffv1",
        }
    }

    fn codec_args(&self) -> &'static [&'static str] {
        match self {
            LosslessEncoder::X264Rgb => &["-c:v", "libx264rgb", "-qp", "0", "-preset", "ultrafast"],
            LosslessEncoder::Ffv1 => &["-c:v", "ffv1", "-level", "3"],
        }
    }

    /// Pick the best codec listed by `ffmpeg -encoders`.
    pub fn detect(ffmpeg: &Path) -> Self {
        let output = Command::new(ffmpeg).args(["-encoders", "-hide_banner"]).output();
        let listing = match output {
            Ok(o) => String::from_utf8_lossy(&o.stdout).to_string(),
            Err(e) => {
                warn!("Failed to run ffmpeg -encoders: {}", e);
                String::new()
            }
        };
        Self::from_listing(&listing)
    }

    fn from_listing(listing: &str) -> Self {
        let has = |name: &str| {
            listing
                .lines()
                .any(|l| l.split_whitespace().nth(1) == Some(name))
        };
        if has("libx264rgb") {
            LosslessEncoder::X264Rgb
        } else {
            LosslessEncoder::Ffv1
        }
    }
}

/// Command-line arguments for a raw BGRA stdin stream.
pub fn encoder_args(params: &StreamParams, encoder: LosslessEncoder) -> Vec<String> {
    let mut args: Vec<String> = [
        "-f",
        "rawvideo",
        "-pix_fmt",
        "bgra",
        "-s",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.push(format!("{}x{}", params.width, params.height));
    args.push("-r".to_string());
    args.push(format_rate(params.output_fps));
    args.extend(["-i", "-"].iter().map(|s| s.to_string()));
    args.extend(encoder.codec_args().iter().map(|s| s.to_string()));
    args.push("-y".to_string());
    args.push(params.output_path.to_string_lossy().to_string());
    args
}

/// Integral rates print without a fraction so ffmpeg keeps an exact timebase.
fn format_rate(fps: f64) -> String {
    if fps.fract() == 0.0 {
        format!("{}", fps as u64)
    } else {
        format!("{}", fps)
    }
}

/// Launches one FFmpeg process per recording.
#[derive(Debug, Clone)]
pub struct FfmpegLauncher {
    ffmpeg: PathBuf,
    encoder: LosslessEncoder,
}

impl FfmpegLauncher {
    /// Resolve FFmpeg and probe its codecs.
    pub fn new(explicit: Option<&Path>) -> Self {
        let ffmpeg = resolve_ffmpeg_path(explicit);
        let encoder = LosslessEncoder::detect(&ffmpeg);
        info!("Using {} with {}", ffmpeg.display(), encoder.name());
        Self { ffmpeg, encoder }
    }

    pub fn with_encoder(ffmpeg: PathBuf, encoder: LosslessEncoder) -> Self {
        Self { ffmpeg, encoder }
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg
    }

    pub fn encoder(&self) -> LosslessEncoder {
        self.encoder
    }
}

impl EncoderLauncher for FfmpegLauncher {
    fn launch(&self, params: &StreamParams) -> Result<Box<dyn EncoderBackend>, RecorderError> {
        let mut command = FfmpegCommand::new_with_path(&self.ffmpeg);
        command.args(encoder_args(params, self.encoder));

        let inner = command.as_inner_mut();
        inner.stdin(Stdio::piped());
        inner.stdout(Stdio::null());
        inner.stderr(Stdio::piped());

        let mut child = inner
            .spawn()
            .map_err(|e| RecorderError::Encode(format!("failed to start FFmpeg: {}", e)))?;

        let Some(stdin) = child.stdin.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(RecorderError::Encode("failed to open FFmpeg stdin".to_string()));
        };

        // Drain stderr so ffmpeg never blocks on it; keep the last line for errors.
        let stderr_reader = child.stderr.take().map(|stderr| {
            std::thread::spawn(move || {
                let mut last = None;
                for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                    debug!(target: "ffmpeg", "{}", line);
                    if !line.trim().is_empty() {
                        last = Some(line);
                    }
                }
                last
            })
        });

        debug!("FFmpeg started (pid {})", child.id());

        Ok(Box::new(FfmpegBackend {
            child: Some(child),
            stdin: Some(stdin),
            stderr_reader,
        }))
    }
}

struct FfmpegBackend {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_reader: Option<JoinHandle<Option<String>>>,
}

impl EncoderBackend for FfmpegBackend {
    fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        match self.stdin.as_mut() {
            Some(stdin) => stdin.write_all(bytes),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "FFmpeg stdin already closed",
            )),
        }
    }

    fn finish(mut self: Box<Self>) -> Result<(), RecorderError> {
        // Closing stdin is the end-of-stream signal.
        drop(self.stdin.take());

        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child
            .wait()
            .map_err(|e| RecorderError::Encode(format!("FFmpeg process error: {}", e)))?;
        let last_line = self
            .stderr_reader
            .take()
            .and_then(|reader| reader.join().ok().flatten());

        if !status.success() {
            return Err(RecorderError::Encode(match last_line {
                Some(line) => format!("FFmpeg failed ({}): {}", status, line),
                None => format!("FFmpeg encoding failed with exit code: {:?}", status.code()),
            }));
        }
        Ok(())
    }
}

impl Drop for FfmpegBackend {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            warn!("FFmpeg backend dropped without finishing; killing pid {}", child.id());
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
