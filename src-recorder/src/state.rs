//! Recording state management.

use crate::capture::{CaptureDevice, CapturedFrame, FrameSource};
use crate::config::RecordingConfig;
use crate::convert::RateConverter;
use crate::encoder::{EncoderLauncher, EncoderSink, StreamParams};
use crate::error::RecorderError;
use crate::queue::FrameQueue;
use std::time::Duration;
use steadyrec_common::{RecorderState, RecordingSummary};
use tracing::{error, info, warn};

/// Relative deviation from the input rate hint that triggers a warning.
const CADENCE_WARN_RATIO: f64 = 0.5;

/// Captures needed before the observed cadence is compared with the hint.
const CADENCE_MIN_FRAMES: u64 = 10;

type ErrorCallback = Box<dyn FnMut(&RecorderError) + Send>;

/// Read-only view of the active session.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingSession {
    config: RecordingConfig,
    width: u32,
    height: u32,
    ticks: u64,
    captured: u64,
    first_capture: Option<Duration>,
    last_capture: Option<Duration>,
    cadence_warned: bool,
}

impl RecordingSession {
    pub fn config(&self) -> &RecordingConfig {
        &self.config
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Render ticks seen so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Frames read back so far.
    pub fn captured_frames(&self) -> u64 {
        self.captured
    }

    /// Render-clock span between the first and last capture.
    pub fn captured_span(&self) -> Duration {
        match (self.first_capture, self.last_capture) {
            (Some(first), Some(last)) => last.saturating_sub(first),
            _ => Duration::ZERO,
        }
    }

    /// Mean observed input rate, once two frames have been captured.
    pub fn mean_input_fps(&self) -> Option<f64> {
        let span = self.captured_span().as_secs_f64();
        (self.captured >= 2 && span > 0.0).then(|| (self.captured - 1) as f64 / span)
    }

    fn record_capture(&mut self, timestamp: Duration) {
        self.captured += 1;
        self.first_capture.get_or_insert(timestamp);
        self.last_capture = Some(timestamp);

        if self.cadence_warned || self.captured < CADENCE_MIN_FRAMES {
            return;
        }
        if let Some(observed) = self.mean_input_fps() {
            let hint = self.config.input_fps_hint;
            if ((observed - hint) / hint).abs() > CADENCE_WARN_RATIO {
                warn!(
                    "Observed input rate {:.2} fps differs from the expected {:.2} fps; output timing is unaffected",
                    observed, hint
                );
                self.cadence_warned = true;
            }
        }
    }
}

struct ActiveSession<D: CaptureDevice> {
    info: RecordingSession,
    source: FrameSource<D>,
    queue: FrameQueue,
    converter: RateConverter,
    sink: EncoderSink,
}

impl<D: CaptureDevice> ActiveSession<D> {
    /// Stream captures through the converter into the sink.
    ///
    /// Each output frame is written before the next is built, so a full
    /// encoder queue stalls conversion instead of piling up frames.
    fn convert(&mut self, frames: Vec<CapturedFrame>) -> Result<(), RecorderError> {
        let sink = &mut self.sink;
        for frame in frames {
            self.converter
                .on_frame_available(frame, |output| sink.write_frame(output))?;
        }
        Ok(())
    }

    fn tick(
        &mut self,
        device: &mut D,
        surface: &D::Surface,
        elapsed: Duration,
    ) -> Result<(), RecorderError> {
        self.info.ticks += 1;
        if let Some(frame) = self.source.capture(device, surface, elapsed)? {
            self.info.record_capture(frame.timestamp());
            self.queue.push(frame);
        }
        // The source clamps a backwards clock, so its stamps may run ahead of `elapsed`.
        let due = self
            .queue
            .peek_latest()
            .map_or(elapsed, |f| f.timestamp().max(elapsed));
        let ready = self.queue.pop_all_up_to(due);
        self.convert(ready)
    }

    fn finish(mut self, device: &mut D) -> Result<RecordingSummary, RecorderError> {
        for frame in self.source.flush(device)? {
            self.info.record_capture(frame.timestamp());
            self.queue.push(frame);
        }
        let remaining = self.queue.drain_all();
        self.convert(remaining)?;

        let report = self.sink.close()?;
        let stats = self.converter.stats();
        let info = self.info;

        Ok(RecordingSummary {
            output_path: info.config.output_path.to_string_lossy().to_string(),
            width: info.width,
            height: info.height,
            output_fps: info.config.output_fps,
            policy: info.config.policy,
            input_frames: stats.input_frames,
            output_frames: report.frames_written,
            held_frames: stats.held_frames,
            blended_frames: stats.blended_frames,
            captured_seconds: info.captured_span().as_secs_f64(),
            mean_input_fps: info.mean_input_fps(),
            bytes_written: report.bytes_written,
        })
    }
}

/// Drives one recording session at a time from the render loop.
///
/// `Idle --start--> Recording --stop or fatal error--> Idle`. Every call is
/// made from the render thread; only the encoder writer runs elsewhere.
pub struct Recorder<D: CaptureDevice> {
    launcher: Box<dyn EncoderLauncher>,
    session: Option<ActiveSession<D>>,
    on_error: Option<ErrorCallback>,
}

impl<D: CaptureDevice> Recorder<D> {
    pub fn new(launcher: Box<dyn EncoderLauncher>) -> Self {
        Self {
            launcher,
            session: None,
            on_error: None,
        }
    }

    /// Register a callback invoked when a fatal error ends the session.
    pub fn set_error_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&RecorderError) + Send + 'static,
    {
        self.on_error = Some(Box::new(callback));
    }

    pub fn state(&self) -> RecorderState {
        if self.session.is_some() {
            RecorderState::Recording
        } else {
            RecorderState::Idle
        }
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&RecordingSession> {
        self.session.as_ref().map(|s| &s.info)
    }

    /// Begin a session capturing `surface`.
    ///
    /// Fails without side effects if a session is already active. A failure
    /// while allocating staging buffers or launching the encoder leaves the
    /// recorder idle.
    pub fn start(
        &mut self,
        device: &mut D,
        surface: &D::Surface,
        config: RecordingConfig,
    ) -> Result<(), RecorderError> {
        if self.session.is_some() {
            return Err(RecorderError::AlreadyRecording);
        }
        config.validate()?;

        let (width, height) = device.surface_size(surface);
        let source = FrameSource::new(device, width, height, config.staging_slots)?;
        let converter = RateConverter::new(config.policy, config.output_fps)?;
        let params = StreamParams {
            output_path: config.output_path.clone(),
            width,
            height,
            output_fps: config.output_fps,
        };
        let sink = EncoderSink::open(self.launcher.as_ref(), params, config.effective_queue_depth())?;

        info!(
            "Recording started: {}x{} -> {} ({} fps, {})",
            width,
            height,
            config.output_path.display(),
            config.output_fps,
            config.policy
        );

        self.session = Some(ActiveSession {
            info: RecordingSession {
                config,
                width,
                height,
                ticks: 0,
                captured: 0,
                first_capture: None,
                last_capture: None,
                cadence_warned: false,
            },
            source,
            queue: FrameQueue::new(),
            converter,
            sink,
        });
        Ok(())
    }

    /// Feed one render tick. `elapsed` is the render clock at this tick.
    ///
    /// May block while the encoder catches up. A device or encoder failure
    /// ends the session before the error is returned.
    pub fn on_tick(
        &mut self,
        device: &mut D,
        surface: &D::Surface,
        elapsed: Duration,
    ) -> Result<(), RecorderError> {
        let Some(session) = self.session.as_mut() else {
            return Err(RecorderError::NotRecording);
        };
        match session.tick(device, surface, elapsed) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.abort(e)),
        }
    }

    /// End the session, flushing every captured frame to the encoder.
    pub fn stop(&mut self, device: &mut D) -> Result<RecordingSummary, RecorderError> {
        let Some(session) = self.session.take() else {
            return Err(RecorderError::NotRecording);
        };
        match session.finish(device) {
            Ok(summary) => {
                info!(
                    "Recording stopped: {} input frames -> {} output frames ({} held, {} blended)",
                    summary.input_frames,
                    summary.output_frames,
                    summary.held_frames,
                    summary.blended_frames
                );
                Ok(summary)
            }
            Err(e) => Err(self.abort(e)),
        }
    }

    /// Release the session and report a fatal error.
    fn abort(&mut self, err: RecorderError) -> RecorderError {
        // Dropping the sink closes the pipe and reaps the encoder.
        drop(self.session.take());
        error!("Recording aborted: {}", err);
        if let Some(callback) = self.on_error.as_mut() {
            callback(&err);
        }
        err
    }
}
