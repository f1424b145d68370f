//! Streaming hand-off from the rate converter to an out-of-process encoder.
//!
//! [`EncoderSink`] moves finished frames over a bounded channel to a writer
//! thread that owns the encoder's input pipe. A full channel blocks the
//! caller; frames are never dropped or reordered.

pub mod ffmpeg;

pub use ffmpeg::{ensure_ffmpeg, resolve_ffmpeg_path, FfmpegLauncher, LosslessEncoder};

use crate::capture::frame_len;
use crate::convert::OutputFrame;
use crate::error::RecorderError;
use std::path::PathBuf;
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Raw stream parameters agreed with the encoder at open time.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamParams {
    pub output_path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub output_fps: f64,
}

impl StreamParams {
    /// Bytes per frame on the wire.
    pub fn frame_len(&self) -> usize {
        frame_len(self.width, self.height)
    }
}

/// The input side of a running encoder.
pub trait EncoderBackend: Send {
    /// Write raw BGRA bytes to the encoder's input.
    fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()>;

    /// Signal end of stream and wait for the encoder to exit.
    fn finish(self: Box<Self>) -> Result<(), RecorderError>;
}

/// Starts encoder processes.
pub trait EncoderLauncher {
    fn launch(&self, params: &StreamParams) -> Result<Box<dyn EncoderBackend>, RecorderError>;
}

/// Totals reported when a sink is closed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkReport {
    pub frames_written: u64,
    pub bytes_written: u64,
}

/// Handle to the encoder writer thread.
///
/// `write_frame` and `close` must be called from a plain thread, not from
/// inside an async runtime.
pub struct EncoderSink {
    params: StreamParams,
    tx: Option<mpsc::Sender<OutputFrame>>,
    worker: Option<JoinHandle<Result<SinkReport, RecorderError>>>,
}

impl EncoderSink {
    /// Launch the encoder and start the writer thread.
    ///
    /// `queue_depth` is the number of frames that may wait for the encoder
    /// before `write_frame` blocks.
    pub fn open(
        launcher: &dyn EncoderLauncher,
        params: StreamParams,
        queue_depth: usize,
    ) -> Result<Self, RecorderError> {
        let backend = launcher.launch(&params)?;
        let (tx, rx) = mpsc::channel::<OutputFrame>(queue_depth.max(1));

        let worker = std::thread::Builder::new()
            .name("steadyrec-encoder".to_string())
            .spawn(move || run_writer(backend, rx))
            .map_err(|e| RecorderError::Encode(format!("failed to spawn writer thread: {}", e)))?;

        info!(
            "Encoder sink open: {}x{} @ {} fps -> {}",
            params.width,
            params.height,
            params.output_fps,
            params.output_path.display()
        );

        Ok(Self {
            params,
            tx: Some(tx),
            worker: Some(worker),
        })
    }

    pub fn params(&self) -> &StreamParams {
        &self.params
    }

    /// Queue one frame for the encoder, blocking while the queue is full.
    pub fn write_frame(&mut self, frame: OutputFrame) -> Result<(), RecorderError> {
        if frame.data().len() != self.params.frame_len() {
            return Err(RecorderError::Encode(format!(
                "frame {} is {}x{}, stream is {}x{}",
                frame.index(),
                frame.width(),
                frame.height(),
                self.params.width,
                self.params.height
            )));
        }

        let Some(tx) = &self.tx else {
            return Err(RecorderError::Encode("encoder sink is closed".to_string()));
        };

        if tx.blocking_send(frame).is_err() {
            // The writer only hangs up after a failure; report it.
            self.tx = None;
            return Err(match self.join_worker() {
                Err(e) => e,
                Ok(_) => RecorderError::Encode("encoder stopped accepting frames".to_string()),
            });
        }
        Ok(())
    }

    /// Close the stream, wait for the encoder to exit, and report totals.
    pub fn close(mut self) -> Result<SinkReport, RecorderError> {
        self.tx = None;
        let report = self.join_worker()?;
        info!(
            "Encoder finished: {} frames, {} bytes -> {}",
            report.frames_written,
            report.bytes_written,
            self.params.output_path.display()
        );
        Ok(report)
    }

    fn join_worker(&mut self) -> Result<SinkReport, RecorderError> {
        let Some(worker) = self.worker.take() else {
            return Err(RecorderError::Encode("encoder sink is closed".to_string()));
        };
        worker
            .join()
            .map_err(|_| RecorderError::Encode("encoder writer thread panicked".to_string()))?
    }
}

impl Drop for EncoderSink {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.tx = None;
            if let Err(e) = self.join_worker() {
                error!("Encoder sink dropped with error: {}", e);
            }
        }
    }
}

fn run_writer(
    mut backend: Box<dyn EncoderBackend>,
    mut rx: mpsc::Receiver<OutputFrame>,
) -> Result<SinkReport, RecorderError> {
    let mut report = SinkReport::default();

    while let Some(frame) = rx.blocking_recv() {
        if let Err(e) = backend.write_all(frame.data()) {
            // Unblock the producer before waiting on the process.
            drop(rx);
            let write_error = format!("failed to write frame {}: {}", frame.index(), e);
            error!("{}", write_error);
            return Err(match backend.finish() {
                Err(RecorderError::Encode(exit)) => {
                    RecorderError::Encode(format!("{} ({})", write_error, exit))
                }
                _ => RecorderError::Encode(write_error),
            });
        }
        report.frames_written += 1;
        report.bytes_written += frame.data().len() as u64;
    }

    debug!("Frame channel closed after {} frames", report.frames_written);
    backend.finish()?;
    Ok(report)
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory encoders for exercising the sink and the recorder.

    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// What an in-memory encoder received.
    #[derive(Debug, Default)]
    pub struct Recording {
        pub params: Option<StreamParams>,
        pub bytes: Vec<u8>,
        pub finished: bool,
        pub launches: u32,
    }

    impl Recording {
        /// Received bytes split into frames.
        pub fn frames(&self) -> Vec<Vec<u8>> {
            let len = self.params.as_ref().map(|p| p.frame_len()).unwrap_or(1);
            self.bytes.chunks(len).map(|c| c.to_vec()).collect()
        }
    }

    #[derive(Clone, Default)]
    pub struct MemoryLauncher {
        pub recording: Arc<Mutex<Recording>>,
        /// Sleep before every write
        pub write_delay: Option<Duration>,
        /// Fail writes after this many frames
        pub fail_after: Option<u64>,
        /// Report a non-zero exit from `finish`
        pub fail_exit: bool,
        /// Refuse to launch
        pub fail_launch: bool,
    }

    struct MemoryBackend {
        recording: Arc<Mutex<Recording>>,
        write_delay: Option<Duration>,
        fail_after: Option<u64>,
        fail_exit: bool,
        writes: u64,
    }

    impl EncoderLauncher for MemoryLauncher {
        fn launch(&self, params: &StreamParams) -> Result<Box<dyn EncoderBackend>, RecorderError> {
            if self.fail_launch {
                return Err(RecorderError::Encode("encoder binary not found".to_string()));
            }
            {
                let mut rec = self.recording.lock().unwrap();
                rec.params = Some(params.clone());
                rec.launches += 1;
            }
            Ok(Box::new(MemoryBackend {
                recording: self.recording.clone(),
                write_delay: self.write_delay,
                fail_after: self.fail_after,
                fail_exit: self.fail_exit,
                writes: 0,
            }))
        }
    }

    impl EncoderBackend for MemoryBackend {
        fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()> {
            if let Some(delay) = self.write_delay {
                std::thread::sleep(delay);
            }
            if self.fail_after.is_some_and(|n| self.writes >= n) {
                return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "broken pipe"));
            }
            self.writes += 1;
            self.recording.lock().unwrap().bytes.extend_from_slice(bytes);
            Ok(())
        }

        fn finish(self: Box<Self>) -> Result<(), RecorderError> {
            self.recording.lock().unwrap().finished = true;
            if self.fail_exit {
                return Err(RecorderError::Encode("encoder exited with code 1".to_string()));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::MemoryLauncher;
    use super::*;
    use crate::capture::CapturedFrame;
    use crate::convert::RateConverter;
    use std::time::Duration;
    use steadyrec_common::ConversionPolicy;

    fn params() -> StreamParams {
        StreamParams {
            output_path: PathBuf::from("out.mkv"),
            width: 2,
            height: 1,
            output_fps: 10.0,
        }
    }

    /// Run a constant-policy conversion over `inputs` captures spaced 50ms apart.
    fn output_frames(inputs: u64) -> Vec<OutputFrame> {
        let mut converter = RateConverter::new(ConversionPolicy::Constant, 10.0).unwrap();
        let mut out = Vec::new();
        for i in 0..inputs {
            let frame =
                CapturedFrame::new(2, 1, vec![i as u8; 8], Duration::from_millis(i * 50), i).unwrap();
            converter
                .on_frame_available(frame, |f| {
                    out.push(f);
                    Ok(())
                })
                .unwrap();
        }
        out
    }

    #[test]
    fn test_frames_arrive_in_order() {
        let launcher = MemoryLauncher::default();
        let mut sink = EncoderSink::open(&launcher, params(), 4).unwrap();
        let frames = output_frames(9);
        let expected: Vec<Vec<u8>> = frames.iter().map(|f| f.data().to_vec()).collect();
        for frame in frames {
            sink.write_frame(frame).unwrap();
        }
        let report = sink.close().unwrap();

        let rec = launcher.recording.lock().unwrap();
        assert!(rec.finished);
        assert_eq!(rec.frames(), expected);
        assert_eq!(report.frames_written, expected.len() as u64);
        assert_eq!(report.bytes_written, expected.len() as u64 * 8);
    }

    #[test]
    fn test_slow_encoder_applies_backpressure_without_drops() {
        let launcher = MemoryLauncher {
            write_delay: Some(Duration::from_millis(5)),
            ..Default::default()
        };
        let mut sink = EncoderSink::open(&launcher, params(), 1).unwrap();
        let frames = output_frames(41);
        let produced = frames.len() as u64;
        for frame in frames {
            sink.write_frame(frame).unwrap();
        }
        let report = sink.close().unwrap();

        assert_eq!(report.frames_written, produced);
        assert_eq!(launcher.recording.lock().unwrap().frames().len() as u64, produced);
    }

    #[test]
    fn test_write_failure_is_encode_error() {
        let launcher = MemoryLauncher {
            fail_after: Some(2),
            ..Default::default()
        };
        let mut sink = EncoderSink::open(&launcher, params(), 1).unwrap();
        let mut result = Ok(());
        for frame in output_frames(20) {
            result = sink.write_frame(frame);
            if result.is_err() {
                break;
            }
        }
        let err = match result {
            Err(e) => e,
            Ok(()) => sink.close().unwrap_err(),
        };
        assert!(matches!(err, RecorderError::Encode(_)));
        assert!(launcher.recording.lock().unwrap().finished);
    }

    #[test]
    fn test_nonzero_exit_is_encode_error() {
        let launcher = MemoryLauncher {
            fail_exit: true,
            ..Default::default()
        };
        let mut sink = EncoderSink::open(&launcher, params(), 2).unwrap();
        for frame in output_frames(3) {
            sink.write_frame(frame).unwrap();
        }
        let err = sink.close().unwrap_err();
        assert_eq!(err, RecorderError::Encode("encoder exited with code 1".to_string()));
    }

    #[test]
    fn test_rejects_wrong_frame_size() {
        let launcher = MemoryLauncher::default();
        let mut sink = EncoderSink::open(
            &launcher,
            StreamParams {
                width: 4,
                ..params()
            },
            2,
        )
        .unwrap();
        let frame = output_frames(1).remove(0);
        assert!(matches!(sink.write_frame(frame), Err(RecorderError::Encode(_))));
        sink.close().unwrap();
    }
}
